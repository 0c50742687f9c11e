use borg_support::borg::archive::Archive;
use borg_support::borg::borg_config::BorgConfig;
use borg_support::borg::restoration::{
    find_interrupted_swaps, recover_interrupted_swap, ArchiveRestoration,
};
use borg_support::borg::result_error::result::Result;
use borg_support::borg::version::BorgVersion;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::exit;
use tracing::{error, info};

/// Inspect borg repositories and restore single paths from archives
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Location of config file
    #[arg(short, long)]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the version of the borg executable
    Version,
    /// Exit 0 when the repository is locked, 1 otherwise
    IsLocked,
    /// Exit 0 when the repository exists, 1 otherwise
    Exists,
    /// List the archives of the repository
    List,
    /// List the contents of an archive
    Contents {
        archive: String,
        /// Only list this path and everything below it
        path: Option<String>,
    },
    /// Replace a live file or directory with its copy from an archive
    Restore { archive: String, path: PathBuf },
    /// Settle restores of a path that were interrupted mid-swap
    Recover { path: PathBuf },
}

/// `Ok(false)` makes the process exit 1 without logging an error.
fn run(config: &BorgConfig, command: Command) -> Result<bool> {
    match command {
        Command::Version => {
            let repository = config.repository()?;
            println!("{}", BorgVersion::query(repository.runner())?);
            Ok(true)
        }
        Command::IsLocked => config.repository()?.is_locked(),
        Command::Exists => config.repository()?.exists(),
        Command::List => {
            for archive in config.repository()?.archives()? {
                match archive.start() {
                    Some(start) => println!("{}\t{}", archive.archive_name(), start),
                    None => println!("{}", archive.archive_name()),
                }
            }
            Ok(true)
        }
        Command::Contents { archive, path } => {
            let archive = Archive::builder()
                .repository(config.repository()?)
                .name(archive)
                .build();
            for item in archive.contents(path.as_deref())? {
                println!(
                    "{} {}:{} {:>10} {} {}",
                    item.symbolic_mode(),
                    item.user(),
                    item.group(),
                    item.size().unwrap_or_default(),
                    item.modification_time(),
                    item.path()
                );
            }
            Ok(true)
        }
        Command::Restore { archive, path } => {
            let archive = Archive::builder()
                .repository(config.repository()?)
                .name(archive)
                .build();
            let mut restoration = ArchiveRestoration::builder()
                .archive(archive)
                .path(path)
                .staging_root(config.staging_root.clone())
                .maybe_permitted_root(config.permitted_root.clone())
                .build()?;

            match restoration.replace() {
                Ok(_) => {
                    info!("Restored {:?}", restoration.target());
                    Ok(true)
                }
                Err(e) if e.is_inconsistent_swap() => {
                    error!(
                        "Run `recover {}` to put the original back",
                        restoration.target().display()
                    );
                    Err(e)
                }
                Err(e) => Err(e),
            }
        }
        Command::Recover { path } => {
            for old_path in find_interrupted_swaps(&path)? {
                let action = recover_interrupted_swap(&path, &old_path)?;
                println!("{:?}: {:?}", old_path, action);
            }
            Ok(true)
        }
    }
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let res = BorgConfig::load(&args.config).and_then(|config| run(&config, args.command));

    match res {
        Ok(true) => {}
        Ok(false) => exit(1),
        Err(e) => {
            error!("{e}");
            exit(1);
        }
    }
}
