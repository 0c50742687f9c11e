use crate::borg::cli::{BorgEnvironment, BorgExecutable, LoggedCommand, RegularCommand};
use crate::borg::result_error::error::{CommandFailure, Error};
use crate::borg::result_error::result::Result;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::Builder;

/// Result of a regular command that exited 0.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub rc: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Result of a logged command that exited 0. The log file is kept on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggedOutput {
    pub rc: i32,
    pub log_file: PathBuf,
}

/// Seam between the typed layer and the actual borg process.
///
/// Implementations block until the process exits and turn a nonzero exit into
/// [`Error::RegularCommandFailed`] or [`Error::LoggedCommandFailed`].
pub trait CommandRunner: Debug + Send + Sync {
    fn executable(&self) -> &Path;

    fn run(&self, command: &RegularCommand) -> Result<CommandOutput>;

    fn run_logged(&self, command: &LoggedCommand) -> Result<LoggedOutput>;
}

/// Runs borg with `std::process`.
#[derive(Clone, Debug)]
pub struct SystemRunner {
    executable: BorgExecutable,
}

impl SystemRunner {
    pub fn new(executable: BorgExecutable) -> Self {
        SystemRunner { executable }
    }

    fn command(
        argv: &[String],
        environment: &BorgEnvironment,
        working_directory: Option<&PathBuf>,
    ) -> Command {
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]).stdin(Stdio::null());
        for (key, value) in environment.iter() {
            cmd.env(key, value.inner());
        }
        if let Some(dir) = working_directory {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl CommandRunner for SystemRunner {
    fn executable(&self) -> &Path {
        self.executable.path()
    }

    fn run(&self, command: &RegularCommand) -> Result<CommandOutput> {
        let argv = command.argv(self.executable())?;
        tracing::debug!("Running {:?}", argv);

        let output = Self::command(
            &argv,
            command.environment(),
            command.working_directory().as_ref(),
        )
        .output()?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            tracing::debug!("{:?} exited with {}", argv, output.status);
            return Err(CommandFailure {
                argv,
                rc: output.status.code(),
                stdout,
                stderr,
            }
            .into());
        }

        Ok(CommandOutput {
            rc: output.status.code().unwrap_or_default(),
            stdout,
            stderr,
        })
    }

    fn run_logged(&self, command: &LoggedCommand) -> Result<LoggedOutput> {
        let argv = command.argv(self.executable())?;

        let log = Builder::new()
            .prefix("borg-")
            .suffix(".log")
            .keep(true)
            .tempfile()?;
        let log_file = log.path().to_path_buf();
        tracing::debug!("Running {:?}, logging to {:?}", argv, log_file);

        let status = Self::command(
            &argv,
            command.environment(),
            command.working_directory().as_ref(),
        )
        .stdout(Stdio::null())
        .stderr(Stdio::from(log.reopen()?))
        .status()?;

        if !status.success() {
            tracing::debug!("{:?} exited with {}", argv, status);
            return Err(Error::LoggedCommandFailed {
                argv,
                rc: status.code(),
                log_file,
            });
        }

        Ok(LoggedOutput {
            rc: status.code().unwrap_or_default(),
            log_file,
        })
    }
}
