use crate::borg::archive::Archive;
use crate::borg::cli::{
    subcommand, BorgEnvironment, CommandRunner, RegularCommand, ENV_DELETE_CONFIRMATION,
    ENV_PASSPHRASE,
};
use crate::borg::existence::{classify_listing_failure, Existence};
use crate::borg::function_path;
use crate::borg::lock::classify_lock_probe;
use crate::borg::redacted::RedactedString;
use crate::borg::result_error::error::Error;
use crate::borg::result_error::result::Result;
use crate::borg::result_error::{WithDebugObjectAndFnName, WithMsg};
use crate::borg::validate::validate_repository_path;
use crate::borg::version::BorgVersion;
use bon::{bon, Builder};
use chrono::NaiveDateTime;
use derive_more::Display;
use function_name::named;
use getset::Getters;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Command the lock probe runs while holding the lock.
const LOCK_PROBE_COMMAND: &str = "/bin/true";

#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq)]
pub enum EncryptionMode {
    #[display("none")]
    None,
    #[display("repokey")]
    Repokey,
    #[display("repokey-blake2")]
    RepokeyBlake2,
    #[display("keyfile")]
    Keyfile,
    #[default]
    #[display("keyfile-blake2")]
    KeyfileBlake2,
}

/// Retention rules handed to `borg prune`. Unset rules are not passed.
#[derive(Builder, Clone, Debug, Default, PartialEq, Eq)]
pub struct PruneOptions {
    pub keep_last: Option<u32>,
    pub keep_hourly: Option<u32>,
    pub keep_daily: Option<u32>,
    pub keep_weekly: Option<u32>,
    pub keep_monthly: Option<u32>,
    pub keep_yearly: Option<u32>,
}

impl PruneOptions {
    fn arguments(&self) -> Vec<String> {
        [
            ("--keep-last", self.keep_last),
            ("--keep-hourly", self.keep_hourly),
            ("--keep-daily", self.keep_daily),
            ("--keep-weekly", self.keep_weekly),
            ("--keep-monthly", self.keep_monthly),
            ("--keep-yearly", self.keep_yearly),
        ]
        .into_iter()
        .filter_map(|(flag, keep)| keep.map(|n| format!("{flag}={n}")))
        .collect()
    }
}

#[derive(Deserialize)]
struct ListOutput {
    archives: Vec<ListedArchive>,
}

#[derive(Deserialize)]
struct ListedArchive {
    name: String,
    start: Option<NaiveDateTime>,
}

#[derive(Deserialize)]
struct InfoOutput {
    cache: InfoCache,
}

#[derive(Deserialize)]
struct InfoCache {
    stats: InfoStats,
}

#[derive(Deserialize)]
struct InfoStats {
    total_csize: u64,
}

/// A borg repository, local or reached over SSH.
///
/// Cloning is cheap, clones share the same [`CommandRunner`].
#[derive(Clone, Debug, Getters)]
pub struct Repository {
    #[getset(get = "pub")]
    path: String,
    passphrase: RedactedString,
    #[getset(get = "pub")]
    identity_file_path: Option<PathBuf>,
    runner: Arc<dyn CommandRunner>,
}

#[bon]
impl Repository {
    #[builder]
    pub fn new(
        #[builder(into)] path: String,
        #[builder(into)] passphrase: RedactedString,
        #[builder(into)] identity_file_path: Option<PathBuf>,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self> {
        validate_repository_path(&path).map_err(|_| Error::InvalidRepositoryPath(path.clone()))?;
        Ok(Repository {
            path,
            passphrase,
            identity_file_path,
            runner,
        })
    }
}

impl Repository {
    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    /// Environment for every command, carries the passphrase.
    pub fn environment(&self) -> BorgEnvironment {
        BorgEnvironment::default().with_var(ENV_PASSPHRASE, self.passphrase.clone())
    }

    /// Environment that also confirms destructive operations without a prompt.
    fn dangerous_environment(&self) -> BorgEnvironment {
        self.environment()
            .with_var(ENV_DELETE_CONFIRMATION, "YES")
    }

    fn command(&self, subcommand: &str, arguments: Vec<String>) -> RegularCommand {
        RegularCommand::builder()
            .subcommand(subcommand)
            .arguments(arguments)
            .maybe_identity_file_path(self.identity_file_path.clone())
            .environment(self.environment())
            .build()
    }

    fn json_command(&self, subcommand: &str, arguments: Vec<String>) -> RegularCommand {
        RegularCommand::builder()
            .subcommand(subcommand)
            .arguments(arguments)
            .json(true)
            .maybe_identity_file_path(self.identity_file_path.clone())
            .environment(self.environment())
            .build()
    }

    pub fn borg_version(&self) -> Result<BorgVersion> {
        BorgVersion::query(self.runner())
    }

    /// Probes the exclusive lock with `borg with-lock`.
    ///
    /// Only a `LockTimeout` log message counts as locked. Any other failure of the
    /// probe is logged and reported as not locked, failures to run borg at all
    /// propagate.
    #[named]
    pub fn is_locked(&self) -> Result<bool> {
        let command = self.command(
            subcommand::WITH_LOCK,
            vec![
                "--log-json".to_string(),
                self.path.clone(),
                LOCK_PROBE_COMMAND.to_string(),
            ],
        );

        match self.runner.run(&command) {
            Ok(_) => Ok(false),
            Err(Error::RegularCommandFailed(failure)) => {
                let locked = classify_lock_probe(&failure.stderr).is_locked();
                if !locked {
                    debug!(
                        "Lock probe on {} failed without a lock timeout: {}",
                        self.path, failure
                    );
                }
                Ok(locked)
            }
            Err(e) => Err(e.with_debug_object_and_fn_name(self.path.clone(), function_path!())),
        }
    }

    pub fn ensure_unlocked(&self) -> Result<()> {
        if self.is_locked()? {
            warn!("Repository {} is locked", self.path);
            return Err(Error::RepositoryLocked(self.path.clone()));
        }
        Ok(())
    }

    /// Whether the repository exists, judged from the archive listing.
    ///
    /// Failures the listing does not explain are returned unchanged.
    pub fn exists(&self) -> Result<bool> {
        match self.archives() {
            Ok(_) => Ok(true),
            Err(Error::RegularCommandFailed(failure)) => {
                match classify_listing_failure(&failure.stderr, &self.path) {
                    Existence::Missing => {
                        debug!("Repository {} does not exist", self.path);
                        Ok(false)
                    }
                    Existence::Present => {
                        debug!("Repository {} exists but is locked", self.path);
                        Ok(true)
                    }
                    Existence::Unclassified => Err(Error::RegularCommandFailed(failure)),
                }
            }
            Err(e) => Err(e),
        }
    }

    pub fn archives(&self) -> Result<Vec<Archive>> {
        let output = self
            .runner
            .run(&self.json_command(subcommand::LIST, vec![self.path.clone()]))?;
        let listing: ListOutput = serde_json::from_str(&output.stdout)
            .map_err(Error::from)
            .with_msg(format!("Parsing archive list of {} failed", self.path))?;

        Ok(listing
            .archives
            .into_iter()
            .map(|a| {
                Archive::builder()
                    .repository(self.clone())
                    .name(a.name)
                    .maybe_start(a.start)
                    .build()
            })
            .collect())
    }

    /// Compressed size of all archives in bytes.
    pub fn size(&self) -> Result<u64> {
        let output = self
            .runner
            .run(&self.json_command(subcommand::INFO, vec![self.path.clone()]))?;
        let info: InfoOutput = serde_json::from_str(&output.stdout)
            .map_err(Error::from)
            .with_msg(format!("Parsing repository info of {} failed", self.path))?;
        Ok(info.cache.stats.total_csize)
    }

    #[named]
    pub fn create(&self, encryption: EncryptionMode) -> Result<()> {
        info!("Initializing repository {} ({})", self.path, encryption);
        self.runner
            .run(&self.command(
                subcommand::INIT,
                vec![format!("--encryption={encryption}"), self.path.clone()],
            ))
            .map(|_| ())
            .with_debug_object_and_fn_name(self.path.clone(), function_path!())
    }

    #[named]
    pub fn delete(&self) -> Result<()> {
        self.ensure_unlocked()?;
        info!("Deleting repository {}", self.path);
        let command = RegularCommand::builder()
            .subcommand(subcommand::DELETE)
            .arguments(vec![self.path.clone()])
            .maybe_identity_file_path(self.identity_file_path.clone())
            .environment(self.dangerous_environment())
            .build();
        self.runner
            .run(&command)
            .map(|_| ())
            .with_debug_object_and_fn_name(self.path.clone(), function_path!())
    }

    /// `false` when `borg check` reports problems, errors only when the check could
    /// not be started.
    pub fn check(&self) -> Result<bool> {
        self.ensure_unlocked()?;
        match self
            .runner
            .run(&self.command(subcommand::CHECK, vec![self.path.clone()]))
        {
            Ok(_) => Ok(true),
            Err(Error::RegularCommandFailed(failure)) => {
                warn!("Check of {} failed: {}", self.path, failure);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Prunes archives and, on borg versions with a separate `compact`, frees the
    /// space right after.
    #[named]
    pub fn prune(&self, options: &PruneOptions) -> Result<()> {
        self.ensure_unlocked()?;
        let mut arguments = options.arguments();
        arguments.push(self.path.clone());

        info!("Pruning repository {} with {:?}", self.path, options);
        self.runner
            .run(&self.command(subcommand::PRUNE, arguments))
            .with_debug_object_and_fn_name(self.path.clone(), function_path!())?;

        if self.borg_version()?.has_compact() {
            self.compact_unlocked()?;
        }
        Ok(())
    }

    pub fn compact(&self) -> Result<()> {
        self.ensure_unlocked()?;
        self.compact_unlocked()
    }

    /// `compact` for callers that already probed the lock.
    #[named]
    fn compact_unlocked(&self) -> Result<()> {
        info!("Compacting repository {}", self.path);
        self.runner
            .run(&self.command(subcommand::COMPACT, vec![self.path.clone()]))
            .map(|_| ())
            .with_debug_object_and_fn_name(self.path.clone(), function_path!())
    }
}
