use crate::borg::cli::{BorgExecutable, CommandRunner, SystemRunner};
use crate::borg::redacted::RedactedString;
use crate::borg::repository::Repository;
use crate::borg::result_error::error::Error;
use crate::borg::result_error::result::Result;
use crate::borg::result_error::WithMsg;
use crate::borg::validate::{validate_absolute_path, validate_dir_exist, validate_repository_path};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use validator::Validate;

#[skip_serializing_none]
#[derive(Clone, Serialize, Deserialize, Debug, Validate)]
pub struct RepositoryConfig {
    #[validate(custom(function = validate_repository_path))]
    pub path: String,
    #[validate(nested)]
    pub passphrase: RedactedString,
    /// SSH key for `ssh://` repositories
    #[validate(custom(function = validate_absolute_path))]
    pub identity_file_path: Option<PathBuf>,
}

#[skip_serializing_none]
#[derive(Clone, Serialize, Deserialize, Debug, Validate)]
pub struct BorgConfig {
    #[validate(nested)]
    pub repository: RepositoryConfig,
    /// Searched in the usual install locations when unset
    #[validate(custom(function = validate_absolute_path))]
    pub borg_executable: Option<PathBuf>,
    #[validate(custom(function = validate_dir_exist))]
    pub staging_root: PathBuf,
    /// Restores outside of this directory are refused
    #[validate(custom(function = validate_absolute_path))]
    pub permitted_root: Option<PathBuf>,
}

impl BorgConfig {
    /// Reads and validates a YAML config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        File::open(path)
            .map_err(Error::from)
            .and_then(|f| {
                serde_yml::from_reader::<_, BorgConfig>(f)
                    .map_err(Error::from)
                    .with_msg(format!("Parse YAML config failed: {:?}", path))
            })
            .and_then(|bc| {
                bc.validate()
                    .map_err(Error::from)
                    .map(|_| bc)
                    .with_msg(format!("Config validation failed: {:?}", path))
            })
    }

    pub fn executable(&self) -> Result<BorgExecutable> {
        match &self.borg_executable {
            Some(path) => BorgExecutable::locate([path]),
            None => BorgExecutable::locate_default(),
        }
    }

    pub fn repository(&self) -> Result<Repository> {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner::new(self.executable()?));
        Repository::builder()
            .path(self.repository.path.clone())
            .passphrase(self.repository.passphrase.clone())
            .maybe_identity_file_path(self.repository.identity_file_path.clone())
            .runner(runner)
            .build()
    }
}
