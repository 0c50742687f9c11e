//! Thin typed layer over the borg command line.
//!
//! Arguments follow borg's "good and preferred" order: common options, subcommand,
//! subcommand options, positionals. Secrets never go into argv, only into
//! [`BorgEnvironment`].

pub mod executable;
pub mod runner;

use crate::borg::redacted::RedactedString;
use crate::borg::result_error::error::Error;
use crate::borg::result_error::result::Result;
use bon::Builder;
use derive_more::{Deref, DerefMut, From};
use getset::Getters;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub use executable::BorgExecutable;
pub use runner::{CommandOutput, CommandRunner, LoggedOutput, SystemRunner};

pub mod subcommand {
    pub const CHECK: &str = "check";
    pub const COMPACT: &str = "compact";
    pub const CREATE: &str = "create";
    pub const DELETE: &str = "delete";
    pub const EXTRACT: &str = "extract";
    pub const INFO: &str = "info";
    pub const INIT: &str = "init";
    pub const LIST: &str = "list";
    pub const PRUNE: &str = "prune";
    pub const WITH_LOCK: &str = "with-lock";
}

pub const ENV_PASSPHRASE: &str = "BORG_PASSPHRASE";
pub const ENV_DELETE_CONFIRMATION: &str = "BORG_DELETE_I_KNOW_WHAT_I_AM_DOING";

/// Environment variables handed to one borg invocation.
#[derive(Clone, Debug, Default, From, Deref, DerefMut, PartialEq, Eq)]
pub struct BorgEnvironment {
    vars: BTreeMap<String, RedactedString>,
}

impl BorgEnvironment {
    pub fn with_var<K: Into<String>, V: Into<RedactedString>>(mut self, key: K, value: V) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }
}

/// Converts a path into an argv element, refusing to mangle non UTF-8 paths.
pub fn path_arg<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| Error::NonUtf8Path(path.to_path_buf()))
}

/// `--rsh` value used when connecting to a remote repository over SSH.
///
/// BatchMode keeps ssh from prompting, StrictHostKeyChecking=no lets the first
/// connection to an unknown host through.
fn rsh_arguments(identity_file_path: &Path) -> Result<[String; 2]> {
    Ok([
        "--rsh".to_string(),
        format!(
            "ssh -oBatchMode=yes -oStrictHostKeyChecking=no -i {}",
            path_arg(identity_file_path)?
        ),
    ])
}

/// A borg command whose stdout (and stderr) is captured in memory.
#[derive(Builder, Clone, Debug, Getters, PartialEq, Eq)]
#[getset(get = "pub")]
pub struct RegularCommand {
    #[builder(into)]
    subcommand: Option<String>,
    #[builder(default, into)]
    arguments: Vec<String>,
    #[builder(default)]
    json: bool,
    #[builder(into)]
    identity_file_path: Option<PathBuf>,
    #[builder(default)]
    environment: BorgEnvironment,
    #[builder(into)]
    working_directory: Option<PathBuf>,
}

impl RegularCommand {
    pub fn argv<P: AsRef<Path>>(&self, executable: P) -> Result<Vec<String>> {
        let mut argv = vec![path_arg(executable)?];
        argv.extend(self.subcommand.iter().cloned());
        if self.json {
            argv.push("--json".to_string());
        }
        if let Some(identity_file_path) = &self.identity_file_path {
            argv.extend(rsh_arguments(identity_file_path)?);
        }
        argv.extend(self.arguments.iter().cloned());
        Ok(argv)
    }
}

/// A borg command that writes JSON log lines to stderr, which is redirected to a
/// file for later interpretation by [`crate::borg::operation::Operation`].
#[derive(Builder, Clone, Debug, Getters, PartialEq, Eq)]
#[getset(get = "pub")]
pub struct LoggedCommand {
    #[builder(into)]
    subcommand: String,
    #[builder(default, into)]
    arguments: Vec<String>,
    #[builder(into)]
    identity_file_path: Option<PathBuf>,
    #[builder(default)]
    environment: BorgEnvironment,
    #[builder(into)]
    working_directory: Option<PathBuf>,
}

impl LoggedCommand {
    pub fn argv<P: AsRef<Path>>(&self, executable: P) -> Result<Vec<String>> {
        let mut argv = vec![
            path_arg(executable)?,
            "--progress".to_string(),
            "--log-json".to_string(),
            self.subcommand.clone(),
        ];
        if let Some(identity_file_path) = &self.identity_file_path {
            argv.extend(rsh_arguments(identity_file_path)?);
        }
        argv.extend(self.arguments.iter().cloned());
        Ok(argv)
    }
}
