use crate::borg::result_error::{WithDebugObjectAndFnName, WithMsg};
use std::fmt::{Debug, Display, Formatter};
use std::path::PathBuf;
use thiserror::Error;

/// Everything borg told us about a regular command that exited nonzero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailure {
    pub argv: Vec<String>,
    /// `None` when the process was killed by a signal
    pub rc: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl Display for CommandFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Command {:?} failed with RC {}. Stderr:\n\n{}",
            self.argv,
            display_rc(&self.rc),
            self.stderr
        )
    }
}

fn display_rc(rc: &Option<i32>) -> String {
    rc.map(|rc| rc.to_string())
        .unwrap_or_else(|| "<signal>".to_string())
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error(transparent)]
    SerdeYml(#[from] serde_yml::Error),
    #[error(transparent)]
    ValidationError(#[from] validator::ValidationErrors),
    #[error("{0}")]
    RegularCommandFailed(Box<CommandFailure>),
    #[error("Command {argv:?} failed with RC {}. Output was logged to {log_file:?}", display_rc(.rc))]
    LoggedCommandFailed {
        argv: Vec<String>,
        rc: Option<i32>,
        log_file: PathBuf,
    },
    #[error("borg executable not found, tried {0:?}")]
    ExecutableNotFound(Vec<PathBuf>),
    #[error("Unrecognized log line type {kind:?}: {line}")]
    UnrecognizedLogLine { kind: String, line: String },
    #[error("Malformed borg output: {0}")]
    MalformedOutput(String),
    #[error("Path {0:?} is not absolute")]
    RelativePath(PathBuf),
    #[error("Path {path:?} is outside of permitted root {root:?}")]
    PathNotPermitted { path: PathBuf, root: PathBuf },
    #[error("Path {0:?} is not valid UTF-8")]
    NonUtf8Path(PathBuf),
    #[error("Archive does not contain {0:?}")]
    ArchivePathNotFound(String),
    #[error("Unsupported file type {kind} for {path:?}, only regular files and directories can be restored")]
    UnsupportedFileType { path: PathBuf, kind: String },
    #[error("Repository path {0:?} is not supported, remote repositories need the ssh:// scheme")]
    InvalidRepositoryPath(String),
    #[error("Repository {0} is locked")]
    RepositoryLocked(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Swap of {target:?} interrupted, target is missing and the original is at {old_path:?}:\n{}", indent::indent_all_with("  ", error.to_string()))]
    InconsistentSwap {
        target: PathBuf,
        old_path: PathBuf,
        error: Box<Error>,
    },
    #[error("{}:\n{}", msg, indent::indent_all_with("  ", error.to_string()))]
    WithMsg { msg: String, error: Box<Error> },
    #[error("{:?} {} failed:\n{}", obj_debug, fn_name, indent::indent_all_with("  ", error.to_string()))]
    WithDebugObjAndFnName {
        error: Box<Error>,
        obj_debug: Box<dyn Debug + Send>,
        fn_name: String,
    },
}

impl<S: Into<String>, O: Debug + Send + 'static> WithDebugObjectAndFnName<S, O> for Error {
    fn with_debug_object_and_fn_name(self, obj: O, fn_name: S) -> Self {
        Error::WithDebugObjAndFnName {
            error: Box::new(self),
            obj_debug: Box::new(obj),
            fn_name: fn_name.into(),
        }
    }
}

impl<S: Into<String>> WithMsg<S> for Error {
    fn with_msg(self, msg: S) -> Self {
        Self::WithMsg {
            msg: msg.into(),
            error: Box::new(self),
        }
    }
}

impl From<CommandFailure> for Error {
    fn from(value: CommandFailure) -> Self {
        Self::RegularCommandFailed(Box::new(value))
    }
}

impl Error {
    /// Peels context wrappers off to reach the error that actually happened.
    pub fn root(&self) -> &Error {
        match self {
            Error::WithMsg { error, .. } | Error::WithDebugObjAndFnName { error, .. } => {
                error.root()
            }
            e => e,
        }
    }

    pub fn is_inconsistent_swap(&self) -> bool {
        matches!(self.root(), Error::InconsistentSwap { .. })
    }
}
