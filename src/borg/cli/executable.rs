use crate::borg::result_error::error::Error;
use crate::borg::result_error::result::Result;
use derive_more::{Deref, Display};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Where borg is looked for, preferred location first.
pub static DEFAULT_CANDIDATES: [&str; 2] = ["/usr/bin/borg", "/usr/local/bin/borg"];

/// Path of a borg executable that existed when it was located.
#[derive(Clone, Debug, Deref, Display, PartialEq, Eq)]
#[display("{}", path.display())]
pub struct BorgExecutable {
    path: PathBuf,
}

impl BorgExecutable {
    /// Returns the first candidate that is an executable regular file.
    pub fn locate<I, P>(candidates: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let candidates: Vec<PathBuf> = candidates.into_iter().map(Into::into).collect();
        candidates
            .iter()
            .find(|candidate| is_executable(candidate))
            .map(|path| {
                tracing::debug!("Using borg executable {:?}", path);
                BorgExecutable { path: path.clone() }
            })
            .ok_or(Error::ExecutableNotFound(candidates))
    }

    pub fn locate_default() -> Result<Self> {
        Self::locate(DEFAULT_CANDIDATES)
    }

    /// Skips the executable check, for scripted stand-ins in tests.
    #[cfg(test)]
    pub fn unchecked<P: Into<PathBuf>>(path: P) -> Self {
        BorgExecutable { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|md| md.is_file() && md.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
