//! Replacing one live filesystem object with its archived counterpart.
//!
//! The object is extracted into a private staging directory first. Only once the
//! extraction succeeded does [`Swap`] move it into place, so a failed or partial
//! extraction never touches the live object.

pub mod swap;

use crate::borg::archive::{Archive, UnixFileType};
use crate::borg::cli::path_arg;
use crate::borg::function_path;
use crate::borg::operation::Operation;
use crate::borg::result_error::error::Error;
use crate::borg::result_error::result::Result;
use crate::borg::result_error::{WithDebugObjectAndFnName, WithMsg};
use bon::bon;
use function_name::named;
use getset::{CopyGetters, Getters};
use std::fs::{self, Permissions};
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

pub use swap::{find_interrupted_swaps, recover_interrupted_swap, RecoveryAction, Swap, SwapState};

pub const STAGING_PREFIX: &str = ".archive-restore-";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestorationState {
    Constructed,
    Staged,
    Swapped,
    Failed,
}

/// One restore of one absolute path from one archive.
///
/// Each instance runs [`ArchiveRestoration::extract`] and
/// [`ArchiveRestoration::swap`] once, in that order.
#[derive(Debug, Getters, CopyGetters)]
pub struct ArchiveRestoration {
    archive: Archive,
    #[getset(get = "pub")]
    target: PathBuf,
    /// `target` without its leading `/`, as borg stores it
    #[getset(get = "pub")]
    archive_path: String,
    #[getset(get_copy = "pub")]
    kind: UnixFileType,
    #[getset(get_copy = "pub")]
    strip_components: usize,
    #[getset(get_copy = "pub")]
    state: RestorationState,
    staging: Option<TempDir>,
    staging_suffix: String,
}

/// Resolves `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            c => normalized.push(c),
        }
    }
    normalized
}

/// Follows symlinks in the longest existing prefix of a normalized path. The
/// missing rest is appended as is.
fn resolve(path: &Path) -> Result<PathBuf> {
    for existing in path.ancestors() {
        match fs::canonicalize(existing) {
            Ok(resolved) => {
                let rest = path.strip_prefix(existing).map_err(|e| {
                    Error::InvalidState(format!("{existing:?} is not a prefix of {path:?}: {e}"))
                })?;
                return Ok(resolved.join(rest));
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(Error::from(e).with_msg(format!("Resolving {:?} failed", existing)))
            }
        }
    }
    Ok(path.to_path_buf())
}

/// Like [`resolve`], but keeps the last component so a symlink at the target
/// itself is replaced rather than followed.
fn resolve_target(path: &Path) -> Result<PathBuf> {
    match path.parent().zip(path.file_name()) {
        Some((parent, name)) => Ok(resolve(parent)?.join(name)),
        None => resolve(path),
    }
}

#[bon]
impl ArchiveRestoration {
    /// Validates `path`, refuses a locked repository, looks up the kind of `path`
    /// in the archive and creates the staging directory below `staging_root`.
    ///
    /// Symlinks in the parents of `path` and in `permitted_root` are resolved
    /// before checking that one contains the other.
    ///
    /// `staging_root` has to be on the same filesystem as `path` for the swap to
    /// be atomic.
    #[builder]
    pub fn new(
        archive: Archive,
        #[builder(into)] path: PathBuf,
        #[builder(into)] staging_root: PathBuf,
        #[builder(into)] permitted_root: Option<PathBuf>,
    ) -> Result<Self> {
        if !path.is_absolute() {
            return Err(Error::RelativePath(path));
        }
        let target = resolve_target(&normalize(&path))?;
        if let Some(root) = permitted_root {
            let root = resolve(&normalize(&root))?;
            if !target.starts_with(&root) {
                return Err(Error::PathNotPermitted { path: target, root });
            }
        }

        let archive_path = path_arg(&target)?.trim_start_matches('/').to_string();
        if archive_path.is_empty() {
            return Err(Error::InvalidState(
                "The filesystem root cannot be restored".to_string(),
            ));
        }

        archive.repository().ensure_unlocked()?;

        let kind = archive
            .contents(Some(&archive_path))
            .with_msg(format!("Looking up {:?} in {} failed", target, archive.name()))?
            .into_iter()
            .find(|item| item.path() == &archive_path)
            .map(|item| *item.file_type())
            .ok_or_else(|| Error::ArchivePathNotFound(archive_path.clone()))?;
        match kind {
            UnixFileType::RegularFile | UnixFileType::Directory => {}
            other => {
                return Err(Error::UnsupportedFileType {
                    path: target,
                    kind: other.to_string(),
                })
            }
        }

        let strip_components = Path::new(&archive_path).components().count() - 1;

        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .permissions(Permissions::from_mode(0o700))
            .tempdir_in(&staging_root)
            .map_err(Error::from)
            .with_msg(format!("Creating staging directory in {:?} failed", staging_root))?;
        let staging_suffix = staging
            .path()
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.strip_prefix(STAGING_PREFIX))
            .map(str::to_string)
            .ok_or_else(|| Error::NonUtf8Path(staging.path().to_path_buf()))?;

        info!(
            "Restoring {} {:?} from {} via {:?}",
            kind,
            target,
            archive.name(),
            staging.path()
        );
        Ok(ArchiveRestoration {
            archive,
            target,
            archive_path,
            kind,
            strip_components,
            state: RestorationState::Constructed,
            staging: Some(staging),
            staging_suffix,
        })
    }
}

impl ArchiveRestoration {
    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    /// `None` once the swap ran.
    pub fn staging_path(&self) -> Option<&Path> {
        self.staging.as_ref().map(TempDir::path)
    }

    fn expect_state(&self, expected: RestorationState, step: &str) -> Result<()> {
        if self.state != expected {
            return Err(Error::InvalidState(format!(
                "{step} of {:?} needs state {expected:?}, restoration is {:?}",
                self.target, self.state
            )));
        }
        Ok(())
    }

    /// Where the extracted object lands inside the staging directory.
    fn staged_object(&self) -> Result<PathBuf> {
        let staging = self
            .staging_path()
            .ok_or_else(|| Error::InvalidState("Staging directory is gone".to_string()))?;
        let name = self.target.file_name().ok_or_else(|| {
            Error::InvalidState(format!("{:?} has no file name", self.target))
        })?;
        Ok(staging.join(name))
    }

    fn extract_into_staging(&self) -> Result<Operation> {
        let staged = self.staged_object()?;
        let staging = self
            .staging_path()
            .ok_or_else(|| Error::InvalidState("Staging directory is gone".to_string()))?;
        let (operation, _) = self.archive.extract(
            staging,
            std::slice::from_ref(&self.archive_path),
            Some(self.strip_components),
        )?;

        if std::fs::symlink_metadata(&staged).is_err() {
            return Err(Error::ArchivePathNotFound(self.archive_path.clone())
                .with_msg(format!("Extraction left nothing at {:?}", staged)));
        }
        Ok(operation)
    }

    /// Extracts the archived object into the staging directory.
    #[named]
    pub fn extract(&mut self) -> Result<Operation> {
        self.expect_state(RestorationState::Constructed, "extract")?;

        let result = self.extract_into_staging();
        self.state = match result {
            Ok(_) => RestorationState::Staged,
            Err(_) => RestorationState::Failed,
        };
        debug!("Extraction of {:?} finished in state {:?}", self.target, self.state);
        result.with_debug_object_and_fn_name(self.target.clone(), function_path!())
    }

    /// Moves the staged object into place and drops the staging directory.
    #[named]
    pub fn swap(&mut self) -> Result<()> {
        self.expect_state(RestorationState::Staged, "swap")?;

        let result = self
            .staged_object()
            .and_then(|staged| Swap::new(&self.target, &self.staging_suffix)?.run(staged));

        if let Some(staging) = self.staging.take() {
            let staging_path = staging.path().to_path_buf();
            if let Err(e) = staging.close() {
                warn!("Could not remove staging directory {:?}: {}", staging_path, e);
            }
        }

        match result {
            Ok(()) => {
                self.state = RestorationState::Swapped;
                Ok(())
            }
            Err(e) => {
                self.state = RestorationState::Failed;
                Err(e.with_debug_object_and_fn_name(self.target.clone(), function_path!()))
            }
        }
    }

    /// [`ArchiveRestoration::extract`] followed by [`ArchiveRestoration::swap`].
    pub fn replace(&mut self) -> Result<Operation> {
        let operation = self.extract()?;
        self.swap()?;
        Ok(operation)
    }
}
