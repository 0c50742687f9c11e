//! Rename protocol that puts a staged object in place of a live one.
//!
//! Every rename happens inside the target's parent directory, so each step is a
//! single atomic `rename(2)` as long as the staged object comes from the same
//! filesystem. Between retiring the original and promoting the new object the
//! target path does not exist; the original then only lives under its
//! `.restore-old` sibling name, which is what [`find_interrupted_swaps`] looks for.

use crate::borg::result_error::error::Error;
use crate::borg::result_error::result::Result;
use crate::borg::result_error::WithMsg;
use getset::{CopyGetters, Getters};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

pub const NEW_MARKER: &str = "restore-new";
pub const OLD_MARKER: &str = "restore-old";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwapState {
    Pending,
    NewStaged,
    OriginalRetired,
    Promoted,
    Done,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryAction {
    /// The target was missing, the original went back in place.
    RestoredOriginal,
    /// The target was present, the retired original was deleted.
    RemovedLeftover,
}

#[derive(Debug, Getters, CopyGetters)]
pub struct Swap {
    #[getset(get = "pub")]
    target: PathBuf,
    #[getset(get = "pub")]
    new_path: PathBuf,
    #[getset(get = "pub")]
    old_path: PathBuf,
    /// Whether there was an original to move out of the way
    #[getset(get_copy = "pub")]
    original_retired: bool,
    #[getset(get_copy = "pub")]
    state: SwapState,
}

fn split_target(target: &Path) -> Result<(&Path, &str)> {
    let (parent, name) = target
        .parent()
        .zip(target.file_name())
        .ok_or_else(|| Error::InvalidState(format!("{target:?} has no parent directory")))?;
    let name = name
        .to_str()
        .ok_or_else(|| Error::NonUtf8Path(target.to_path_buf()))?;
    Ok((parent, name))
}

fn sibling(parent: &Path, name: &str, suffix: &str, marker: &str) -> PathBuf {
    parent.join(format!(".{name}.{suffix}.{marker}"))
}

/// Removes a file, symlink or whole directory tree.
pub(crate) fn remove_path(path: &Path) -> std::io::Result<()> {
    if fs::symlink_metadata(path)?.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

fn path_exists(path: &Path) -> Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

impl Swap {
    /// `suffix` keeps concurrent restorations of the same target apart.
    pub fn new<P: AsRef<Path>>(target: P, suffix: &str) -> Result<Self> {
        let target = target.as_ref();
        let (parent, name) = split_target(target)?;
        Ok(Swap {
            target: target.to_path_buf(),
            new_path: sibling(parent, name, suffix, NEW_MARKER),
            old_path: sibling(parent, name, suffix, OLD_MARKER),
            original_retired: false,
            state: SwapState::Pending,
        })
    }

    fn expect_state(&self, expected: SwapState, step: &str) -> Result<()> {
        if self.state != expected {
            return Err(Error::InvalidState(format!(
                "{step} of {:?} needs state {expected:?}, swap is {:?}",
                self.target, self.state
            )));
        }
        Ok(())
    }

    /// Moves the extracted object next to the target.
    pub fn stage_new<P: AsRef<Path>>(&mut self, extracted: P) -> Result<()> {
        self.expect_state(SwapState::Pending, "stage_new")?;
        let extracted = extracted.as_ref();
        debug!("Staging {:?} as {:?}", extracted, self.new_path);
        fs::rename(extracted, &self.new_path)
            .map_err(Error::from)
            .with_msg(format!(
                "Moving {:?} next to {:?} failed",
                extracted, self.target
            ))?;
        self.state = SwapState::NewStaged;
        Ok(())
    }

    /// Moves the live object, if any, to its `.restore-old` name.
    pub fn retire_original(&mut self) -> Result<()> {
        self.expect_state(SwapState::NewStaged, "retire_original")?;
        if path_exists(&self.target)? {
            debug!("Retiring {:?} as {:?}", self.target, self.old_path);
            fs::rename(&self.target, &self.old_path)
                .map_err(Error::from)
                .with_msg(format!("Moving {:?} out of the way failed", self.target))?;
            self.original_retired = true;
        } else {
            debug!("Nothing to retire at {:?}", self.target);
        }
        self.state = SwapState::OriginalRetired;
        Ok(())
    }

    /// Puts the staged object at the target path.
    ///
    /// Failing here after an original was retired leaves the target missing and
    /// is reported as [`Error::InconsistentSwap`].
    pub fn promote(&mut self) -> Result<()> {
        self.expect_state(SwapState::OriginalRetired, "promote")?;
        debug!("Promoting {:?} to {:?}", self.new_path, self.target);
        if let Err(e) = fs::rename(&self.new_path, &self.target) {
            let e = Error::from(e).with_msg(format!(
                "Moving {:?} into place failed",
                self.new_path
            ));
            if self.original_retired {
                error!(
                    "{:?} is missing, the original is preserved at {:?}",
                    self.target, self.old_path
                );
                return Err(Error::InconsistentSwap {
                    target: self.target.clone(),
                    old_path: self.old_path.clone(),
                    error: Box::new(e),
                });
            }
            return Err(e);
        }
        self.state = SwapState::Promoted;
        Ok(())
    }

    /// Deletes the retired original.
    pub fn cleanup(&mut self) -> Result<()> {
        self.expect_state(SwapState::Promoted, "cleanup")?;
        if self.original_retired {
            remove_path(&self.old_path)
                .map_err(Error::from)
                .with_msg(format!("Removing {:?} failed", self.old_path))?;
        }
        self.state = SwapState::Done;
        Ok(())
    }

    fn discard_new(&self) {
        if let Err(e) = remove_path(&self.new_path) {
            warn!("Could not remove staged copy {:?}: {}", self.new_path, e);
        }
    }

    /// Runs every step. A failing cleanup only leaves a `.restore-old` sibling
    /// behind and is logged instead of returned.
    pub fn run<P: AsRef<Path>>(mut self, extracted: P) -> Result<()> {
        self.stage_new(extracted)?;
        if let Err(e) = self.retire_original() {
            self.discard_new();
            return Err(e);
        }
        if let Err(e) = self.promote() {
            if !self.original_retired {
                self.discard_new();
            }
            return Err(e);
        }
        self.finish()
    }

    /// Cleans up after a successful promotion. The target is already in place, so
    /// a failing cleanup is only logged.
    pub fn finish(mut self) -> Result<()> {
        self.expect_state(SwapState::Promoted, "finish")?;
        if let Err(e) = self.cleanup() {
            warn!("Swap of {:?} done, cleanup failed: {}", self.target, e);
        }
        info!("Swapped {:?}", self.target);
        Ok(())
    }
}

/// Lists `.restore-old` siblings of `target` left behind by interrupted swaps.
pub fn find_interrupted_swaps<P: AsRef<Path>>(target: P) -> Result<Vec<PathBuf>> {
    let target = target.as_ref();
    let (parent, name) = split_target(target)?;
    let prefix = format!(".{name}.");
    let suffix = format!(".{OLD_MARKER}");

    let mut found = Vec::new();
    for entry in fs::read_dir(parent)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        let is_marker = file_name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(&suffix))
            .is_some_and(|random| !random.is_empty() && !random.contains('.'));
        if is_marker {
            found.push(entry.path());
        }
    }
    found.sort();
    Ok(found)
}

/// Settles one interrupted swap of `target` found by [`find_interrupted_swaps`].
pub fn recover_interrupted_swap<P: AsRef<Path>, Q: AsRef<Path>>(
    target: P,
    old_path: Q,
) -> Result<RecoveryAction> {
    let target = target.as_ref();
    let old_path = old_path.as_ref();
    if !find_interrupted_swaps(target)?.iter().any(|p| p == old_path) {
        return Err(Error::InvalidState(format!(
            "{old_path:?} is not an interrupted swap of {target:?}"
        )));
    }

    let action = if path_exists(target)? {
        remove_path(old_path)
            .map_err(Error::from)
            .with_msg(format!("Removing {:?} failed", old_path))?;
        info!("Removed leftover {:?}, {:?} is in place", old_path, target);
        RecoveryAction::RemovedLeftover
    } else {
        fs::rename(old_path, target)
            .map_err(Error::from)
            .with_msg(format!("Moving {:?} back to {:?} failed", old_path, target))?;
        info!("Restored original {:?} from {:?}", target, old_path);
        RecoveryAction::RestoredOriginal
    };

    // the staged copy of the same swap, if it never got promoted
    if let Some(new_path) = old_path
        .to_str()
        .and_then(|p| p.strip_suffix(OLD_MARKER))
        .map(|p| PathBuf::from(format!("{p}{NEW_MARKER}")))
    {
        if path_exists(&new_path)? {
            remove_path(&new_path)
                .map_err(Error::from)
                .with_msg(format!("Removing {:?} failed", new_path))?;
        }
    }

    Ok(action)
}
