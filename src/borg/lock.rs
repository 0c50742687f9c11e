//! Lock state of a repository, read from the stderr of a failed lock probe.
//!
//! borg has no exit code reserved for "repository is locked". The only signal is
//! the `msgid` of a JSON log message, so this depends on borg's diagnostic
//! vocabulary and has to follow it when borg renames its message ids.

use crate::borg::log_line::{decode_line, LogLine, LogMessageLine};

/// `msgid` borg logs when it gave up waiting for the exclusive lock.
pub const LOCK_TIMEOUT_MSGID: &str = "LockTimeout";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockState {
    Locked,
    NotLocked,
}

impl LockState {
    pub fn is_locked(self) -> bool {
        self == LockState::Locked
    }
}

/// Classifies the stderr of a lock probe that exited nonzero.
///
/// Only log-message lines are looked at. Lines that are not valid log lines are
/// skipped: whatever else made the probe fail is not a lock and is not reported here.
pub fn classify_lock_probe(stderr: &str) -> LockState {
    let locked = stderr
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match decode_line(line) {
            Ok(LogLine::LogMessage(message)) => Some(message),
            Ok(_) => None,
            Err(e) => {
                tracing::trace!("Ignoring undecodable lock probe line {:?}: {}", line, e);
                None
            }
        })
        .any(|LogMessageLine { message_id, .. }| {
            message_id.as_deref() == Some(LOCK_TIMEOUT_MSGID)
        });

    if locked {
        LockState::Locked
    } else {
        LockState::NotLocked
    }
}
