//! Whether a repository exists, read from the stderr of a failed listing.
//!
//! "Does not exist" is recognized by exact match only, "locked" by prefix only.
//! Widening the exact matches to prefixes would turn real errors that happen to
//! start the same way into a silent "does not exist".

/// Start of borg's message when the listing could not get the repository lock.
pub const LOCK_ACQUIRE_FAILED_PREFIX: &str = "Failed to create/acquire the lock";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Existence {
    Missing,
    Present,
    /// Not something this classifier knows, the original failure must surface.
    Unclassified,
}

/// Messages borg prints when `repository_path` is not a repository.
pub fn missing_repository_messages(repository_path: &str) -> [String; 2] {
    [
        format!("Repository {repository_path} does not exist."),
        format!("{repository_path} is not a valid repository. Check repo config."),
    ]
}

pub fn classify_listing_failure(stderr: &str, repository_path: &str) -> Existence {
    let stderr = stderr.trim_end_matches(['\n', '\r']);

    if missing_repository_messages(repository_path)
        .iter()
        .any(|message| message == stderr)
    {
        Existence::Missing
    } else if stderr.starts_with(LOCK_ACQUIRE_FAILED_PREFIX) {
        // a locked repository exists by definition
        Existence::Present
    } else {
        Existence::Unclassified
    }
}
