//! Validation functions for configuration values.

use validator::ValidationError;

use std::path::Path;

pub fn validate_dir_exist<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    if dir.exists() {
        if !dir.is_dir() {
            return Err(ValidationError::new("InvalidDirectory")
                .with_message(format!("{:?} is not a directory", dir).into()));
        }
    } else {
        return Err(ValidationError::new("InvalidDirectory")
            .with_message(format!("{:?} not found", dir).into()));
    }

    Ok(())
}

pub fn validate_absolute_path<P: AsRef<Path>>(path: P) -> Result<(), ValidationError> {
    let path = path.as_ref();
    if !path.is_absolute() {
        return Err(ValidationError::new("RelativePath")
            .with_message(format!("{:?} is not absolute", path).into()));
    }

    Ok(())
}

/// Local repositories must be absolute paths, remote ones need the `ssh://` scheme.
///
/// borg also understands scp-style `user@host:path`, which is ambiguous with local
/// paths containing a colon and is refused here.
pub fn validate_repository_path<S: AsRef<str>>(path: S) -> Result<(), ValidationError> {
    let path = path.as_ref();
    if path.starts_with("ssh://") || (path.starts_with('/') && !path.contains("::")) {
        return Ok(());
    }

    Err(ValidationError::new("InvalidRepositoryPath").with_message(
        format!("{path:?} must be an absolute local path or an ssh:// URL").into(),
    ))
}
