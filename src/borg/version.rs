use crate::borg::cli::{CommandRunner, RegularCommand};
use crate::borg::result_error::error::Error;
use crate::borg::result_error::result::Result;
use derive_more::Display;

/// Version reported by `borg --version`.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display("{major}.{minor}.{patch}")]
pub struct BorgVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl BorgVersion {
    /// First version with a separate `compact` subcommand.
    pub const COMPACT_SUBCOMMAND: BorgVersion = BorgVersion::new(1, 2, 0);

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        BorgVersion {
            major,
            minor,
            patch,
        }
    }

    pub fn query(runner: &dyn CommandRunner) -> Result<Self> {
        let output = runner.run(
            &RegularCommand::builder()
                .arguments(vec!["--version".to_string()])
                .build(),
        )?;
        Self::parse(&output.stdout)
    }

    /// Parses `borg 1.2.4`. Suffixes such as `1.4.0b1` only keep the leading digits
    /// of the patch component.
    pub fn parse(stdout: &str) -> Result<Self> {
        let malformed = || Error::MalformedOutput(format!("unexpected version output {stdout:?}"));

        let version = stdout
            .trim()
            .split_whitespace()
            .nth(1)
            .ok_or_else(malformed)?;
        let mut parts = version.splitn(3, '.').map(|part| {
            part.chars()
                .take_while(char::is_ascii_digit)
                .collect::<String>()
                .parse::<u32>()
                .map_err(|_| malformed())
        });

        let mut next = || parts.next().ok_or_else(malformed).and_then(|p| p);
        Ok(BorgVersion::new(next()?, next()?, next()?))
    }

    pub fn has_compact(&self) -> bool {
        *self >= Self::COMPACT_SUBCOMMAND
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version() {
        let version = BorgVersion::parse("borg 1.2.4\n").unwrap();
        assert_eq!(version, BorgVersion::new(1, 2, 4));
        assert_eq!(version.to_string(), "1.2.4");
    }

    #[test]
    fn test_parse_prerelease_version() {
        assert_eq!(
            BorgVersion::parse("borg 1.4.0b1").unwrap(),
            BorgVersion::new(1, 4, 0)
        );
    }

    #[test]
    fn test_parse_malformed_version() {
        assert!(matches!(
            BorgVersion::parse("borg"),
            Err(Error::MalformedOutput(_))
        ));
        assert!(matches!(
            BorgVersion::parse("borg 1.2"),
            Err(Error::MalformedOutput(_))
        ));
    }

    #[test]
    fn test_has_compact() {
        assert!(BorgVersion::new(1, 2, 1).has_compact());
        assert!(BorgVersion::new(1, 2, 0).has_compact());
        assert!(!BorgVersion::new(1, 1, 8).has_compact());
    }
}
