//! Secret strings with redacted display and serialization.
//!
//! Passphrases travel to borg through environment variables only. Wrapping them in
//! `RedactedString` keeps them out of `Debug` output, tracing events and any
//! re-serialized configuration.

use bon::Builder;
use derive_more::From;
use getset::Getters;
use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Debug, Formatter};
use std::result;
use validator::Validate;
use zeroize::Zeroize;

/// Placeholder text shown instead of the actual secret in logs/debug output
pub static REDACTED_PASSPHRASE: &str = "###REDACTED_PASSPHRASE###";

/// A string that gets redacted in debug output and serialization
///
/// The inner value is only reachable through the `inner()` getter and is zeroed
/// when dropped.
#[derive(Validate, Clone, Zeroize, From, Builder, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct RedactedString {
    /// Minimum 8 characters for a repository passphrase
    #[validate(length(min = 8))]
    #[builder(into)]
    inner: String,
}

impl From<&str> for RedactedString {
    fn from(value: &str) -> Self {
        RedactedString::builder().inner(value).build()
    }
}

impl Debug for RedactedString {
    /// Always shows redacted placeholder instead of actual value
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", REDACTED_PASSPHRASE)
    }
}

impl Serialize for RedactedString {
    /// Always serializes as redacted placeholder
    fn serialize<S: Serializer>(&self, serializer: S) -> result::Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED_PASSPHRASE)
    }
}

impl<'de> Deserialize<'de> for RedactedString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> result::Result<Self, D::Error> {
        deserializer.deserialize_str(RedactedStringVisitor)
    }
}

impl Drop for RedactedString {
    fn drop(&mut self) {
        self.zeroize();
    }
}

pub struct RedactedStringVisitor;

impl Visitor<'_> for RedactedStringVisitor {
    type Value = RedactedString;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a string")
    }

    fn visit_str<E>(self, v: &str) -> result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(RedactedString::builder().inner(v).build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacted_string_validation() {
        let valid = RedactedString::from("valid_password");
        assert!(valid.validate().is_ok());

        let invalid = RedactedString::from("short");
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_redacted_string_debug_hides_secret() {
        let secret = RedactedString::from("hunter2hunter2");
        let debug = format!("{:?}", secret);
        assert_eq!(debug, REDACTED_PASSPHRASE);
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_redacted_string_serialize_hides_secret() {
        let secret = RedactedString::from("hunter2hunter2");
        let json = serde_json::to_string(&secret).unwrap();
        assert_eq!(json, format!("\"{REDACTED_PASSPHRASE}\""));
    }

    #[test]
    fn test_redacted_string_deserialize_keeps_secret() {
        let secret: RedactedString = serde_json::from_str("\"hunter2hunter2\"").unwrap();
        assert_eq!(secret.inner(), "hunter2hunter2");
    }

    #[test]
    fn test_redacted_string_zeroize_clears_secret() {
        let mut secret = RedactedString::from("hunter2hunter2");
        secret.zeroize();
        assert!(secret.inner().is_empty());
    }
}
