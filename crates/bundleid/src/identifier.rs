//! Bundle identifier grammar.
//!
//! A bundle identifier is one or more dot-separated segments, each made of
//! ASCII letters and digits only, at most [`MAX_LEN`] bytes in total.
//! [`BundleId`] can only be constructed from a conforming string, so any
//! value that reaches the allocator or the rewriter is already valid.

use crate::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Maximum length of a bundle identifier in bytes.
pub const MAX_LEN: usize = 255;

/// A validated bundle identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct BundleId(String);

impl BundleId {
    /// Parse and validate a bundle identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Allocation`] naming the offending value when it
    /// violates the grammar.
    pub fn parse(value: &str) -> Result<Self> {
        match check(value) {
            Ok(()) => Ok(BundleId(value.to_string())),
            Err(reason) => Err(Error::Allocation {
                value: value.to_string(),
                reason,
            }),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Append `segments` as new dot-separated segments.
    ///
    /// The result is re-validated, so callers get an error rather than a
    /// malformed identifier when a segment is empty or the total gets too
    /// long.
    pub fn join(&self, segments: &[&str]) -> Result<BundleId> {
        let mut value = self.0.clone();
        for segment in segments {
            value.push('.');
            value.push_str(segment);
        }
        BundleId::parse(&value)
    }
}

/// Whether `value` conforms to the grammar.
pub fn is_valid(value: &str) -> bool {
    check(value).is_ok()
}

fn check(value: &str) -> std::result::Result<(), String> {
    if value.is_empty() {
        return Err("identifier is empty".into());
    }
    if value.len() > MAX_LEN {
        return Err(format!(
            "identifier is {} bytes long, maximum is {MAX_LEN}",
            value.len()
        ));
    }
    for (index, segment) in value.split('.').enumerate() {
        if segment.is_empty() {
            return Err(format!("segment {} is empty", index + 1));
        }
        if let Some(bad) = segment.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(format!(
                "segment `{segment}` contains `{bad}`, only ASCII letters and digits are allowed"
            ));
        }
    }
    Ok(())
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BundleId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        BundleId::parse(s)
    }
}

impl AsRef<str> for BundleId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for BundleId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for BundleId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifiers() {
        assert!(is_valid("com.acme.app"));
        assert!(is_valid("App"));
        assert!(is_valid("com.acme2.app.extension.1"));
    }

    #[test]
    fn test_rejects_underscore() {
        let err = BundleId::parse("com.acme_app").unwrap_err();
        match err {
            Error::Allocation { value, reason } => {
                assert_eq!(value, "com.acme_app");
                assert!(reason.contains('_'));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_rejects_empty_segments_and_hyphens() {
        assert!(!is_valid(""));
        assert!(!is_valid("com..acme"));
        assert!(!is_valid(".com.acme"));
        assert!(!is_valid("com.acme."));
        assert!(!is_valid("com.acme-app"));
        assert!(!is_valid("$(PRODUCT_BUNDLE_IDENTIFIER)"));
    }

    #[test]
    fn test_length_limit() {
        let ok = format!("a.{}", "b".repeat(MAX_LEN - 2));
        assert!(is_valid(&ok));
        let too_long = format!("a.{}", "b".repeat(MAX_LEN - 1));
        assert!(!is_valid(&too_long));
    }

    #[test]
    fn test_join() {
        let base = BundleId::parse("com.acme.app").unwrap();
        assert_eq!(base.join(&["extension", "2"]).unwrap(), "com.acme.app.extension.2");
        assert!(base.join(&[""]).is_err());
    }
}
