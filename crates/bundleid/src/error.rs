//! Error types for bundleid operations.
//!
//! This module defines the [`enum@Error`] enum covering every fatal failure
//! of the pipeline: malformed descriptors or metadata, ambiguous target
//! graphs, invalid identifiers, and I/O during rewriting.
//!
//! Residual collisions are not errors. They are reported through
//! [`crate::allocate::Assignment::residual`] and [`crate::validate::Report`]
//! and only influence the exit status.
//!
//! # See Also
//!
//! - [`crate::Result`] - Convenience type alias using this error

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Location of the first unparseable token in a project descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Byte offset into the descriptor text.
    pub offset: usize,
    /// 1-based line number.
    pub line: usize,
    /// 1-based column (in bytes).
    pub column: usize,
    pub message: String,
}

impl ParseError {
    pub(crate) fn at(source: &str, offset: usize, message: impl Into<String>) -> Self {
        let offset = offset.min(source.len());
        let before = &source.as_bytes()[..offset];
        let line = before.iter().filter(|&&b| b == b'\n').count() + 1;
        let column = match before.iter().rposition(|&b| b == b'\n') {
            Some(nl) => offset - nl,
            None => offset + 1,
        };
        Self {
            offset,
            line,
            column,
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {}, column {} (offset {}): {}",
            self.line, self.column, self.offset, self.message
        )
    }
}

impl std::error::Error for ParseError {}

/// Error type for bundleid operations.
///
/// All public functions in this crate return [`crate::Result<T>`], which uses
/// this error type. Every variant is fatal and is raised before any
/// destructive write happens.
#[derive(Debug, Error)]
pub enum Error {
    /// The project descriptor could not be parsed.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// The descriptor parsed but its target graph is malformed, e.g. a
    /// target without build configurations or a dangling object reference.
    #[error("Invalid descriptor: {0}")]
    Descriptor(String),

    /// Zero or several targets classified as the main application.
    #[error("Classification failed: {0}")]
    Classification(String),

    /// An identifier failed the bundle identifier grammar, or an override
    /// conflicts with the main target.
    #[error("Allocation failed for `{value}`: {reason}")]
    Allocation { value: String, reason: String },

    /// Property list metadata could not be read or written.
    #[error("Plist error in {}: {source}", path.display())]
    Plist {
        path: PathBuf,
        #[source]
        source: plist::Error,
    },

    /// A metadata document parsed but does not have the expected shape.
    #[error("Invalid metadata {}: {reason}", path.display())]
    Metadata { path: PathBuf, reason: String },

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O operation on a known path failed.
    #[error("IO error at {}: {source}", path.display())]
    IoAt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// ZIP archive operation failed.
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// The archive does not have the expected `Payload/<App>.app` layout or
    /// failed verification after rewriting.
    #[error("Invalid archive {}: {reason}", path.display())]
    Archive { path: PathBuf, reason: String },

    /// Invalid configuration (override map, CLI arguments).
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::IoAt {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn archive(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Archive {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Process exit status for this error.
    ///
    /// Input errors (parse, classification, allocation, configuration) map
    /// to `2`; storage errors map to `3`. `1` is reserved for residual
    /// collisions, which are not errors.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Parse(_)
            | Error::Descriptor(_)
            | Error::Classification(_)
            | Error::Allocation { .. }
            | Error::Plist { .. }
            | Error::Metadata { .. }
            | Error::Config(_) => 2,
            Error::Io(_) | Error::IoAt { .. } | Error::Zip(_) | Error::Archive { .. } => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_position() {
        let src = "{\n  a = b;\n  c = ;\n}";
        let offset = src.find("= ;").unwrap() + 2;
        let err = ParseError::at(src, offset, "expected value");
        assert_eq!(err.line, 3);
        assert_eq!(err.column, 7);
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_exit_codes() {
        let parse = Error::Parse(ParseError::at("", 0, "empty"));
        assert_eq!(parse.exit_code(), 2);
        let io = Error::Io(std::io::Error::other("boom"));
        assert_eq!(io.exit_code(), 3);
    }
}
