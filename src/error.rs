//! Error type shared by every reader, writer and path helper.
//!
//! All public functions return [`anyhow::Result`]. Failures that originate in
//! this crate (as opposed to raw I/O errors from the OS) carry an
//! [`IoliteError`] at the root of the chain, so callers can branch on the
//! [`ErrorKind`]:
//!
//! ```
//! use iolite::error::{ErrorKind, IoliteError};
//! use iolite::path::{file, PathOptions};
//!
//! let err = file("/definitely/not/here.txt", &PathOptions { exists: true, ..Default::default() })
//!     .unwrap_err();
//! assert_eq!(IoliteError::kind_of(&err), Some(ErrorKind::NotFound));
//! ```

use std::error::Error;
use std::fmt;

/// Library-level failure with a kind, a message and an optional cause.
#[derive(Debug, Clone)]
pub struct IoliteError {
    pub message: String,
    pub kind: ErrorKind,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A path required to exist is absent.
    NotFound,
    /// A path exists but is a file where a directory was expected, or vice versa.
    WrongKind,
    /// Text could not be decoded (JSON syntax, invalid UTF-8, bad container).
    Decode,
    /// A value could not be encoded.
    Encode,
    /// The requested option combination is invalid.
    Configuration,
    /// The CSV header row is unreadable.
    InvalidHeader,
    /// A CSV row has a different field count than the header.
    ArityMismatch,
    /// A record has the wrong shape for the requested write mode.
    InvalidRecord,
    /// Keyed CSV write received no records.
    EmptyInput,
    /// A record lacks a column present in the header.
    MissingKey,
    /// A record has a key that the header does not list.
    UnknownKey,
}

impl fmt::Display for IoliteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)?;
        if let Some(source) = &self.source {
            write!(f, " ({source})")?;
        }
        Ok(())
    }
}

impl Error for IoliteError {}

impl IoliteError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            source: None,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Kind of the [`IoliteError`] inside an `anyhow` chain, if there is one.
    pub fn kind_of(err: &anyhow::Error) -> Option<ErrorKind> {
        err.chain()
            .find_map(|cause| cause.downcast_ref::<IoliteError>())
            .map(|e| e.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_source() {
        let err = IoliteError::new(ErrorKind::Decode, "Cannot parse #3").with_source("EOF");
        assert_eq!(err.to_string(), "Decode: Cannot parse #3 (EOF)");
    }

    #[test]
    fn kind_survives_context() {
        let err = anyhow::Error::new(IoliteError::new(ErrorKind::MissingKey, "key \"b\""))
            .context("write rows.csv");
        assert_eq!(IoliteError::kind_of(&err), Some(ErrorKind::MissingKey));
        assert_eq!(IoliteError::kind_of(&anyhow::anyhow!("plain")), None);
    }
}
