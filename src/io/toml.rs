//! TOML documents. No error policy: every failure propagates.

use crate::error::{ErrorKind, IoliteError};
use crate::io::options::{read_all, write_document, IoOptions};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Read `path` as a TOML document into `T` (use `toml::Table` for untyped access).
///
/// # Errors
/// `NotFound` / `WrongKind` for a bad path, I/O errors, and `Decode` when
/// the text is not valid TOML for `T`.
pub fn read_toml<T: DeserializeOwned>(path: impl AsRef<Path>, options: &IoOptions) -> Result<T> {
    let (path, bytes) = read_all(path, options)?;
    let text = options.errors.decode(&bytes)?;
    let value = toml::from_str(&text).map_err(|e| {
        IoliteError::new(ErrorKind::Decode, format!("Cannot load {}", path.display()))
            .with_source(e.to_string())
    })?;
    Ok(value)
}

/// Write `value` to `path` as a TOML document.
///
/// # Errors
/// I/O errors, and `Encode` when `value` has no TOML representation (for
/// example a top-level array).
pub fn write_toml<T>(path: impl AsRef<Path>, value: &T, options: &IoOptions) -> Result<()>
where
    T: Serialize + ?Sized,
{
    let path = path.as_ref();
    let text = toml::to_string(value)
        .map_err(|e| {
            IoliteError::new(ErrorKind::Encode, format!("Cannot encode {}", path.display()))
                .with_source(e.to_string())
        })
        .with_context(|| format!("write TOML {}", path.display()))?;
    write_document(path, &text, options)
}
