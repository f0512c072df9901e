//! # iolite
//!
//! Small, permissive helpers for the files a data job touches every day:
//! resolving paths, and reading or writing text lines, JSON Lines, CSV, JSON,
//! TOML and binary objects.
//!
//! ## Key Features
//!
//! - **Path helpers** - [`file`] and [`folder`] with `$VAR` expansion,
//!   existence checks, directory reset and creation
//! - **Lazy readers** - [`read_text_lines`], [`read_json_lines`] and
//!   [`read_csv_lines`] return single-pass iterators that own the file handle
//! - **Raise or warn** - every record-level reader and writer takes an
//!   [`ErrorPolicy`]: fail on the first bad item, or log it and move on
//! - **CSV header matching** - arity checks against the header, rows as
//!   objects, keyed writes with missing/unknown key handling
//! - **Transparent compression** - `.gz`, `.zst`, `.bz2` and `.xz` files are
//!   compressed and decompressed on the fly (see [`io::compression`])
//! - **Text encodings** - UTF-8 by default, any `encoding_rs` encoding on
//!   request (see [`encoding_for_label`])
//! - **Progress reporting** - opt-in `tracing` progress events per call
//!
//! ## Quick Start
//!
//! ```no_run
//! use iolite::*;
//! use serde_json::json;
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! write_json_lines(
//!     "events.jsonl",
//!     vec![json!({"id": 1}), json!({"id": 2})],
//!     &JsonLinesWriteOptions::default(),
//! )?;
//!
//! let lenient = JsonLinesReadOptions {
//!     policy: ErrorPolicy::LENIENT,
//!     ..Default::default()
//! };
//! for record in read_json_lines("events.jsonl", &lenient)? {
//!     println!("{}", record?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Errors
//!
//! Functions return [`anyhow::Result`]. Failures raised by this crate carry an
//! [`IoliteError`] whose [`ErrorKind`] can be recovered with
//! [`IoliteError::kind_of`].
//!
//! ## Logging
//!
//! Suppressed failures, reset problems and progress are reported through
//! [`tracing`]. Install any subscriber to see them.
//!
//! ## Feature Flags
//!
//! - `io-jsonl` - JSON Lines reader/writer
//! - `io-csv` - CSV reader/writer (via `csv`)
//! - `io-toml` - TOML documents (via `toml`)
//! - `io-object` - binary object container (via `postcard`, `memmap2`)
//! - `compression-gzip`, `compression-zstd`, `compression-bzip2`,
//!   `compression-xz` - built-in codecs

pub mod error;
pub mod io;
pub mod path;
pub mod policy;
pub mod progress;

// General re-exports
pub use error::{ErrorKind, IoliteError};
pub use io::json::{read_json, write_json, JsonReadOptions, JsonWriteOptions};
pub use io::options::{encoding_for_label, IoOptions, Newline, Utf8Errors};
pub use io::text::{read_text_lines, write_text_lines, TextLines, TextOptions};
pub use path::{expand_vars, file, folder, FolderOptions, PathOptions};
pub use policy::ErrorPolicy;

// Gated re-exports
#[cfg(feature = "io-jsonl")]
pub use io::jsonl::{
    read_json_lines, write_json_lines, JsonLines, JsonLinesReadOptions, JsonLinesWriteOptions,
};

#[cfg(feature = "io-csv")]
pub use io::csv::{
    read_csv_lines, write_csv_lines, CsvDialect, CsvLines, CsvReadOptions, CsvWriteOptions,
    LineTerminator, Quoting,
};

#[cfg(feature = "io-toml")]
pub use io::toml::{read_toml, write_toml};

#[cfg(feature = "io-object")]
pub use io::object::{read_object, write_object, Compress, ObjectReadOptions, ObjectWriteOptions};
