//! Whole-document JSON, plus the JSON encoder shared with JSON Lines.
//!
//! `ensure_ascii` output escapes every non-ASCII character as `\uXXXX`
//! (UTF-16 surrogate pairs outside the BMP), so the file is pure ASCII.

use crate::error::{ErrorKind, IoliteError};
use crate::io::options::{read_all, write_document, IoOptions};
use crate::policy::ErrorPolicy;
use anyhow::Result;
use serde::Serialize;
use serde_json::ser::{CompactFormatter, Formatter, PrettyFormatter};
use serde_json::{Map, Value};
use std::io;
use std::path::Path;

/// Options for [`read_json`].
#[derive(Clone, Debug, Default)]
pub struct JsonReadOptions {
    pub io: IoOptions,
    pub policy: ErrorPolicy,
}

/// Options for [`write_json`].
#[derive(Clone, Debug)]
pub struct JsonWriteOptions {
    pub io: IoOptions,
    /// Escape non-ASCII characters.
    pub ensure_ascii: bool,
    /// Pretty-print with this many spaces per level; `None` writes compact JSON.
    pub indent: Option<usize>,
    pub policy: ErrorPolicy,
}

impl Default for JsonWriteOptions {
    fn default() -> Self {
        Self {
            io: IoOptions::default(),
            ensure_ascii: true,
            indent: None,
            policy: ErrorPolicy::default(),
        }
    }
}

/// Formatter adapter that escapes non-ASCII string content.
struct AsciiFormatter<F> {
    inner: F,
}

impl<F: Formatter> Formatter for AsciiFormatter<F> {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut start = 0;
        for (i, ch) in fragment.char_indices() {
            if ch.is_ascii() {
                continue;
            }
            writer.write_all(fragment[start..i].as_bytes())?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{unit:04x}")?;
            }
            start = i + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }

    fn begin_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_array(writer)
    }

    fn end_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_array(writer)
    }

    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        self.inner.begin_array_value(writer, first)
    }

    fn end_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_array_value(writer)
    }

    fn begin_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_object(writer)
    }

    fn end_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_object(writer)
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        self.inner.begin_object_key(writer, first)
    }

    fn end_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_object_key(writer)
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_object_value(writer)
    }

    fn end_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_object_value(writer)
    }
}

fn encode_with<T, F>(value: &T, formatter: F) -> serde_json::Result<String>
where
    T: Serialize + ?Sized,
    F: Formatter,
{
    let mut out = Vec::with_capacity(128);
    let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut ser)?;
    // serde_json only emits valid UTF-8.
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// Encode `value` as JSON text.
pub(crate) fn to_json_string<T>(
    value: &T,
    ensure_ascii: bool,
    indent: Option<usize>,
) -> serde_json::Result<String>
where
    T: Serialize + ?Sized,
{
    match indent {
        None if ensure_ascii => encode_with(
            value,
            AsciiFormatter {
                inner: CompactFormatter,
            },
        ),
        None => encode_with(value, CompactFormatter),
        Some(width) => {
            let spaces = vec![b' '; width];
            let pretty = PrettyFormatter::with_indent(&spaces);
            if ensure_ascii {
                encode_with(value, AsciiFormatter { inner: pretty })
            } else {
                encode_with(value, pretty)
            }
        }
    }
}

/// Read `path` as a single JSON document.
///
/// When decoding fails under a lenient policy the failure is logged (unless
/// silent) and an empty object is returned in place of the document.
///
/// # Errors
/// `NotFound` / `WrongKind` for a bad path, I/O errors, and `Decode` under a
/// strict policy.
pub fn read_json(path: impl AsRef<Path>, options: &JsonReadOptions) -> Result<Value> {
    let (path, bytes) = read_all(path, &options.io)?;
    let decoded = options
        .io
        .errors
        .decode(&bytes)
        .and_then(|text| {
            serde_json::from_str::<Value>(&text).map_err(|e| {
                IoliteError::new(ErrorKind::Decode, "invalid JSON").with_source(e.to_string())
            })
        });
    match decoded {
        Ok(value) => Ok(value),
        Err(err) => {
            options.policy.handle(IoliteError {
                message: format!("Cannot load {}: {}", path.display(), err.message),
                ..err
            })?;
            Ok(Value::Object(Map::new()))
        }
    }
}

/// Write `value` to `path` as one JSON document.
///
/// Under a lenient policy an encode failure is logged and the file is left
/// empty.
///
/// # Errors
/// I/O errors, and `Encode` under a strict policy.
pub fn write_json<T>(path: impl AsRef<Path>, value: &T, options: &JsonWriteOptions) -> Result<()>
where
    T: Serialize + ?Sized,
{
    let text = match to_json_string(value, options.ensure_ascii, options.indent) {
        Ok(text) => text,
        Err(e) => {
            let path = path.as_ref();
            options.policy.handle(
                IoliteError::new(
                    ErrorKind::Encode,
                    format!("Cannot encode document for {}", path.display()),
                )
                .with_source(e.to_string()),
            )?;
            String::new()
        }
    };
    write_document(path, &text, &options.io)
}
