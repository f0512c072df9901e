//! JSON Lines (JSONL) reading and writing.
//!
//! - [`read_json_lines`] decodes one [`Value`] per line, lazily.
//! - [`write_json_lines`] encodes any `Serialize` records, one per line.
//!
//! Both take an [`ErrorPolicy`]: under a lenient policy a line that does not
//! decode (or a record that does not encode) is skipped, and a warning naming
//! its 0-based index is logged unless the policy is silent.

use crate::error::{ErrorKind, IoliteError};
use crate::io::json::to_json_string;
use crate::io::options::IoOptions;
use crate::io::text::{write_lines_fallible, TextLines, TextOptions};
use crate::policy::ErrorPolicy;
use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

/// Options for [`read_json_lines`].
#[derive(Clone, Debug)]
pub struct JsonLinesReadOptions {
    pub io: IoOptions,
    /// Drop records that decode to an empty object or array.
    pub skip_empty: bool,
    pub policy: ErrorPolicy,
}

impl Default for JsonLinesReadOptions {
    fn default() -> Self {
        Self {
            io: IoOptions::default(),
            skip_empty: true,
            policy: ErrorPolicy::default(),
        }
    }
}

/// Options for [`write_json_lines`].
#[derive(Clone, Debug)]
pub struct JsonLinesWriteOptions {
    pub io: IoOptions,
    /// Drop records that are an empty object or array.
    pub skip_empty: bool,
    /// Escape non-ASCII characters.
    pub ensure_ascii: bool,
    pub policy: ErrorPolicy,
}

impl Default for JsonLinesWriteOptions {
    fn default() -> Self {
        Self {
            io: IoOptions::default(),
            skip_empty: false,
            ensure_ascii: true,
            policy: ErrorPolicy::default(),
        }
    }
}

/// `true` for `{}` and `[]`.
pub(crate) fn is_empty_record(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Single-pass iterator of decoded JSON Lines records.
pub struct JsonLines {
    lines: TextLines,
    skip_empty: bool,
    policy: ErrorPolicy,
    index: usize,
    done: bool,
}

impl Iterator for JsonLines {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Result<Value>> {
        while !self.done {
            let text = match self.lines.next()? {
                Ok(text) => text,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            };
            let num = self.index;
            self.index += 1;

            match serde_json::from_str::<Value>(&text) {
                Ok(value) => {
                    if self.skip_empty && is_empty_record(&value) {
                        continue;
                    }
                    return Some(Ok(value));
                }
                Err(e) => {
                    let err = IoliteError::new(
                        ErrorKind::Decode,
                        format!("Cannot parse #{num}: \"{text}\""),
                    )
                    .with_source(e.to_string());
                    if let Err(err) = self.policy.handle(err) {
                        self.done = true;
                        return Some(Err(err));
                    }
                }
            }
        }
        None
    }
}

/// Open `path` (which must exist) and iterate over its JSON records.
///
/// Every raw line is decoded, so a blank line is a decode failure like any
/// other malformed line.
///
/// # Errors
/// `NotFound` / `WrongKind` if `path` is not an existing file. Decode and read
/// errors are yielded by the iterator, which then ends.
pub fn read_json_lines(
    path: impl AsRef<Path>,
    options: &JsonLinesReadOptions,
) -> Result<JsonLines> {
    let lines = TextLines::open(
        path,
        &TextOptions {
            io: options.io.clone(),
            strip: false,
            skip_empty: false,
        },
    )?;
    Ok(JsonLines {
        lines,
        skip_empty: options.skip_empty,
        policy: options.policy,
        index: 0,
        done: false,
    })
}

/// Write `records` to `path`, one compact JSON value per line.
///
/// # Returns
/// The number of lines written.
///
/// # Errors
/// I/O errors, and `Encode` under a strict policy (lines already written stay
/// on disk).
pub fn write_json_lines<I, T>(
    path: impl AsRef<Path>,
    records: I,
    options: &JsonLinesWriteOptions,
) -> Result<usize>
where
    I: IntoIterator<Item = T>,
    T: Serialize,
{
    let skip_empty = options.skip_empty;
    let ensure_ascii = options.ensure_ascii;
    let policy = options.policy;

    let encoded = records
        .into_iter()
        .enumerate()
        .filter_map(move |(num, record)| {
            let encoded = serde_json::to_value(&record).and_then(|value| {
                if skip_empty && is_empty_record(&value) {
                    return Ok(None);
                }
                to_json_string(&value, ensure_ascii, None).map(Some)
            });
            match encoded {
                Ok(Some(text)) => Some(Ok(text)),
                Ok(None) => None,
                Err(e) => {
                    let err = IoliteError::new(ErrorKind::Encode, format!("Cannot encode #{num}"))
                        .with_source(e.to_string());
                    policy.handle(err).err().map(Err)
                }
            }
        });

    write_lines_fallible(
        path,
        encoded,
        &TextOptions {
            io: options.io.clone(),
            strip: false,
            skip_empty: false,
        },
    )
}
