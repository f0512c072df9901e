//! CSV reading and writing with header matching.
//!
//! # Reading
//! [`read_csv_lines`] yields every row as a [`Value`]: an array of strings,
//! or (with `to_dict`) an object keyed by the header. With `match_header`
//! each row must have as many fields as the header; under a lenient policy
//! mismatched rows are skipped.
//!
//! # Writing
//! [`write_csv_lines`] accepts any `Serialize` records. Positional mode
//! expects arrays; keyed mode (`from_dict`) expects objects and derives the
//! column order from the first record's keys.
//!
//! Rows are parsed flexibly (field counts may vary) so that arity is checked
//! against the header here, under the error policy, rather than by the parser.
//! A blank line is a row with no fields, so under `match_header` it fails the
//! arity check like any other short row.

use crate::error::{ErrorKind, IoliteError};
use crate::io::options::{open_reader, open_writer, IoOptions, Utf8Errors};
use crate::policy::ErrorPolicy;
use crate::progress::{Progress, ProgressIter};
use anyhow::{Context, Result};
use csv::{ByteRecord, ByteRecordsIntoIter, QuoteStyle, ReaderBuilder, Terminator, WriterBuilder};
use serde::Serialize;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::io::{self, BufRead, Read};
use std::iter;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// When the writer wraps fields in quotes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Quoting {
    /// Only fields containing delimiters, quotes or newlines.
    #[default]
    Minimal,
    /// Every field.
    All,
    /// Every field that is not a number.
    NonNumeric,
    /// Never; quote characters are not special on read either.
    Never,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LineTerminator {
    #[default]
    CrLf,
    Lf,
}

/// Delimiter, quoting and line-ending conventions of a CSV file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CsvDialect {
    pub delimiter: u8,
    pub quote: u8,
    /// A quote inside a quoted field is written as two quotes.
    pub double_quote: bool,
    /// Escape character used when `double_quote` is off.
    pub escape: Option<u8>,
    pub quoting: Quoting,
    /// Terminator written after each row. Reading accepts `\r`, `\n` and `\r\n`.
    pub terminator: LineTerminator,
}

impl Default for CsvDialect {
    fn default() -> Self {
        Self::excel()
    }
}

impl CsvDialect {
    /// Comma separated, minimal quoting, CRLF rows.
    pub const fn excel() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            double_quote: true,
            escape: None,
            quoting: Quoting::Minimal,
            terminator: LineTerminator::CrLf,
        }
    }

    /// Like [`excel`](Self::excel) with tab separators.
    pub const fn excel_tab() -> Self {
        Self {
            delimiter: b'\t',
            ..Self::excel()
        }
    }

    /// Comma separated, every field quoted, LF rows.
    pub const fn unix() -> Self {
        Self {
            quoting: Quoting::All,
            terminator: LineTerminator::Lf,
            ..Self::excel()
        }
    }

    /// Look up a dialect by name: `excel`, `excel-tab` or `unix`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "excel" => Some(Self::excel()),
            "excel-tab" | "excel_tab" => Some(Self::excel_tab()),
            "unix" => Some(Self::unix()),
            _ => None,
        }
    }

    fn reader_builder(&self) -> ReaderBuilder {
        let mut builder = ReaderBuilder::new();
        builder
            .delimiter(self.delimiter)
            .quote(self.quote)
            .double_quote(self.double_quote)
            .escape(self.escape)
            .quoting(self.quoting != Quoting::Never)
            .has_headers(false)
            .flexible(true);
        builder
    }

    fn writer_builder(&self) -> WriterBuilder {
        let mut builder = WriterBuilder::new();
        builder
            .delimiter(self.delimiter)
            .quote(self.quote)
            .double_quote(self.double_quote)
            .quote_style(match self.quoting {
                Quoting::Minimal => QuoteStyle::Necessary,
                Quoting::All => QuoteStyle::Always,
                Quoting::NonNumeric => QuoteStyle::NonNumeric,
                Quoting::Never => QuoteStyle::Never,
            })
            .terminator(match self.terminator {
                LineTerminator::CrLf => Terminator::CRLF,
                LineTerminator::Lf => Terminator::Any(b'\n'),
            })
            .has_headers(false)
            .flexible(true);
        if let Some(escape) = self.escape {
            builder.escape(escape);
        }
        builder
    }
}

/// Options for [`read_csv_lines`].
#[derive(Clone, Debug)]
pub struct CsvReadOptions {
    pub io: IoOptions,
    /// The first row is a header.
    pub header_exists: bool,
    /// Do not yield the header row.
    pub skip_header: bool,
    /// Reject rows whose field count differs from the header's.
    pub match_header: bool,
    /// Yield rows as objects keyed by the header. Requires `match_header`.
    pub to_dict: bool,
    pub dialect: CsvDialect,
    pub policy: ErrorPolicy,
}

impl Default for CsvReadOptions {
    fn default() -> Self {
        Self {
            io: IoOptions::default(),
            header_exists: true,
            skip_header: false,
            match_header: true,
            to_dict: false,
            dialect: CsvDialect::default(),
            policy: ErrorPolicy::default(),
        }
    }
}

/// Options for [`write_csv_lines`].
#[derive(Clone, Debug)]
pub struct CsvWriteOptions {
    pub io: IoOptions,
    /// Records are objects; write a header from the first record's keys.
    pub from_dict: bool,
    /// Write an empty cell for a missing key instead of failing.
    pub set_missing_key_to_none: bool,
    /// Silently drop keys that are not in the header.
    pub ignore_unknown_key: bool,
    pub dialect: CsvDialect,
    pub policy: ErrorPolicy,
}

impl Default for CsvWriteOptions {
    fn default() -> Self {
        Self {
            io: IoOptions::default(),
            from_dict: false,
            set_missing_key_to_none: false,
            ignore_unknown_key: true,
            dialect: CsvDialect::default(),
            policy: ErrorPolicy::default(),
        }
    }
}

/// Bytes handed to the parser that have not yet been attributed to a row.
#[derive(Default)]
struct Seen {
    offset: u64,
    bytes: Vec<u8>,
}

/// Copies everything the parser reads, so the blank lines it discards can be
/// counted between records.
struct Tap {
    inner: Box<dyn BufRead>,
    seen: Rc<RefCell<Seen>>,
}

impl Read for Tap {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.seen.borrow_mut().bytes.extend_from_slice(&buf[..n]);
        Ok(n)
    }
}

/// Blank lines at the start of `raw`. `after_cr` skips the `\n` that
/// completes a previous `\r\n` terminator.
fn leading_blank_lines(raw: &[u8], after_cr: bool) -> usize {
    let mut i = usize::from(after_cr && raw.first() == Some(&b'\n'));
    let mut lines = 0;
    while let Some(&b) = raw.get(i) {
        match b {
            b'\r' if raw.get(i + 1) == Some(&b'\n') => i += 2,
            b'\r' | b'\n' => i += 1,
            _ => break,
        }
        lines += 1;
    }
    lines
}

/// Single-pass iterator of CSV rows.
pub struct CsvLines {
    rows: Option<ByteRecordsIntoIter<Tap>>,
    seen: Rc<RefCell<Seen>>,
    after_cr: bool,
    /// Blank rows still to yield before `held`.
    blanks: usize,
    held: Option<ByteRecord>,
    path: PathBuf,
    header: Option<Vec<String>>,
    header_exists: bool,
    skip_header: bool,
    match_header: bool,
    to_dict: bool,
    errors: Utf8Errors,
    policy: ErrorPolicy,
    index: usize,
    progress: Option<Progress>,
}

impl CsvLines {
    /// Header captured from the first row, once it has been read.
    pub fn header(&self) -> Option<&[String]> {
        self.header.as_deref()
    }

    /// Attribute the bytes consumed since the previous row to the row just
    /// read (or to the end of input) and count the blank lines among them.
    fn blank_lines_consumed(&mut self) -> usize {
        let Some(rows) = self.rows.as_ref() else {
            return 0;
        };
        let end = rows.reader().position().byte();
        let mut seen = self.seen.borrow_mut();
        let len = usize::try_from(end.saturating_sub(seen.offset))
            .unwrap_or(usize::MAX)
            .min(seen.bytes.len());
        let blanks = leading_blank_lines(&seen.bytes[..len], self.after_cr);
        if let Some(&last) = seen.bytes[..len].last() {
            self.after_cr = last == b'\r';
        }
        seen.bytes.drain(..len);
        seen.offset = end;
        blanks
    }

    fn stop(&mut self) {
        self.rows = None;
        self.blanks = 0;
        self.held = None;
        if let Some(progress) = self.progress.as_mut() {
            progress.finish();
        }
    }

    fn fail(&mut self, err: anyhow::Error) -> Option<Result<Value>> {
        self.stop();
        Some(Err(err))
    }

    fn decode_fields(&self, record: &ByteRecord) -> Result<Vec<String>, IoliteError> {
        record
            .iter()
            .map(|field| self.errors.decode(field).map(|s| s.into_owned()))
            .collect()
    }

    fn shape(&self, fields: Vec<String>) -> Value {
        match (&self.header, self.to_dict) {
            (Some(header), true) => {
                let mut map = Map::with_capacity(header.len());
                for (key, field) in header.iter().zip(fields) {
                    map.insert(key.clone(), Value::String(field));
                }
                Value::Object(map)
            }
            _ => Value::Array(fields.into_iter().map(Value::String).collect()),
        }
    }
}

impl Iterator for CsvLines {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Result<Value>> {
        loop {
            let record = if self.blanks > 0 {
                self.blanks -= 1;
                ByteRecord::new()
            } else if let Some(record) = self.held.take() {
                record
            } else {
                let next = self.rows.as_mut()?.next();
                match next {
                    None => {
                        self.blanks = self.blank_lines_consumed();
                        if self.blanks > 0 {
                            continue;
                        }
                        self.stop();
                        return None;
                    }
                    Some(Ok(record)) => {
                        self.blanks = self.blank_lines_consumed();
                        if self.blanks > 0 {
                            self.held = Some(record);
                            continue;
                        }
                        record
                    }
                    Some(Err(e)) => {
                        let err = anyhow::Error::new(e).context(format!(
                            "read CSV row #{} in {}",
                            self.index,
                            self.path.display()
                        ));
                        return self.fail(err);
                    }
                }
            };
            let num = self.index;
            self.index += 1;
            if let Some(progress) = self.progress.as_mut() {
                progress.tick();
            }

            if self.header_exists && num == 0 {
                match self.decode_fields(&record) {
                    Ok(header) => self.header = Some(header),
                    Err(err) => {
                        let err = IoliteError::new(
                            ErrorKind::InvalidHeader,
                            format!("Header of {} is unreadable.", self.path.display()),
                        )
                        .with_source(err.to_string());
                        if let Err(err) = self.policy.handle(err) {
                            return self.fail(err);
                        }
                        self.stop();
                        return None;
                    }
                }
                if self.skip_header {
                    continue;
                }
            }

            let fields = match self.decode_fields(&record) {
                Ok(fields) => fields,
                Err(err) => {
                    let err = IoliteError::new(ErrorKind::Decode, format!("Cannot decode #{num}"))
                        .with_source(err.to_string());
                    if let Err(err) = self.policy.handle(err) {
                        return self.fail(err);
                    }
                    continue;
                }
            };

            if self.match_header
                && let Some(header) = &self.header
                && header.len() != fields.len()
            {
                let err = IoliteError::new(
                    ErrorKind::ArityMismatch,
                    format!("Cannot match #{num} = {fields:?} with header = {header:?}."),
                );
                if let Err(err) = self.policy.handle(err) {
                    return self.fail(err);
                }
                continue;
            }

            return Some(Ok(self.shape(fields)));
        }
    }
}

/// Open `path` (which must exist) and iterate over its rows.
///
/// Option conflicts are reported before any row is read: `match_header`
/// without `header_exists`, and `to_dict` without `match_header`, are
/// `Configuration` errors. Under a lenient policy they are logged and the
/// returned iterator is empty.
///
/// # Errors
/// `NotFound` / `WrongKind` for a bad path and `Configuration` under a strict
/// policy. Row-level errors are yielded by the iterator.
pub fn read_csv_lines(path: impl AsRef<Path>, options: &CsvReadOptions) -> Result<CsvLines> {
    let (path, rdr) = open_reader(path, &options.io)?;

    let conflict = if !options.header_exists && options.match_header {
        Some("Cannot match header if header does not exist.")
    } else if options.to_dict && !options.match_header {
        Some("Must match header before converting to dict.")
    } else {
        None
    };

    let mut builder = options.dialect.reader_builder();
    if let Some(capacity) = options.io.buffering {
        builder.buffer_capacity(capacity.max(1));
    }
    let seen = Rc::new(RefCell::new(Seen::default()));
    let tap = Tap {
        inner: rdr,
        seen: Rc::clone(&seen),
    };
    let mut lines = CsvLines {
        rows: Some(builder.from_reader(tap).into_byte_records()),
        seen,
        after_cr: false,
        blanks: 0,
        held: None,
        progress: options
            .io
            .progress
            .then(|| Progress::new(path.display().to_string())),
        path,
        header: None,
        header_exists: options.header_exists,
        skip_header: options.skip_header,
        match_header: options.match_header,
        to_dict: options.to_dict,
        errors: options.io.errors,
        policy: options.policy,
        index: 0,
    };

    if let Some(msg) = conflict {
        options
            .policy
            .handle(IoliteError::new(ErrorKind::Configuration, msg))?;
        lines.rows = None;
    }
    Ok(lines)
}

/// Text of one CSV cell.
fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Write `records` to `path` as CSV rows.
///
/// The file is created before any record is inspected; a write that stops
/// early leaves whatever was already written.
///
/// # Returns
/// The number of data rows written (the header row is not counted).
///
/// # Errors
/// I/O errors, and under a strict policy: `Encode` for a record that does not
/// serialize, `InvalidRecord` for a record of the wrong shape, `EmptyInput`
/// for keyed writes without records, `MissingKey` / `UnknownKey` for keyed
/// records that do not fit the header.
pub fn write_csv_lines<I, T>(path: impl AsRef<Path>, records: I, options: &CsvWriteOptions) -> Result<usize>
where
    I: IntoIterator<Item = T>,
    T: Serialize,
{
    let (path, w) = open_writer(path, &options.io)?;
    let mut wtr = options.dialect.writer_builder().from_writer(w);
    let policy = options.policy;
    let label = path.display().to_string();
    let mut records = ProgressIter::new(records.into_iter(), options.io.progress, label);

    let to_value = |num: usize, record: &T| {
        serde_json::to_value(record).map_err(|e| {
            IoliteError::new(ErrorKind::Encode, format!("Cannot encode #{num}"))
                .with_source(e.to_string())
        })
    };

    let mut written = 0usize;
    if options.from_dict {
        let Some(first) = records.next() else {
            policy.handle(IoliteError::new(ErrorKind::EmptyInput, "empty records."))?;
            return Ok(0);
        };
        let first = match to_value(0, &first) {
            Ok(value) => value,
            Err(err) => {
                policy.handle(err)?;
                return Ok(0);
            }
        };
        let keys: Vec<String> = match &first {
            Value::Object(map) => map.keys().cloned().collect(),
            other => {
                policy.handle(IoliteError::new(
                    ErrorKind::InvalidRecord,
                    format!("records[0]={other} should be a mapping."),
                ))?;
                return Ok(0);
            }
        };
        wtr.write_record(&keys)
            .with_context(|| format!("write CSV header to {}", path.display()))?;

        let rest = records.enumerate().map(|(i, record)| (i + 1, to_value(i + 1, &record)));
        for (num, value) in iter::once((0, Ok(first))).chain(rest) {
            let map = match value {
                Ok(Value::Object(map)) => map,
                Ok(other) => {
                    policy.handle(IoliteError::new(
                        ErrorKind::InvalidRecord,
                        format!("#{num} {other} should be a mapping."),
                    ))?;
                    continue;
                }
                Err(err) => {
                    policy.handle(err)?;
                    continue;
                }
            };

            let mut row = Vec::with_capacity(keys.len());
            let mut missing = None;
            for key in &keys {
                match map.get(key) {
                    Some(v) => row.push(cell(v)),
                    None if options.set_missing_key_to_none => row.push(String::new()),
                    None => {
                        missing = Some(key);
                        break;
                    }
                }
            }
            if let Some(key) = missing {
                policy.handle(IoliteError::new(
                    ErrorKind::MissingKey,
                    format!("#{num} key \"{key}\" not found. Skip."),
                ))?;
                continue;
            }
            if !options.ignore_unknown_key {
                let unknown: Vec<&String> = map.keys().filter(|k| !keys.contains(*k)).collect();
                if !unknown.is_empty() {
                    policy.handle(IoliteError::new(
                        ErrorKind::UnknownKey,
                        format!("#{num} contains unknown keys {unknown:?}. Skip."),
                    ))?;
                    continue;
                }
            }

            wtr.write_record(&row)
                .with_context(|| format!("write CSV row #{num} to {}", path.display()))?;
            written += 1;
        }
    } else {
        for (num, record) in records.enumerate() {
            let items = match to_value(num, &record) {
                Ok(Value::Array(items)) => items,
                Ok(other) => {
                    policy.handle(IoliteError::new(
                        ErrorKind::InvalidRecord,
                        format!("#{num} {other} is not a sequence. Skip."),
                    ))?;
                    continue;
                }
                Err(err) => {
                    policy.handle(err)?;
                    continue;
                }
            };
            wtr.write_record(items.iter().map(cell))
                .with_context(|| format!("write CSV row #{num} to {}", path.display()))?;
            written += 1;
        }
    }

    let w = wtr
        .into_inner()
        .map_err(|e| e.into_error())
        .with_context(|| format!("flush {}", path.display()))?;
    w.finish()
        .with_context(|| format!("finish {}", path.display()))?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dialect_names() {
        assert_eq!(CsvDialect::from_name("excel"), Some(CsvDialect::excel()));
        assert_eq!(CsvDialect::from_name("excel-tab").map(|d| d.delimiter), Some(b'\t'));
        assert_eq!(
            CsvDialect::from_name("unix").map(|d| d.terminator),
            Some(LineTerminator::Lf)
        );
        assert_eq!(CsvDialect::from_name("tsv"), None);
    }

    #[test]
    fn blank_line_counting() {
        assert_eq!(leading_blank_lines(b"1,2\n", false), 0);
        assert_eq!(leading_blank_lines(b"\n\r\n\r3,4\n", false), 3);
        // The LF finishing a CRLF terminator is not a blank line.
        assert_eq!(leading_blank_lines(b"\n3,4\r", true), 0);
        assert_eq!(leading_blank_lines(b"\n\r\n", true), 1);
        assert_eq!(leading_blank_lines(b"", true), 0);
    }

    #[test]
    fn cells_render_json_scalars() {
        assert_eq!(cell(&json!(null)), "");
        assert_eq!(cell(&json!("x,y")), "x,y");
        assert_eq!(cell(&json!(1.5)), "1.5");
        assert_eq!(cell(&json!(true)), "true");
        assert_eq!(cell(&json!([1, 2])), "[1,2]");
    }
}
