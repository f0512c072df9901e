//! Lazy text-line reading and writing.
//!
//! [`read_text_lines`] returns a [`TextLines`] iterator that owns the file
//! handle: lines are produced one at a time, in file order, without their
//! `\n` / `\r\n` terminator. The iterator is single-pass; the handle is closed
//! when it is dropped.
//!
//! [`write_text_lines`] writes each line followed by the configured newline.

use crate::error::IoliteError;
use crate::io::options::{open_reader, open_writer, IoOptions, Utf8Errors};
use crate::progress::{Progress, ProgressIter};
use anyhow::{Context, Result};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

/// Options for [`read_text_lines`] and [`write_text_lines`].
#[derive(Clone, Debug, Default)]
pub struct TextOptions {
    pub io: IoOptions,
    /// Trim surrounding whitespace from every line.
    pub strip: bool,
    /// Drop lines that are empty (after stripping).
    pub skip_empty: bool,
}

/// Single-pass iterator over the lines of a text file.
///
/// A read or decode failure is yielded once as `Err`; the sequence ends after it.
pub struct TextLines {
    reader: Box<dyn BufRead>,
    path: PathBuf,
    errors: Utf8Errors,
    strip: bool,
    skip_empty: bool,
    buf: Vec<u8>,
    line_no: usize,
    progress: Option<Progress>,
    done: bool,
}

impl TextLines {
    pub(crate) fn open(path: impl AsRef<Path>, options: &TextOptions) -> Result<Self> {
        let (path, reader) = open_reader(path, &options.io)?;
        let progress = options
            .io
            .progress
            .then(|| Progress::new(path.display().to_string()));
        Ok(Self {
            reader,
            path,
            errors: options.io.errors,
            strip: options.strip,
            skip_empty: options.skip_empty,
            buf: Vec::new(),
            line_no: 0,
            progress,
            done: false,
        })
    }

    /// Resolved path of the file being read.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn fail(&mut self, err: anyhow::Error) -> Option<Result<String>> {
        self.done = true;
        Some(Err(err))
    }
}

impl Iterator for TextLines {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Result<String>> {
        loop {
            if self.done {
                return None;
            }

            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => {
                    self.done = true;
                    if let Some(progress) = self.progress.as_mut() {
                        progress.finish();
                    }
                    return None;
                }
                Ok(_) => {}
                Err(e) => {
                    let err = anyhow::Error::new(e).context(format!(
                        "read line {} in {}",
                        self.line_no + 1,
                        self.path.display()
                    ));
                    return self.fail(err);
                }
            }
            self.line_no += 1;
            if let Some(progress) = self.progress.as_mut() {
                progress.tick();
            }

            let mut bytes = self.buf.as_slice();
            if let Some(rest) = bytes.strip_suffix(b"\n") {
                bytes = rest.strip_suffix(b"\r").unwrap_or(rest);
            }
            let text = match self.errors.decode(bytes) {
                Ok(text) => text,
                Err(err) => {
                    let err = IoliteError::new(
                        err.kind,
                        format!("line {} in {}: {}", self.line_no, self.path.display(), err.message),
                    );
                    self.done = true;
                    return Some(Err(err.into()));
                }
            };

            let text = if self.strip { text.trim() } else { &*text };
            if self.skip_empty && text.is_empty() {
                continue;
            }
            return Some(Ok(text.to_string()));
        }
    }
}

/// Open `path` (which must exist) and iterate over its lines.
///
/// # Errors
/// `NotFound` / `WrongKind` if `path` is not an existing file, or the I/O
/// error from opening it. Errors while reading are yielded by the iterator.
pub fn read_text_lines(path: impl AsRef<Path>, options: &TextOptions) -> Result<TextLines> {
    TextLines::open(path, options)
}

/// Write `lines` to `path`, one per line.
///
/// # Returns
/// The number of lines written.
///
/// # Errors
/// Returns an error if the file cannot be created or written.
pub fn write_text_lines<I, S>(path: impl AsRef<Path>, lines: I, options: &TextOptions) -> Result<usize>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    write_lines_fallible(path, lines.into_iter().map(Ok), options)
}

/// Shared line writer; an `Err` item aborts the write and is returned.
pub(crate) fn write_lines_fallible<I, S>(
    path: impl AsRef<Path>,
    lines: I,
    options: &TextOptions,
) -> Result<usize>
where
    I: Iterator<Item = Result<S>>,
    S: AsRef<str>,
{
    let (path, mut w) = open_writer(path, &options.io)?;
    let newline = options.io.newline.as_str().as_bytes();
    let label = path.display().to_string();

    let mut written = 0usize;
    for line in ProgressIter::new(lines, options.io.progress, label) {
        let line = line?;
        let text = if options.strip {
            line.as_ref().trim()
        } else {
            line.as_ref()
        };
        if options.skip_empty && text.is_empty() {
            continue;
        }
        w.write_all(text.as_bytes())
            .and_then(|()| w.write_all(newline))
            .with_context(|| format!("write line {} to {}", written + 1, path.display()))?;
        written += 1;
    }
    w.finish()
        .with_context(|| format!("finish {}", path.display()))?;
    Ok(written)
}
