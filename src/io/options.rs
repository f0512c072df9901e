//! File-level options shared by every reader and writer, and the helpers that
//! open files according to them.

use crate::error::{ErrorKind, IoliteError};
use crate::io::compression::{auto_detect_reader, auto_detect_writer, FinishWrite, DEFAULT_BUFFER};
use crate::path::{file, PathOptions};
use anyhow::{Context, Result};
use encoding_rs::{Encoder, EncoderResult, Encoding, UTF_16BE, UTF_16LE, UTF_8};
use encoding_rs_io::DecodeReaderBytesBuilder;
use std::borrow::Cow;
use std::fs::{create_dir_all, File};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

/// How invalid UTF-8 in input text is handled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Utf8Errors {
    /// Invalid UTF-8 is a decode failure.
    #[default]
    Strict,
    /// Invalid sequences become U+FFFD.
    Replace,
}

/// Line terminator written after each line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Newline {
    #[default]
    Lf,
    CrLf,
}

impl Newline {
    pub fn as_str(self) -> &'static str {
        match self {
            Newline::Lf => "\n",
            Newline::CrLf => "\r\n",
        }
    }
}

/// Options common to all file reads and writes.
#[derive(Clone, Debug, Default)]
pub struct IoOptions {
    /// Substitute `$VAR` / `${VAR}` in the path.
    pub expandvars: bool,
    /// Reader/writer buffer capacity; `None` uses the default.
    pub buffering: Option<usize>,
    /// Character encoding of text files; `None` means UTF-8.
    ///
    /// Input in another encoding is transcoded to UTF-8 as it is read, with
    /// malformed sequences replaced by U+FFFD. On write, a character the
    /// encoding cannot represent fails the write.
    pub encoding: Option<&'static Encoding>,
    /// Handling of invalid UTF-8 on read.
    pub errors: Utf8Errors,
    /// Line terminator on write.
    pub newline: Newline,
    /// Report progress through `tracing`.
    pub progress: bool,
    /// Create missing parent directories before writing.
    pub create_parents: bool,
}

impl Utf8Errors {
    /// Decode `bytes` as UTF-8 according to the mode.
    ///
    /// # Errors
    /// `Decode` in strict mode when `bytes` is not valid UTF-8.
    pub fn decode<'a>(self, bytes: &'a [u8]) -> Result<Cow<'a, str>, IoliteError> {
        match self {
            Utf8Errors::Replace => Ok(String::from_utf8_lossy(bytes)),
            Utf8Errors::Strict => std::str::from_utf8(bytes).map(Cow::Borrowed).map_err(|e| {
                IoliteError::new(ErrorKind::Decode, "invalid UTF-8").with_source(e.to_string())
            }),
        }
    }
}

/// Look up an encoding by its WHATWG label, e.g. `"latin1"`, `"utf-16le"`,
/// `"shift_jis"`.
///
/// # Errors
/// `Configuration` for an unknown label.
pub fn encoding_for_label(label: &str) -> Result<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| {
        IoliteError::new(ErrorKind::Configuration, format!("unknown encoding {label:?}")).into()
    })
}

fn non_utf8(options: &IoOptions) -> Option<&'static Encoding> {
    options.encoding.filter(|enc| *enc != UTF_8)
}

enum Target {
    Legacy(Encoder),
    Utf16 { big_endian: bool },
}

/// Transcodes the UTF-8 written to it into another encoding.
struct EncodingWriter {
    inner: Box<dyn FinishWrite>,
    target: Target,
    /// Trailing bytes of an incomplete UTF-8 sequence.
    pending: Vec<u8>,
    out: Vec<u8>,
}

impl EncodingWriter {
    fn new(inner: Box<dyn FinishWrite>, encoding: &'static Encoding) -> Self {
        // encoding_rs only encodes UTF-16 as UTF-8.
        let target = if encoding == UTF_16LE {
            Target::Utf16 { big_endian: false }
        } else if encoding == UTF_16BE {
            Target::Utf16 { big_endian: true }
        } else {
            Target::Legacy(encoding.new_encoder())
        };
        Self {
            inner,
            target,
            pending: Vec::new(),
            out: Vec::new(),
        }
    }

    fn encode(&mut self, text: &str, last: bool) -> io::Result<()> {
        self.out.clear();
        match &mut self.target {
            Target::Utf16 { big_endian } => {
                for unit in text.encode_utf16() {
                    let bytes = if *big_endian {
                        unit.to_be_bytes()
                    } else {
                        unit.to_le_bytes()
                    };
                    self.out.extend_from_slice(&bytes);
                }
            }
            Target::Legacy(encoder) => {
                let mut src = text;
                loop {
                    let need = encoder
                        .max_buffer_length_from_utf8_without_replacement(src.len())
                        .unwrap_or(src.len() + 16);
                    self.out.reserve(need);
                    let (result, read) =
                        encoder.encode_from_utf8_to_vec_without_replacement(src, &mut self.out, last);
                    src = &src[read..];
                    match result {
                        EncoderResult::InputEmpty => break,
                        EncoderResult::OutputFull => {}
                        EncoderResult::Unmappable(ch) => {
                            return Err(io::Error::new(
                                io::ErrorKind::InvalidData,
                                format!("{ch:?} cannot be encoded as {}", encoder.encoding().name()),
                            ));
                        }
                    }
                }
            }
        }
        self.inner.write_all(&self.out)
    }
}

impl Write for EncodingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut pending = std::mem::take(&mut self.pending);
        pending.extend_from_slice(buf);
        let valid = match std::str::from_utf8(&pending) {
            Ok(text) => text.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e)),
        };
        let text = std::str::from_utf8(&pending[..valid])
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.encode(text, false)?;
        self.pending = pending[valid..].to_vec();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl FinishWrite for EncodingWriter {
    fn finish(self: Box<Self>) -> io::Result<()> {
        let mut this = *self;
        if !this.pending.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "incomplete UTF-8 sequence at end of output",
            ));
        }
        this.encode("", true)?;
        this.inner.finish()
    }
}

/// Resolve an existing file and open it for buffered, decompressing reads.
pub(crate) fn open_reader(
    raw: impl AsRef<Path>,
    options: &IoOptions,
) -> Result<(PathBuf, Box<dyn BufRead>)> {
    let path = file(
        raw,
        &PathOptions {
            expandvars: options.expandvars,
            exists: true,
        },
    )?;
    let f = File::open(&path).with_context(|| format!("open {}", path.display()))?;
    let mut rdr = auto_detect_reader(f, &path, options.buffering)
        .with_context(|| format!("setup decompression for {}", path.display()))?;
    if let Some(encoding) = non_utf8(options) {
        let decoded = DecodeReaderBytesBuilder::new()
            .encoding(Some(encoding))
            .build(rdr);
        let capacity = options.buffering.unwrap_or(DEFAULT_BUFFER).max(1);
        rdr = Box::new(BufReader::with_capacity(capacity, decoded));
    }
    tracing::debug!(path = %path.display(), "opened for reading");
    Ok((path, rdr))
}

/// Resolve a file path and create (truncate) the file.
pub(crate) fn create_file(raw: impl AsRef<Path>, options: &IoOptions) -> Result<(PathBuf, File)> {
    let path = file(
        raw,
        &PathOptions {
            expandvars: options.expandvars,
            exists: false,
        },
    )?;
    if options.create_parents
        && let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
    }
    let f = File::create(&path).with_context(|| format!("create {}", path.display()))?;
    tracing::debug!(path = %path.display(), "opened for writing");
    Ok((path, f))
}

/// Resolve a file path and create (truncate) it for buffered, compressing,
/// transcoding writes. The writer must be finished to complete the file.
pub(crate) fn open_writer(
    raw: impl AsRef<Path>,
    options: &IoOptions,
) -> Result<(PathBuf, Box<dyn FinishWrite>)> {
    let (path, f) = create_file(raw, options)?;
    let mut w = auto_detect_writer(f, &path, options.buffering)
        .with_context(|| format!("setup compression for {}", path.display()))?;
    if let Some(encoding) = non_utf8(options) {
        w = Box::new(EncodingWriter::new(w, encoding));
    }
    Ok((path, w))
}

/// Read a whole file into memory, decompressing if needed.
pub(crate) fn read_all(raw: impl AsRef<Path>, options: &IoOptions) -> Result<(PathBuf, Vec<u8>)> {
    let (path, mut rdr) = open_reader(raw, options)?;
    let mut bytes = Vec::new();
    rdr.read_to_end(&mut bytes)
        .with_context(|| format!("read {}", path.display()))?;
    Ok((path, bytes))
}

/// Write a text document, translating `\n` to the configured newline.
pub(crate) fn write_document(raw: impl AsRef<Path>, text: &str, options: &IoOptions) -> Result<()> {
    let (path, mut w) = open_writer(raw, options)?;
    let text = match options.newline {
        Newline::Lf => Cow::Borrowed(text),
        Newline::CrLf => Cow::Owned(text.replace('\n', "\r\n")),
    };
    w.write_all(text.as_bytes())
        .with_context(|| format!("write {}", path.display()))?;
    w.finish()
        .with_context(|| format!("finish {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_rejects_and_replace_repairs() {
        let bytes = b"ok \xff end";
        let err = Utf8Errors::Strict.decode(bytes).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Decode);
        assert_eq!(Utf8Errors::Replace.decode(bytes).unwrap(), "ok \u{fffd} end");
        assert_eq!(Utf8Errors::Strict.decode(b"plain").unwrap(), "plain");
    }

    fn encode_all(encoding: &'static Encoding, chunks: &[&[u8]]) -> io::Result<Vec<u8>> {
        let sink = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        struct Shared(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);
        impl Write for Shared {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        let inner: Box<dyn FinishWrite> = Box::new(io::BufWriter::new(Shared(sink.clone())));
        let mut w = Box::new(EncodingWriter::new(inner, encoding));
        for chunk in chunks {
            w.write_all(chunk)?;
        }
        w.finish()?;
        let out = sink.lock().unwrap().clone();
        Ok(out)
    }

    #[test]
    fn encoder_joins_split_characters() {
        // "é" split across two writes.
        let out = encode_all(encoding_rs::WINDOWS_1252, &[&b"caf\xc3"[..], &b"\xa9!"[..]]).unwrap();
        assert_eq!(out, b"caf\xe9!");
        let out = encode_all(UTF_16BE, &[&b"h\xc3"[..], &b"\xa9"[..]]).unwrap();
        assert_eq!(out, vec![0x00, b'h', 0x00, 0xe9]);
    }

    #[test]
    fn encoder_rejects_unmappable_and_truncated_input() {
        let err = encode_all(encoding_rs::WINDOWS_1252, &["snow \u{2603}".as_bytes()]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        let err = encode_all(encoding_rs::WINDOWS_1252, &[&b"a\xc3"[..]]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn labels_resolve() {
        assert_eq!(encoding_for_label("latin1").unwrap(), encoding_rs::WINDOWS_1252);
        assert_eq!(encoding_for_label(" UTF-16LE ").unwrap(), UTF_16LE);
        let err = encoding_for_label("klingon").unwrap_err();
        assert_eq!(IoliteError::kind_of(&err), Some(ErrorKind::Configuration));
    }
}
