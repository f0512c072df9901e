//! Transparent compression for every file iolite opens.
//!
//! Readers and writers pass their file handle through [`auto_detect_reader`]
//! / [`auto_detect_writer`]. A codec is picked from the file extension
//! (`data.jsonl.gz`, `rows.csv.zst`); on read, the first bytes are checked
//! against codec magic numbers when the extension says nothing. Files that
//! match no codec are read and written as-is.
//!
//! ## Built-in Codecs
//!
//! - **Gzip** (`.gz`) via `flate2` (feature: `compression-gzip`)
//! - **Zstd** (`.zst`) via `zstd` (feature: `compression-zstd`)
//! - **Bzip2** (`.bz2`) via `bzip2` (feature: `compression-bzip2`)
//! - **Xz** (`.xz`) via `xz2` (feature: `compression-xz`)
//!
//! Additional codecs can be added at runtime with [`register_codec`]:
//!
//! ```
//! use iolite::io::compression::{register_codec, CompressionCodec, FinishWrite};
//! use std::io::{BufWriter, Read, Write};
//! use std::sync::Arc;
//!
//! struct Identity;
//!
//! impl CompressionCodec for Identity {
//!     fn name(&self) -> &str { "identity" }
//!     fn extensions(&self) -> &[&str] { &[".ident"] }
//!     fn magic_bytes(&self) -> Option<&[u8]> { None }
//!     fn wrap_reader_dyn(&self, r: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
//!         Ok(r)
//!     }
//!     fn wrap_writer_dyn(
//!         &self,
//!         w: Box<dyn Write>,
//!         _level: Option<u32>,
//!     ) -> std::io::Result<Box<dyn FinishWrite>> {
//!         Ok(Box::new(BufWriter::new(w)))
//!     }
//! }
//!
//! register_codec(Arc::new(Identity));
//! ```

use anyhow::{Context, Result};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

/// Capacity used when the caller does not choose a buffer size.
pub const DEFAULT_BUFFER: usize = 8 * 1024;

static CODEC_REGISTRY: RwLock<Option<Vec<Arc<dyn CompressionCodec>>>> = RwLock::new(None);

fn init_registry() -> Vec<Arc<dyn CompressionCodec>> {
    vec![
        #[cfg(feature = "compression-gzip")]
        Arc::new(GzipCodec),
        #[cfg(feature = "compression-zstd")]
        Arc::new(ZstdCodec),
        #[cfg(feature = "compression-bzip2")]
        Arc::new(Bzip2Codec),
        #[cfg(feature = "compression-xz")]
        Arc::new(XzCodec),
    ]
}

fn get_registry() -> Vec<Arc<dyn CompressionCodec>> {
    let mut lock = CODEC_REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    lock.get_or_insert_with(init_registry).clone()
}

/// Register a custom codec. It is consulted after the ones registered before it.
pub fn register_codec(codec: Arc<dyn CompressionCodec>) {
    let mut lock = CODEC_REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    lock.get_or_insert_with(init_registry).push(codec);
}

/// Look up a registered codec by name (case-insensitive).
pub fn codec_by_name(name: &str) -> Option<Arc<dyn CompressionCodec>> {
    get_registry()
        .into_iter()
        .find(|codec| codec.name().eq_ignore_ascii_case(name))
}

/// A compression algorithm that can wrap readers and writers.
///
/// Implementations live in a process-wide registry and must be `Send + Sync`.
pub trait CompressionCodec: Send + Sync {
    /// Codec name, e.g. `"gzip"`.
    fn name(&self) -> &str;

    /// Lowercase extensions with the leading dot, e.g. `&[".gz", ".gzip"]`.
    fn extensions(&self) -> &[&str];

    /// Signature at the start of a compressed stream, if the format has one.
    fn magic_bytes(&self) -> Option<&[u8]>;

    /// Whether `head`, the first buffered bytes of a stream, starts a stream
    /// of this codec. Defaults to a prefix match on [`magic_bytes`](Self::magic_bytes).
    fn matches_magic(&self, head: &[u8]) -> bool {
        self.magic_bytes().is_some_and(|magic| head.starts_with(magic))
    }

    /// Wrap a reader with decompression.
    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>>;

    /// Wrap a writer with compression. `level` is codec-specific; `None`
    /// selects the codec default.
    fn wrap_writer_dyn(
        &self,
        writer: Box<dyn Write>,
        level: Option<u32>,
    ) -> std::io::Result<Box<dyn FinishWrite>>;
}

/// A writer whose stream must be completed explicitly.
///
/// `finish` writes any trailer (compression footers, pending encoder state)
/// and flushes everything below, so failures surface as errors instead of
/// being lost in `Drop`.
pub trait FinishWrite: Write {
    fn finish(self: Box<Self>) -> std::io::Result<()>;
}

impl<W: Write> FinishWrite for BufWriter<W> {
    fn finish(mut self: Box<Self>) -> std::io::Result<()> {
        self.flush()
    }
}

fn detect_from_extension(path: &Path) -> Option<Arc<dyn CompressionCodec>> {
    let path_str = path.to_string_lossy().to_lowercase();
    get_registry().into_iter().find(|codec| {
        codec
            .extensions()
            .iter()
            .any(|ext| path_str.ends_with(ext))
    })
}

fn detect_from_magic<R: BufRead>(reader: &mut R) -> Option<Arc<dyn CompressionCodec>> {
    let buf = reader.fill_buf().ok()?;
    if buf.is_empty() {
        return None;
    }
    get_registry()
        .into_iter()
        .find(|codec| codec.matches_magic(buf))
}

/// Wrap `reader` with decompression if `path_hint` or the stream's leading
/// bytes name a codec, and buffer the result.
///
/// # Errors
/// Returns an error if the codec fails to initialise.
pub fn auto_detect_reader<R: Read + 'static>(
    reader: R,
    path_hint: impl AsRef<Path>,
    capacity: Option<usize>,
) -> Result<Box<dyn BufRead>> {
    let capacity = capacity.unwrap_or(DEFAULT_BUFFER).max(1);

    if let Some(codec) = detect_from_extension(path_hint.as_ref()) {
        let inner = codec
            .wrap_reader_dyn(Box::new(reader))
            .with_context(|| format!("wrap reader with {} codec", codec.name()))?;
        return Ok(Box::new(BufReader::with_capacity(capacity, inner)));
    }

    let mut buf_reader = BufReader::with_capacity(capacity, reader);
    if let Some(codec) = detect_from_magic(&mut buf_reader) {
        let inner = codec
            .wrap_reader_dyn(Box::new(buf_reader))
            .with_context(|| format!("wrap reader with {} codec", codec.name()))?;
        return Ok(Box::new(BufReader::with_capacity(capacity, inner)));
    }

    Ok(Box::new(buf_reader))
}

/// Wrap `writer` with compression if `path_hint` has a codec extension, and
/// buffer the result. Call [`FinishWrite::finish`] once everything is written.
///
/// # Errors
/// Returns an error if the codec fails to initialise.
pub fn auto_detect_writer<W: Write + 'static>(
    writer: W,
    path_hint: impl AsRef<Path>,
    capacity: Option<usize>,
) -> Result<Box<dyn FinishWrite>> {
    match detect_from_extension(path_hint.as_ref()) {
        Some(codec) => wrap_writer(writer, codec.as_ref(), None, capacity),
        None => Ok(Box::new(BufWriter::with_capacity(
            capacity.unwrap_or(DEFAULT_BUFFER).max(1),
            writer,
        ))),
    }
}

/// Wrap `writer` with an explicitly chosen codec.
///
/// # Errors
/// Returns an error if the codec fails to initialise.
pub fn wrap_writer<W: Write + 'static>(
    writer: W,
    codec: &dyn CompressionCodec,
    level: Option<u32>,
    capacity: Option<usize>,
) -> Result<Box<dyn FinishWrite>> {
    let buffered = BufWriter::with_capacity(capacity.unwrap_or(DEFAULT_BUFFER).max(1), writer);
    codec
        .wrap_writer_dyn(Box::new(buffered), level)
        .with_context(|| format!("wrap writer with {} codec", codec.name()))
}

// ============================================================================
// Built-in Codec Implementations
// ============================================================================

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &str {
        "gzip"
    }

    fn extensions(&self) -> &[&str] {
        &[".gz", ".gzip"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x1f, 0x8b])
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        use flate2::read::MultiGzDecoder;
        Ok(Box::new(MultiGzDecoder::new(reader)))
    }

    fn wrap_writer_dyn(
        &self,
        writer: Box<dyn Write>,
        level: Option<u32>,
    ) -> std::io::Result<Box<dyn FinishWrite>> {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        let level = level.map_or_else(Compression::default, |l| Compression::new(l.min(9)));
        Ok(Box::new(GzEncoder::new(writer, level)))
    }
}

#[cfg(feature = "compression-gzip")]
impl FinishWrite for flate2::write::GzEncoder<Box<dyn Write>> {
    fn finish(self: Box<Self>) -> std::io::Result<()> {
        (*self).finish()?.flush()
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &str {
        "zstd"
    }

    fn extensions(&self) -> &[&str] {
        &[".zst", ".zstd"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x28, 0xb5, 0x2f, 0xfd])
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        zstd::stream::read::Decoder::new(reader).map(|d| Box::new(d) as Box<dyn Read>)
    }

    fn wrap_writer_dyn(
        &self,
        writer: Box<dyn Write>,
        level: Option<u32>,
    ) -> std::io::Result<Box<dyn FinishWrite>> {
        let level = level.map_or(3, |l| l.min(22) as i32);
        zstd::stream::write::Encoder::new(writer, level)
            .map(|e| Box::new(e) as Box<dyn FinishWrite>)
    }
}

#[cfg(feature = "compression-zstd")]
impl FinishWrite for zstd::stream::write::Encoder<'static, Box<dyn Write>> {
    fn finish(self: Box<Self>) -> std::io::Result<()> {
        (*self).finish()?.flush()
    }
}

#[cfg(feature = "compression-bzip2")]
struct Bzip2Codec;

#[cfg(feature = "compression-bzip2")]
impl CompressionCodec for Bzip2Codec {
    fn name(&self) -> &str {
        "bzip2"
    }

    fn extensions(&self) -> &[&str] {
        &[".bz2", ".bzip2"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(b"BZh")
    }

    fn matches_magic(&self, head: &[u8]) -> bool {
        // "BZh" is plain ASCII, so also require the block size digit and a
        // block or end-of-stream marker.
        const BLOCK: &[u8] = &[0x31, 0x41, 0x59, 0x26, 0x53, 0x59];
        const END: &[u8] = &[0x17, 0x72, 0x45, 0x38, 0x50, 0x90];
        head.len() >= 10
            && head.starts_with(b"BZh")
            && (b'1'..=b'9').contains(&head[3])
            && (&head[4..10] == BLOCK || &head[4..10] == END)
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        use bzip2::read::MultiBzDecoder;
        Ok(Box::new(MultiBzDecoder::new(reader)))
    }

    fn wrap_writer_dyn(
        &self,
        writer: Box<dyn Write>,
        level: Option<u32>,
    ) -> std::io::Result<Box<dyn FinishWrite>> {
        use bzip2::Compression;
        use bzip2::write::BzEncoder;
        let level = level.map_or_else(Compression::default, |l| Compression::new(l.clamp(1, 9)));
        Ok(Box::new(BzEncoder::new(writer, level)))
    }
}

#[cfg(feature = "compression-bzip2")]
impl FinishWrite for bzip2::write::BzEncoder<Box<dyn Write>> {
    fn finish(self: Box<Self>) -> std::io::Result<()> {
        (*self).finish()?.flush()
    }
}

#[cfg(feature = "compression-xz")]
struct XzCodec;

#[cfg(feature = "compression-xz")]
impl CompressionCodec for XzCodec {
    fn name(&self) -> &str {
        "xz"
    }

    fn extensions(&self) -> &[&str] {
        &[".xz"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00])
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        use xz2::read::XzDecoder;
        Ok(Box::new(XzDecoder::new(reader)))
    }

    fn wrap_writer_dyn(
        &self,
        writer: Box<dyn Write>,
        level: Option<u32>,
    ) -> std::io::Result<Box<dyn FinishWrite>> {
        use xz2::write::XzEncoder;
        Ok(Box::new(XzEncoder::new(writer, level.map_or(6, |l| l.min(9)))))
    }
}

#[cfg(feature = "compression-xz")]
impl FinishWrite for xz2::write::XzEncoder<Box<dyn Write>> {
    fn finish(self: Box<Self>) -> std::io::Result<()> {
        (*self).finish()?.flush()
    }
}
