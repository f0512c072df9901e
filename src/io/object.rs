//! Binary persistence of arbitrary `serde` value graphs.
//!
//! An object file is a small versioned container:
//!
//! | bytes | content                               |
//! |-------|---------------------------------------|
//! | 4     | magic `IOLO`                          |
//! | 2     | protocol version, little-endian `u16` |
//! | rest  | `postcard` payload                    |
//!
//! The whole container may be compressed, either by naming a codec in
//! [`ObjectWriteOptions::compress`] or by giving the file a codec extension.
//! Reading detects compression from the extension or the leading bytes.
//! An uncompressed file can also be memory-mapped instead of read
//! ([`ObjectReadOptions::mmap`]).
//!
//! `postcard` is not self-describing, so the type read must match the type
//! written; `serde_json::Value` and other `deserialize_any` types are not
//! supported.

use crate::error::{ErrorKind, IoliteError};
use crate::io::compression::{auto_detect_writer, codec_by_name, wrap_writer};
use crate::io::options::{create_file, read_all, IoOptions};
use crate::path::{file, PathOptions};
use anyhow::{Context, Result};
use memmap2::Mmap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Container signature.
pub const OBJECT_MAGIC: [u8; 4] = *b"IOLO";

/// Newest container protocol this build reads and writes.
pub const OBJECT_PROTOCOL: u16 = 1;

const HEADER_LEN: usize = OBJECT_MAGIC.len() + 2;

/// Explicit compression for [`write_object`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Compress {
    /// Registered codec name, e.g. `"gzip"` or `"zstd"`.
    pub codec: String,
    /// Codec-specific level; `None` selects the codec default.
    pub level: Option<u32>,
}

/// Options for [`write_object`].
#[derive(Clone, Debug, Default)]
pub struct ObjectWriteOptions {
    pub io: IoOptions,
    /// Compress with this codec regardless of the file extension.
    pub compress: Option<Compress>,
    /// Container protocol to write; `None` writes [`OBJECT_PROTOCOL`].
    pub protocol: Option<u16>,
}

/// Options for [`read_object`].
#[derive(Clone, Debug, Default)]
pub struct ObjectReadOptions {
    /// Path and buffering options. `encoding` does not apply to objects.
    pub io: IoOptions,
    /// Memory-map the file and decode straight from the mapping.
    ///
    /// Only uncompressed containers can be mapped; compressed files fall
    /// back to a buffered, decompressing read.
    pub mmap: bool,
}

/// Persist `value` to `path`.
///
/// # Errors
/// `Configuration` for an unsupported protocol or unknown codec, `Encode` if
/// `value` cannot be serialized, and I/O errors.
pub fn write_object<T>(path: impl AsRef<Path>, value: &T, options: &ObjectWriteOptions) -> Result<()>
where
    T: Serialize + ?Sized,
{
    let protocol = options.protocol.unwrap_or(OBJECT_PROTOCOL);
    if protocol == 0 || protocol > OBJECT_PROTOCOL {
        return Err(IoliteError::new(
            ErrorKind::Configuration,
            format!("unsupported object protocol {protocol} (supported: 1..={OBJECT_PROTOCOL})"),
        )
        .into());
    }

    let codec = match &options.compress {
        Some(compress) => Some(codec_by_name(&compress.codec).ok_or_else(|| {
            IoliteError::new(
                ErrorKind::Configuration,
                format!("unknown compression codec {:?}", compress.codec),
            )
        })?),
        None => None,
    };

    let payload = postcard::to_allocvec(value).map_err(|e| {
        IoliteError::new(ErrorKind::Encode, "Cannot encode object").with_source(e.to_string())
    })?;

    let (path, f) = create_file(path, &options.io)?;
    let mut w = match &codec {
        Some(codec) => {
            let level = options.compress.as_ref().and_then(|c| c.level);
            wrap_writer(f, codec.as_ref(), level, options.io.buffering)?
        }
        None => auto_detect_writer(f, &path, options.io.buffering)?,
    };

    w.write_all(&OBJECT_MAGIC)
        .and_then(|()| w.write_all(&protocol.to_le_bytes()))
        .and_then(|()| w.write_all(&payload))
        .with_context(|| format!("write object {}", path.display()))?;
    w.finish()
        .with_context(|| format!("finish object {}", path.display()))?;
    tracing::debug!(path = %path.display(), protocol, bytes = payload.len(), "wrote object");
    Ok(())
}

/// Load a value written by [`write_object`].
///
/// # Errors
/// `NotFound` / `WrongKind` for a bad path, I/O errors, and `Decode` for a
/// file that is not an object container, uses a newer protocol, or does not
/// hold a `T`.
pub fn read_object<T: DeserializeOwned>(
    path: impl AsRef<Path>,
    options: &ObjectReadOptions,
) -> Result<T> {
    let io = IoOptions {
        encoding: None,
        ..options.io.clone()
    };

    if options.mmap {
        let path = file(
            path.as_ref(),
            &PathOptions {
                expandvars: io.expandvars,
                exists: true,
            },
        )?;
        let f = File::open(&path).with_context(|| format!("open {}", path.display()))?;
        // SAFETY: read-only mapping, dropped before returning. The file must
        // not be truncated while it is mapped.
        let map = unsafe { Mmap::map(&f) }.with_context(|| format!("mmap {}", path.display()))?;
        if map.starts_with(&OBJECT_MAGIC) {
            tracing::debug!(path = %path.display(), bytes = map.len(), "mapped object");
            return decode_container(&path, &map);
        }
        tracing::debug!(path = %path.display(), "object is not a plain container, reading instead");
    }

    let (path, bytes) = read_all(path, &io)?;
    decode_container(&path, &bytes)
}

fn decode_container<T: DeserializeOwned>(path: &Path, bytes: &[u8]) -> Result<T> {
    if bytes.len() < HEADER_LEN || bytes[..OBJECT_MAGIC.len()] != OBJECT_MAGIC {
        return Err(IoliteError::new(
            ErrorKind::Decode,
            format!("{} is not an object file", path.display()),
        )
        .into());
    }
    let protocol = u16::from_le_bytes([bytes[4], bytes[5]]);
    if protocol == 0 || protocol > OBJECT_PROTOCOL {
        return Err(IoliteError::new(
            ErrorKind::Decode,
            format!("{} uses unsupported protocol {protocol}", path.display()),
        )
        .into());
    }

    let value = postcard::from_bytes(&bytes[HEADER_LEN..]).map_err(|e| {
        IoliteError::new(ErrorKind::Decode, format!("Cannot load {}", path.display()))
            .with_source(e.to_string())
    })?;
    Ok(value)
}
