//! On-disk snapshot framing.
//!
//! Layout: magic (4) | version (1) | payload length (u64 LE) |
//! CRC32 of payload (u32 LE) | MessagePack payload.

use crate::error::{EngineError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;

/// Current snapshot format version.
pub(crate) const SNAPSHOT_VERSION: u8 = 1;

const HEADER_SIZE: usize = 4 + 1 + 8 + 4;

/// Serialize `value` and atomically replace the file at `path`.
pub(crate) fn write_snapshot<T: Serialize + ?Sized>(
    path: &Path,
    magic: &[u8; 4],
    value: &T,
) -> Result<()> {
    let encoded = rmp_serde::to_vec_named(value)?;
    let checksum = crc32fast::hash(&encoded);

    let mut buf = Vec::with_capacity(HEADER_SIZE + encoded.len());
    buf.extend_from_slice(magic);
    buf.push(SNAPSHOT_VERSION);
    buf.extend_from_slice(&(encoded.len() as u64).to_le_bytes());
    buf.extend_from_slice(&checksum.to_le_bytes());
    buf.extend_from_slice(&encoded);

    let tmp_path = path.with_extension("tmp");
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(&buf)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;

    Ok(())
}

/// Read and decode the file at `path`. Returns `None` if it does not exist.
pub(crate) fn read_snapshot<T: DeserializeOwned>(path: &Path, magic: &[u8; 4]) -> Result<Option<T>> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    if bytes.is_empty() {
        return Ok(None);
    }
    if bytes.len() < HEADER_SIZE {
        return Err(EngineError::InvalidFormat(format!(
            "Truncated snapshot header in {}",
            path.display()
        )));
    }

    if &bytes[0..4] != magic {
        return Err(EngineError::InvalidFormat("Invalid snapshot magic".into()));
    }
    if bytes[4] != SNAPSHOT_VERSION {
        return Err(EngineError::InvalidFormat(format!(
            "Unsupported snapshot version: {}",
            bytes[4]
        )));
    }

    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&bytes[5..13]);
    let len = u64::from_le_bytes(len_bytes) as usize;

    let mut crc_bytes = [0u8; 4];
    crc_bytes.copy_from_slice(&bytes[13..17]);
    let expected = u32::from_le_bytes(crc_bytes);

    let payload = &bytes[HEADER_SIZE..];
    if payload.len() != len {
        return Err(EngineError::InvalidFormat(format!(
            "Snapshot payload length {} does not match header {}",
            payload.len(),
            len
        )));
    }

    let got = crc32fast::hash(payload);
    if got != expected {
        return Err(EngineError::ChecksumMismatch { expected, got });
    }

    Ok(Some(rmp_serde::from_slice(payload)?))
}
