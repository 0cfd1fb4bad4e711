//! Versioned save-state container.
//!
//! # Binary Format
//!
//! ```text
//! 0x00  8 bytes  version tag (ASCII)
//! 0x08  u32 LE   total file size, header included
//! 0x0C  u32 LE   CRC32 over everything from 0x10 to the end
//! 0x10  16 bytes machine id (ASCII, truncated or NUL padded)
//! 0x20  ...      payload: JSON object of the flattened state map
//! ```
//!
//! The size and checksum fields are written as placeholders and patched once
//! the payload length is known.

use std::io::{Read, Write};

use thiserror::Error;

use crate::state::StateMap;

/// Version tag written at the start of every blob.
pub const SAVE_STATE_VERSION: [u8; 8] = *b"EMUSS001";

/// Machine identifiers occupy a fixed 16-byte field.
pub const MACHINE_ID_LEN: usize = 16;

const SIZE_OFFSET: usize = 8;
const CRC_OFFSET: usize = 12;
const MACHINE_OFFSET: usize = 16;
const HEADER_LEN: usize = MACHINE_OFFSET + MACHINE_ID_LEN;

#[derive(Debug, Error)]
pub enum SaveStateError {
    #[error("save state version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: String, found: String },

    #[error("save state size mismatch: header says {header} bytes, blob has {actual}")]
    FileSizeMismatch { header: u32, actual: usize },

    #[error("save state belongs to machine `{found}`, expected `{expected}`")]
    MachineMismatch { expected: String, found: String },

    #[error("save state checksum mismatch: stored {stored:#010X}, computed {computed:#010X}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error("save state truncated ({len} bytes)")]
    Truncated { len: usize },

    #[error("save state payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("save state I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Pad or truncate a machine identifier to the fixed field width.
pub fn machine_id_bytes(id: &str) -> [u8; MACHINE_ID_LEN] {
    let mut field = [0u8; MACHINE_ID_LEN];
    let bytes = id.as_bytes();
    let len = bytes.len().min(MACHINE_ID_LEN);
    field[..len].copy_from_slice(&bytes[..len]);
    field
}

fn printable(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Build a complete blob in memory.
pub fn encode(machine_id: &str, state: &StateMap) -> Result<Vec<u8>, SaveStateError> {
    let mut blob = Vec::with_capacity(HEADER_LEN + 4096);
    blob.extend_from_slice(&SAVE_STATE_VERSION);
    blob.extend_from_slice(&[0u8; 4]);
    blob.extend_from_slice(&[0u8; 4]);
    blob.extend_from_slice(&machine_id_bytes(machine_id));
    serde_json::to_writer(&mut blob, state)?;

    let size = u32::try_from(blob.len()).map_err(|_| SaveStateError::FileSizeMismatch {
        header: u32::MAX,
        actual: blob.len(),
    })?;
    let crc = crc32fast::hash(&blob[MACHINE_OFFSET..]);
    blob[SIZE_OFFSET..SIZE_OFFSET + 4].copy_from_slice(&size.to_le_bytes());
    blob[CRC_OFFSET..CRC_OFFSET + 4].copy_from_slice(&crc.to_le_bytes());
    Ok(blob)
}

/// Validate a blob and return its state map.
///
/// Checks run in header order: version, size, machine, checksum. Each
/// failure is reported with its own variant.
pub fn decode(blob: &[u8], machine_id: &str) -> Result<StateMap, SaveStateError> {
    if blob.len() < HEADER_LEN {
        return Err(SaveStateError::Truncated { len: blob.len() });
    }

    let version = &blob[..SIZE_OFFSET];
    if version != SAVE_STATE_VERSION {
        return Err(SaveStateError::VersionMismatch {
            expected: printable(&SAVE_STATE_VERSION),
            found: printable(version),
        });
    }

    let header_size = read_u32(blob, SIZE_OFFSET);
    if header_size as usize != blob.len() {
        return Err(SaveStateError::FileSizeMismatch {
            header: header_size,
            actual: blob.len(),
        });
    }

    let expected = machine_id_bytes(machine_id);
    let found = &blob[MACHINE_OFFSET..HEADER_LEN];
    if found != expected {
        return Err(SaveStateError::MachineMismatch {
            expected: printable(&expected),
            found: printable(found),
        });
    }

    let stored = read_u32(blob, CRC_OFFSET);
    let computed = crc32fast::hash(&blob[MACHINE_OFFSET..]);
    if stored != computed {
        return Err(SaveStateError::ChecksumMismatch { stored, computed });
    }

    Ok(serde_json::from_slice(&blob[HEADER_LEN..])?)
}

fn read_u32(blob: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        blob[offset],
        blob[offset + 1],
        blob[offset + 2],
        blob[offset + 3],
    ])
}

/// Serialize `state` to a stream.
pub fn save<W: Write>(
    writer: &mut W,
    machine_id: &str,
    state: &StateMap,
) -> Result<(), SaveStateError> {
    let blob = encode(machine_id, state)?;
    writer.write_all(&blob)?;
    writer.flush()?;
    Ok(())
}

/// Read a whole stream and validate it.
pub fn load<R: Read>(reader: &mut R, machine_id: &str) -> Result<StateMap, SaveStateError> {
    let mut blob = Vec::new();
    reader.read_to_end(&mut blob)?;
    decode(&blob, machine_id)
}
