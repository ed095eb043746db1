//! # Snapshot Persistence
//!
//! Layout:
//!
//! ```text
//! +--------+-----------+------------------------+
//! | SERRA\0| u16 LE ver| postcard(HomeState)    |
//! +--------+-----------+------------------------+
//! ```

use crate::home::HomeState;
use crate::{Result, SerraError};

/// Leading bytes of every snapshot.
pub const SNAPSHOT_MAGIC: &[u8; 6] = b"SERRA\0";

/// Current snapshot version.
pub const SNAPSHOT_VERSION: u16 = 1;

const HEADER_LEN: usize = SNAPSHOT_MAGIC.len() + 2;

/// Encode a state as a versioned snapshot.
pub fn encode_snapshot(state: &HomeState) -> Result<Vec<u8>> {
    let body = postcard::to_allocvec(state)
        .map_err(|e| SerraError::Format(format!("encode failed: {e}")))?;
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(SNAPSHOT_MAGIC);
    out.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decode a snapshot produced by [`encode_snapshot`].
pub fn decode_snapshot(bytes: &[u8]) -> Result<HomeState> {
    let (version, body) = split_header(bytes)?;
    if version != SNAPSHOT_VERSION {
        return Err(SerraError::Format(format!(
            "unsupported snapshot version {version}"
        )));
    }
    postcard::from_bytes(body).map_err(|e| SerraError::Format(format!("decode failed: {e}")))
}

/// Whether `bytes` start with the snapshot magic.
#[must_use]
pub fn is_snapshot(bytes: &[u8]) -> bool {
    bytes.starts_with(SNAPSHOT_MAGIC)
}

fn split_header(bytes: &[u8]) -> Result<(u16, &[u8])> {
    if bytes.len() < HEADER_LEN {
        return Err(SerraError::Format("truncated snapshot header".into()));
    }
    let (header, body) = bytes.split_at(HEADER_LEN);
    let (magic, version) = header.split_at(SNAPSHOT_MAGIC.len());
    if magic != SNAPSHOT_MAGIC {
        return Err(SerraError::Format("invalid snapshot header".into()));
    }
    let version = u16::from_le_bytes([version[0], version[1]]);
    Ok((version, body))
}
