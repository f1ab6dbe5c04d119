//! Checksummed, LZ4-compressed value frames.
//!
//! Frame layout:
//! ```text
//! ┌────────────┬──────────────────────────────────────────┐
//! │ checksum   │ LZ4 block (size-prepended)               │
//! │ 4 bytes LE │ of the bincode-encoded value             │
//! └────────────┴──────────────────────────────────────────┘
//! ```
//!
//! The checksum is FNV-1a over the compressed block, so torn or bit-flipped
//! values are rejected before decompression.

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::StoreError;

const CHECKSUM_LEN: usize = 4;

/// FNV-1a, 32 bit.
pub fn checksum(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in bytes {
        hash ^= *byte as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// Encode a value into a frame.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    let raw = bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let compressed = lz4_flex::compress_prepend_size(&raw);

    let mut frame = Vec::with_capacity(CHECKSUM_LEN + compressed.len());
    frame.extend_from_slice(&checksum(&compressed).to_le_bytes());
    frame.extend_from_slice(&compressed);
    Ok(frame)
}

/// Verify and decode a frame.
pub fn decode<T: DeserializeOwned>(frame: &[u8]) -> Result<T, StoreError> {
    if frame.len() < CHECKSUM_LEN {
        return Err(StoreError::Deserialization(format!(
            "frame too short ({} bytes)",
            frame.len()
        )));
    }
    let (head, compressed) = frame.split_at(CHECKSUM_LEN);
    let mut buf = [0u8; CHECKSUM_LEN];
    buf.copy_from_slice(head);
    let stored = u32::from_le_bytes(buf);
    let computed = checksum(compressed);
    if stored != computed {
        return Err(StoreError::ChecksumMismatch { stored, computed });
    }

    let raw = lz4_flex::decompress_size_prepended(compressed)
        .map_err(|e| StoreError::Compression(e.to_string()))?;
    let (value, _) = bincode::serde::decode_from_slice(&raw, bincode::config::standard())
        .map_err(|e| StoreError::Deserialization(e.to_string()))?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{Operation, OperationPayload};
    use crate::ids::{AgentId, CommentId};

    fn sample_op() -> Operation {
        Operation::new(
            3,
            AgentId::new("reviewer"),
            OperationPayload::AddComment {
                comment_id: CommentId::new(),
                line_number: 6,
                text: "Should we also define what's out of scope?".into(),
            },
        )
    }

    #[test]
    fn test_frame_decodes_to_same_value() {
        let op = sample_op();
        let frame = encode(&op).unwrap();
        let decoded: Operation = decode(&frame).unwrap();
        assert_eq!(decoded, op);
    }

    #[test]
    fn test_corrupted_frame_rejected() {
        let mut frame = encode(&sample_op()).unwrap();
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        let result: Result<Operation, _> = decode(&frame);
        assert!(matches!(result, Err(StoreError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_short_frame_rejected() {
        let result: Result<Operation, _> = decode(&[1, 2]);
        assert!(matches!(result, Err(StoreError::Deserialization(_))));
    }

    #[test]
    fn test_repetitive_content_compresses() {
        let lines: Vec<String> = (0..500).map(|_| "TBD - needs to be defined".to_string()).collect();
        let raw = bincode::serde::encode_to_vec(&lines, bincode::config::standard()).unwrap();
        let frame = encode(&lines).unwrap();
        assert!(frame.len() * 4 < raw.len(), "frame {} vs raw {}", frame.len(), raw.len());
    }

    #[test]
    fn test_checksum_known_value() {
        // FNV-1a of the empty input is the offset basis
        assert_eq!(checksum(b""), 0x811c_9dc5);
        assert_ne!(checksum(b"a"), checksum(b"b"));
    }
}
