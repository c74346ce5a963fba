//! Binary framing for chunked-transfer blocks: bincode envelope, one block
//! per transport message.

use crate::protocol::DataBlock;

/// Fixed bincode overhead of a `DataBlock` envelope: three u32 fields plus
/// the u64 payload length prefix.
pub const ENVELOPE_OVERHEAD: usize = 20;

/// Encode a block into one transport message. `max_message_size` is the
/// transport's hard per-message limit; the whole envelope must fit it.
pub fn encode_block(block: &DataBlock, max_message_size: usize) -> Result<Vec<u8>, FrameError> {
    let bytes = bincode::serialize(block)?;
    if bytes.len() > max_message_size {
        return Err(FrameError::TooLarge {
            len: bytes.len(),
            max: max_message_size,
        });
    }
    Ok(bytes)
}

/// Decode one transport message back into a block.
pub fn decode_block(bytes: &[u8]) -> Result<DataBlock, FrameError> {
    Ok(bincode::deserialize(bytes)?)
}

/// Largest block payload that still fits a transport message after envelope
/// overhead.
pub fn max_payload_for(max_message_size: usize) -> usize {
    max_message_size.saturating_sub(ENVELOPE_OVERHEAD)
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("envelope of {len} bytes exceeds transport limit of {max}")]
    TooLarge { len: usize, max: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_block(payload_len: usize) -> DataBlock {
        DataBlock {
            transfer_id: 7,
            block_index: 2,
            total_blocks: 5,
            payload: (0..payload_len).map(|i| i as u8).collect(),
        }
    }

    #[test]
    fn roundtrip() {
        let block = sample_block(100);
        let bytes = encode_block(&block, 1024).unwrap();
        let back = decode_block(&bytes).unwrap();
        assert_eq!(back, block);
    }

    #[test]
    fn envelope_overhead_is_exact() {
        let block = sample_block(100);
        let bytes = encode_block(&block, 1024).unwrap();
        assert_eq!(bytes.len(), 100 + ENVELOPE_OVERHEAD);
    }

    #[test]
    fn oversized_envelope_rejected() {
        let block = sample_block(100);
        let err = encode_block(&block, 64).unwrap_err();
        assert!(matches!(err, FrameError::TooLarge { .. }));
    }

    #[test]
    fn max_payload_fits_exactly() {
        let max_msg = 256;
        let block = sample_block(max_payload_for(max_msg));
        let bytes = encode_block(&block, max_msg).unwrap();
        assert_eq!(bytes.len(), max_msg);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(decode_block(&[0xff; 3]).is_err());
    }
}
