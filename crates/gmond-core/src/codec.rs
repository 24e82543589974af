//! Wire codec: encode/decode a [`MetricMessage`] to/from a bounded byte buffer.
//!
//! The maximum datagram length is 1472 bytes — 1500-byte MTU minus IP+UDP
//! headers. The encoder refuses to emit anything larger; the decoder
//! tolerates truncated or malformed bytes by returning [`DecodeError`]
//! rather than panicking.

use crate::message::MetricMessage;

/// 1500-byte MTU minus 20-byte IPv4 header minus 8-byte UDP header.
pub const MAX_DATAGRAM_LEN: usize = 1472;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed message: {0}")]
    Malformed(#[from] bincode::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("encoded message exceeds the {MAX_DATAGRAM_LEN}-byte datagram cap ({0} bytes)")]
    TooLarge(usize),
    #[error("failed to serialize message: {0}")]
    Serialize(#[from] bincode::Error),
}

/// Encode `message` into a byte vector no longer than [`MAX_DATAGRAM_LEN`].
pub fn encode(message: &MetricMessage) -> Result<Vec<u8>, EncodeError> {
    let bytes = bincode::serialize(message)?;
    if bytes.len() > MAX_DATAGRAM_LEN {
        return Err(EncodeError::TooLarge(bytes.len()));
    }
    Ok(bytes)
}

/// Decode a [`MetricMessage`] from a received datagram. Bytes beyond
/// [`MAX_DATAGRAM_LEN`] are never produced by a conforming encoder, but the
/// decoder doesn't special-case oversized input — `bincode` will simply fail
/// to parse garbage, which is the desired "drop silently" outcome upstream.
pub fn decode(bytes: &[u8]) -> Result<MetricMessage, DecodeError> {
    Ok(bincode::deserialize(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MetricId, MetricValue};

    #[test]
    fn round_trip_every_value_variant() {
        let cases = vec![
            MetricValue::Unknown,
            MetricValue::String("hello".into()),
            MetricValue::UInt16(7),
            MetricValue::Int16(-7),
            MetricValue::UInt32(70_000),
            MetricValue::Int32(-70_000),
            MetricValue::Float(1.5),
            MetricValue::Double(2.25),
        ];
        for value in cases {
            let msg = MetricMessage::new(MetricId(42), value.clone());
            let bytes = encode(&msg).expect("encode");
            assert!(bytes.len() <= MAX_DATAGRAM_LEN);
            let decoded = decode(&bytes).expect("decode");
            assert_eq!(decoded, msg);
        }
    }

    #[test]
    fn decode_rejects_truncated_bytes() {
        let msg = MetricMessage::new(MetricId(5), MetricValue::String("a longer payload".into()));
        let bytes = encode(&msg).unwrap();
        let truncated = &bytes[..bytes.len() / 2];
        assert!(decode(truncated).is_err());
    }

    #[test]
    fn decode_never_panics_on_random_bytes() {
        // P6: random bytes of length <= 1472 must never crash the decoder.
        let mut seed: u64 = 0x9E3779B97F4A7C15;
        for _ in 0..2000 {
            let len = (seed % (MAX_DATAGRAM_LEN as u64 + 1)) as usize;
            let mut buf = vec![0u8; len];
            for b in buf.iter_mut() {
                seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
                *b = (seed >> 33) as u8;
            }
            let _ = decode(&buf);
        }
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let huge = MetricValue::String("x".repeat(MAX_DATAGRAM_LEN * 2));
        let msg = MetricMessage::new(MetricId(9), huge);
        assert!(matches!(encode(&msg), Err(EncodeError::TooLarge(_))));
    }
}
