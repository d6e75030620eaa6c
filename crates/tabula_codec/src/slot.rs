//! Fixed-length slot framing.

use crate::error::{CodecError, CodecResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Size of the little-endian payload length that opens every slot.
pub const SLOT_PREFIX_SIZE: usize = 4;

/// Encodes a value to CBOR bytes.
///
/// # Errors
///
/// Returns [`CodecError::EncodingFailed`] if serialization fails.
pub fn to_cbor<T: Serialize + ?Sized>(value: &T) -> CodecResult<Vec<u8>> {
    let mut buffer = Vec::new();
    ciborium::into_writer(value, &mut buffer)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(buffer)
}

/// Decodes a value from CBOR bytes.
///
/// # Errors
///
/// Returns [`CodecError::DecodingFailed`] if the bytes are not valid CBOR
/// for `T`.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    ciborium::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))
}

/// Encodes `value` into a slot of exactly `slot_len` bytes.
///
/// # Errors
///
/// Returns [`CodecError::SlotOverflow`] when the prefixed payload is longer
/// than `slot_len`, or an encoding error.
pub fn encode_slot<T: Serialize + ?Sized>(value: &T, slot_len: usize) -> CodecResult<Vec<u8>> {
    let payload = to_cbor(value)?;
    let needed = SLOT_PREFIX_SIZE + payload.len();
    if needed > slot_len {
        return Err(CodecError::SlotOverflow {
            needed,
            capacity: slot_len,
        });
    }

    let mut slot = Vec::with_capacity(slot_len);
    slot.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    slot.extend_from_slice(&payload);
    slot.resize(slot_len, 0);
    Ok(slot)
}

/// Decodes a slot written by [`encode_slot`].
///
/// Returns `Ok(None)` for a slot whose length prefix is zero (never written).
///
/// # Errors
///
/// Returns [`CodecError::Truncated`] if the prefix points past the slot, or
/// a decoding error for damaged payloads.
pub fn decode_slot<T: DeserializeOwned>(slot: &[u8]) -> CodecResult<Option<T>> {
    if slot.len() < SLOT_PREFIX_SIZE {
        return Err(CodecError::Truncated {
            declared: SLOT_PREFIX_SIZE,
            available: slot.len(),
        });
    }

    let declared = u32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]]) as usize;
    if declared == 0 {
        return Ok(None);
    }

    let available = slot.len() - SLOT_PREFIX_SIZE;
    if declared > available {
        return Err(CodecError::Truncated {
            declared,
            available,
        });
    }

    from_cbor(&slot[SLOT_PREFIX_SIZE..SLOT_PREFIX_SIZE + declared]).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    enum Slot {
        Live(Value),
        Tombstone { previous: Option<u64> },
    }

    #[test]
    fn slot_is_padded_to_length() {
        let slot = encode_slot(&Value::from("abc"), 32).unwrap();
        assert_eq!(slot.len(), 32);
        assert_eq!(u32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]]), 4);
        assert!(slot[8..].iter().all(|b| *b == 0));
    }

    #[test]
    fn empty_slot_decodes_to_none() {
        let decoded: Option<Value> = decode_slot(&[0u8; 16]).unwrap();
        assert_eq!(decoded, None);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let long = Value::Text("x".repeat(100));
        let err = encode_slot(&long, 64).unwrap_err();
        assert_eq!(
            err,
            CodecError::SlotOverflow {
                needed: 106,
                capacity: 64
            }
        );
    }

    #[test]
    fn prefix_past_end_is_truncated() {
        let mut slot = vec![0u8; 16];
        slot[0] = 200;
        let err = decode_slot::<Value>(&slot).unwrap_err();
        assert!(matches!(err, CodecError::Truncated { declared: 200, .. }));
    }

    #[test]
    fn garbage_payload_fails_to_decode() {
        let mut slot = vec![0u8; 16];
        slot[0] = 2;
        slot[4] = 0xff;
        slot[5] = 0xff;
        assert!(matches!(
            decode_slot::<Slot>(&slot),
            Err(CodecError::DecodingFailed { .. })
        ));
    }

    #[test]
    fn enum_slots_keep_their_variant() {
        let tombstone = Slot::Tombstone { previous: Some(7) };
        let slot = encode_slot(&tombstone, 64).unwrap();
        assert_eq!(decode_slot::<Slot>(&slot).unwrap(), Some(tombstone));

        let live = Slot::Live(Value::map(vec![("a".to_string(), Value::Integer(1))]));
        let slot = encode_slot(&live, 64).unwrap();
        assert_eq!(decode_slot::<Slot>(&slot).unwrap(), Some(live));
    }
}
