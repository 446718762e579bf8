//! On-disk record wire format: the framing a `Store` persists and a
//! `Segment` hands back to callers. See spec.md §6.
//!
//! ```text
//! offset          : u64 BE
//! total_length    : u32 BE   (bytes from attributes through payload)
//! crc32           : u32 BE   (over attributes..=payload)
//! attributes      : u8       (reserved, always 0)
//! key_length      : u32 BE   (0xFFFFFFFF => null key)
//! key             : key_length bytes
//! payload_length  : u32 BE
//! payload         : payload_length bytes
//! ```
use crate::errors::StorageError;
use crate::StorageResult;

/// Sentinel `key_length` meaning "no key was supplied".
pub const NULL_KEY_LENGTH: u32 = 0xFFFF_FFFF;
/// Fixed-width header preceding `attributes`: offset + total_length + crc32.
const FIXED_HEADER_LEN: usize = 8 + 4 + 4;
/// Bytes after `total_length` that are included in `total_length`'s count:
/// attributes + key_length + payload_length, excluding the variable parts.
const VARIABLE_HEADER_LEN: usize = 1 + 4 + 4;

/// A decoded on-disk record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub offset: u64,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

impl Record {
    pub fn new(offset: u64, key: Option<Vec<u8>>, payload: Vec<u8>) -> Self {
        Self {
            offset,
            key,
            payload,
        }
    }

    /// Total encoded size in bytes, i.e. what `Store::append` will write.
    pub fn encoded_len(&self) -> usize {
        FIXED_HEADER_LEN
            + VARIABLE_HEADER_LEN
            + self.key.as_ref().map(|k| k.len()).unwrap_or(0)
            + self.payload.len()
    }

    /// Encodes the record, computing the CRC32 over `attributes..=payload`.
    pub fn encode(&self) -> StorageResult<Vec<u8>> {
        let key_len = self.key.as_ref().map(|k| k.len()).unwrap_or(0);
        if key_len > u32::MAX as usize - 1 || self.payload.len() > u32::MAX as usize {
            return Err(StorageError::EntryTooLarge {
                actual: (key_len + self.payload.len()) as u64,
                max: u32::MAX as u64,
            });
        }

        let mut body = Vec::with_capacity(VARIABLE_HEADER_LEN + key_len + self.payload.len());
        body.push(0u8); // attributes, reserved
        match &self.key {
            Some(key) => {
                body.extend_from_slice(&(key.len() as u32).to_be_bytes());
                body.extend_from_slice(key);
            }
            None => {
                body.extend_from_slice(&NULL_KEY_LENGTH.to_be_bytes());
            }
        }
        body.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        body.extend_from_slice(&self.payload);

        let crc = crc32fast::hash(&body);
        let total_length = body.len() as u32;

        let mut out = Vec::with_capacity(FIXED_HEADER_LEN + body.len());
        out.extend_from_slice(&self.offset.to_be_bytes());
        out.extend_from_slice(&total_length.to_be_bytes());
        out.extend_from_slice(&crc.to_be_bytes());
        out.extend_from_slice(&body);

        Ok(out)
    }

    /// Decodes a single record from the front of `buf`, returning the
    /// record and the number of bytes consumed. Fails with
    /// `CorruptedRecord` if the buffer is short or the CRC doesn't match.
    pub fn decode(buf: &[u8]) -> StorageResult<(Record, usize)> {
        if buf.len() < FIXED_HEADER_LEN {
            return Err(StorageError::CorruptedRecord {
                position: 0,
                reason: "buffer shorter than fixed record header".to_string(),
            });
        }

        let offset = u64::from_be_bytes(buf[0..8].try_into().unwrap());
        let total_length = u32::from_be_bytes(buf[8..12].try_into().unwrap()) as usize;
        let crc = u32::from_be_bytes(buf[12..16].try_into().unwrap());

        let record_end = FIXED_HEADER_LEN + total_length;
        if buf.len() < record_end {
            return Err(StorageError::CorruptedRecord {
                position: 0,
                reason: format!(
                    "declared total_length {total_length} exceeds available {} bytes",
                    buf.len() - FIXED_HEADER_LEN
                ),
            });
        }

        let body = &buf[FIXED_HEADER_LEN..record_end];
        let actual_crc = crc32fast::hash(body);
        if actual_crc != crc {
            return Err(StorageError::CorruptedRecord {
                position: 0,
                reason: format!("crc mismatch: stored {crc:#x}, computed {actual_crc:#x}"),
            });
        }

        if body.len() < VARIABLE_HEADER_LEN {
            return Err(StorageError::CorruptedRecord {
                position: 0,
                reason: "record body shorter than variable header".to_string(),
            });
        }

        // body[0] is attributes, reserved and currently unused.
        let key_length = u32::from_be_bytes(body[1..5].try_into().unwrap());
        let mut cursor = 5usize;

        let key = if key_length == NULL_KEY_LENGTH {
            None
        } else {
            let key_length = key_length as usize;
            let end = cursor + key_length;
            if body.len() < end {
                return Err(StorageError::CorruptedRecord {
                    position: 0,
                    reason: "key_length exceeds record body".to_string(),
                });
            }
            let key = body[cursor..end].to_vec();
            cursor = end;
            Some(key)
        };

        if body.len() < cursor + 4 {
            return Err(StorageError::CorruptedRecord {
                position: 0,
                reason: "record body truncated before payload_length".to_string(),
            });
        }
        let payload_length =
            u32::from_be_bytes(body[cursor..cursor + 4].try_into().unwrap()) as usize;
        cursor += 4;
        let payload_end = cursor + payload_length;
        if body.len() < payload_end {
            return Err(StorageError::CorruptedRecord {
                position: 0,
                reason: "payload_length exceeds record body".to_string(),
            });
        }
        let payload = body[cursor..payload_end].to_vec();

        Ok((Record::new(offset, key, payload), record_end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_with_key() {
        let record = Record::new(42, Some(b"key-1".to_vec()), b"hello world".to_vec());
        let encoded = record.encode().unwrap();
        let (decoded, consumed) = Record::decode(&encoded).unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(decoded, record);
    }

    #[test]
    fn round_trips_without_key() {
        let record = Record::new(7, None, b"payload only".to_vec());
        let encoded = record.encode().unwrap();
        let (decoded, _) = Record::decode(&encoded).unwrap();
        assert_eq!(decoded.key, None);
        assert_eq!(decoded.payload, record.payload);
    }

    #[test]
    fn detects_crc_corruption() {
        let record = Record::new(1, None, b"data".to_vec());
        let mut encoded = record.encode().unwrap();
        // flip a byte inside the payload
        let last = encoded.len() - 1;
        encoded[last] ^= 0xFF;

        let err = Record::decode(&encoded).unwrap_err();
        assert!(matches!(err, StorageError::CorruptedRecord { .. }));
    }

    #[test]
    fn decode_reports_trailing_bytes_consumed_only() {
        let a = Record::new(0, None, b"first".to_vec());
        let b = Record::new(1, None, b"second".to_vec());
        let mut buf = a.encode().unwrap();
        buf.extend_from_slice(&b.encode().unwrap());

        let (decoded_a, consumed) = Record::decode(&buf).unwrap();
        assert_eq!(decoded_a, a);
        let (decoded_b, _) = Record::decode(&buf[consumed..]).unwrap();
        assert_eq!(decoded_b, b);
    }
}
