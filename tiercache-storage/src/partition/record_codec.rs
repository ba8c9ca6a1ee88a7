//! Binary layout of partition records in LMDB.
//!
//! # Key Format
//!
//! `[partition name bytes][0x00][sha256(canonical key): 32 bytes]`
//!
//! The digest bounds key length regardless of URL length (LMDB keys are
//! limited to 511 bytes), and the separator makes every partition a
//! contiguous prefix range that cannot collide with a longer name
//! (`api-v1` vs `api-v10`).
//!
//! # Value Format
//!
//! `[stored_at millis: 8 bytes LE][header length: 4 bytes LE][JSON header][payload]`
//!
//! The header repeats the full canonical key, so a digest collision is
//! detected on read and treated as a miss.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tiercache_core::{compute_key_digest, CacheKey, CacheRecord, Metadata, Strategy};

const SEPARATOR: u8 = 0x00;
const FIXED_PREFIX_LEN: usize = 12;

/// Prefix shared by every record of a partition.
pub fn partition_prefix(partition: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(partition.len() + 1);
    bytes.extend_from_slice(partition.as_bytes());
    bytes.push(SEPARATOR);
    bytes
}

/// Full LMDB key of a record.
pub fn record_key(partition: &str, key: &CacheKey) -> Vec<u8> {
    let mut bytes = partition_prefix(partition);
    bytes.extend_from_slice(&compute_key_digest(key.as_bytes()));
    bytes
}

#[derive(Debug, Serialize, Deserialize)]
struct RecordHeader {
    key: CacheKey,
    status: u16,
    metadata: Metadata,
    freshness_ms: u64,
    source_strategy: Strategy,
}

/// Encode a record into its stored value.
pub fn encode_record(record: &CacheRecord) -> Result<Vec<u8>, serde_json::Error> {
    let header = RecordHeader {
        key: record.key.clone(),
        status: record.status,
        metadata: record.metadata.clone(),
        freshness_ms: u64::try_from(record.freshness_window.as_millis()).unwrap_or(u64::MAX),
        source_strategy: record.source_strategy,
    };
    let header_bytes = serde_json::to_vec(&header)?;

    let mut bytes =
        Vec::with_capacity(FIXED_PREFIX_LEN + header_bytes.len() + record.payload.len());
    bytes.extend_from_slice(&record.stored_at.timestamp_millis().to_le_bytes());
    bytes.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&header_bytes);
    bytes.extend_from_slice(&record.payload);
    Ok(bytes)
}

/// Decode a stored value.
///
/// Returns `Ok(None)` when the header names a different key than `expected`.
pub fn decode_record(
    bytes: &[u8],
    expected: &CacheKey,
) -> Result<Option<CacheRecord>, String> {
    if bytes.len() < FIXED_PREFIX_LEN {
        return Err(format!("record too short: {} bytes", bytes.len()));
    }

    let mut millis = [0u8; 8];
    millis.copy_from_slice(&bytes[0..8]);
    let stored_at = DateTime::from_timestamp_millis(i64::from_le_bytes(millis))
        .ok_or_else(|| "invalid stored_at timestamp".to_string())?;

    let mut len = [0u8; 4];
    len.copy_from_slice(&bytes[8..12]);
    let header_len = u32::from_le_bytes(len) as usize;
    let header_end = FIXED_PREFIX_LEN
        .checked_add(header_len)
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| format!("header length {} exceeds record", header_len))?;

    let header: RecordHeader = serde_json::from_slice(&bytes[FIXED_PREFIX_LEN..header_end])
        .map_err(|e| e.to_string())?;
    if &header.key != expected {
        return Ok(None);
    }

    Ok(Some(CacheRecord {
        key: header.key,
        status: header.status,
        payload: bytes[header_end..].to_vec(),
        metadata: header.metadata,
        stored_at,
        freshness_window: Duration::from_millis(header.freshness_ms),
        source_strategy: header.source_strategy,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use tiercache_core::Strategy;
    use tiercache_core::ResourceResponse;

    fn sample(key: &CacheKey, payload: Vec<u8>) -> CacheRecord {
        let now = DateTime::from_timestamp_millis(Utc::now().timestamp_millis())
            .expect("valid millis");
        let response = ResourceResponse::ok(payload, now).with_metadata("content-type", "image/png");
        CacheRecord::from_response(
            key.clone(),
            &response,
            now,
            Duration::from_secs(3600),
            Strategy::CacheFirst,
        )
    }

    #[test]
    fn test_partition_prefixes_do_not_overlap() {
        let k = CacheKey::from_canonical("GET https://example.com/api/x");
        let short = record_key("api-v1", &k);
        let long = record_key("api-v10", &k);
        assert!(!long.starts_with(&partition_prefix("api-v1")));
        assert!(short.starts_with(&partition_prefix("api-v1")));
    }

    #[test]
    fn test_key_length_is_bounded() {
        let long_url = format!("GET https://example.com/{}", "a".repeat(4096));
        let key = record_key("images-v1", &CacheKey::from_canonical(long_url));
        assert_eq!(key.len(), "images-v1".len() + 1 + 32);
    }

    #[test]
    fn test_decode_rejects_truncated_values() {
        let k = CacheKey::from_canonical("GET https://example.com/a");
        assert!(decode_record(&[1, 2, 3], &k).is_err());

        let mut encoded = encode_record(&sample(&k, b"abc".to_vec())).expect("encode");
        encoded[8..12].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(decode_record(&encoded, &k).is_err());
    }

    #[test]
    fn test_decode_detects_foreign_key() {
        let k = CacheKey::from_canonical("GET https://example.com/a");
        let other = CacheKey::from_canonical("GET https://example.com/b");
        let encoded = encode_record(&sample(&k, b"abc".to_vec())).expect("encode");
        assert_eq!(decode_record(&encoded, &other), Ok(None));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Property: payload bytes survive storage untouched, including
        /// bytes that look like JSON or the separator.
        #[test]
        fn prop_payload_survives_encoding(payload in proptest::collection::vec(any::<u8>(), 0..512)) {
            let k = CacheKey::from_canonical("GET https://example.com/blob");
            let record = sample(&k, payload.clone());
            let encoded = encode_record(&record).expect("encode");
            let decoded = decode_record(&encoded, &k).expect("decode").expect("same key");
            prop_assert_eq!(decoded.payload, payload);
            prop_assert_eq!(decoded.stored_at, record.stored_at);
        }
    }
}
