use crate::error::Result;
use crate::types::EventRecord;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Digest used for composite and payload keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Md5,
}

impl HashAlgorithm {
    /// Lowercase hex digest of `bytes`
    pub fn hex_digest(&self, bytes: &[u8]) -> String {
        match self {
            HashAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                hasher.update(bytes);
                hex::encode(hasher.finalize())
            }
            HashAlgorithm::Md5 => format!("{:x}", md5::compute(bytes)),
        }
    }
}

/// Natural key of a message: `message_id ++ sequence_id ++ partition_id`,
/// concatenated without a separator.
pub fn composite_key(record: &EventRecord) -> String {
    format!(
        "{}{}{}",
        record.message_id, record.sequence_id, record.partition_id
    )
}

pub fn compute_composite_hash(record: &EventRecord, algorithm: HashAlgorithm) -> String {
    algorithm.hex_digest(composite_key(record).as_bytes())
}

/// Hash of the whole record as canonical JSON (keys sorted), so any field
/// change produces a different digest.
pub fn compute_payload_hash(record: &EventRecord, algorithm: HashAlgorithm) -> Result<String> {
    let canonical = serde_json::to_value(record)?;
    let payload = serde_json::to_string(&canonical)?;
    Ok(algorithm.hex_digest(payload.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(message_id: &str, sequence_id: i64, partition_id: i64) -> EventRecord {
        EventRecord::new(message_id, sequence_id, partition_id, 1.0)
    }

    #[test]
    fn test_composite_key_concatenates_identity_fields() {
        assert_eq!(composite_key(&record("abc", 1, 2)), "abc12");
    }

    #[test]
    fn test_sha256_composite_hash() {
        // sha256("abc12")
        assert_eq!(
            compute_composite_hash(&record("abc", 1, 2), HashAlgorithm::Sha256),
            "8d51feb34e3e69f6fa6dffc577e2c60490cf9a7fcd835f9f6af1505b71d74773"
        );
    }

    #[test]
    fn test_md5_composite_hash() {
        // md5("abc12")
        assert_eq!(
            compute_composite_hash(&record("abc", 1, 2), HashAlgorithm::Md5),
            "b2157e7b2ae716a747597717f1efb7a0"
        );
    }

    #[test]
    fn test_payload_hash_changes_with_payload() {
        let a = record("abc", 1, 2);
        let mut b = a.clone();
        b.value = Some(99);
        let ha = compute_payload_hash(&a, HashAlgorithm::Sha256).unwrap();
        let hb = compute_payload_hash(&b, HashAlgorithm::Sha256).unwrap();
        assert_ne!(ha, hb);
        assert_eq!(ha, compute_payload_hash(&a.clone(), HashAlgorithm::Sha256).unwrap());
        assert_eq!(ha.len(), 64);
    }
}
