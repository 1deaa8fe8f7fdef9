use crate::error::{EngineError, EngineResult};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// SHA-256 hex digest of raw bytes.
pub fn calculate_bytes_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Digest of the canonical JSON form of any serializable value
/// (input workbooks, API payloads, configuration).
pub fn calculate_content_hash<T: Serialize>(value: &T) -> EngineResult<String> {
    let json = serde_json::to_vec(value).map_err(|e| {
        EngineError::invalid_payload(format!("failed to serialize for hashing: {e}"))
    })?;
    Ok(calculate_bytes_hash(&json))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::types::{Scalar, SheetInput, WorkbookInput};

    fn workbook(value: f64) -> WorkbookInput {
        WorkbookInput {
            file_name: "report.xlsx".to_string(),
            sheets: vec![SheetInput {
                name: "Sheet1".to_string(),
                grid: vec![vec![Scalar::text("Total"), Scalar::Number(value)]],
                merges: vec![],
            }],
        }
    }

    #[test]
    fn test_content_hash_consistency() {
        let hash1 = calculate_content_hash(&workbook(1.0)).unwrap();
        let hash2 = calculate_content_hash(&workbook(1.0)).unwrap();
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_content_hash_uniqueness() {
        let hash1 = calculate_content_hash(&workbook(1.0)).unwrap();
        let hash2 = calculate_content_hash(&workbook(2.0)).unwrap();
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_config_hash_tracks_changes() {
        let default = EngineConfig::default();
        let mut tuned = EngineConfig::default();
        tuned.headers.max_header_rows = 2;
        assert_ne!(
            calculate_content_hash(&default).unwrap(),
            calculate_content_hash(&tuned).unwrap()
        );
    }

    #[test]
    fn test_bytes_hash_known_value() {
        assert_eq!(
            calculate_bytes_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
