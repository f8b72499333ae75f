//! Loading record sets from JSON and serialization helpers.
//!
//! A record file is a JSON array of `{ "key", "features", "extraction_time_ms" }`
//! objects, as produced by an upstream feature extractor. Ids are assigned in
//! file order starting at 0.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, IndexError};
use crate::record::ImageRecord;
use crate::vector::FeatureVector;

/// One entry of a record file, before an id is assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordEntry {
    pub key: String,
    pub features: FeatureVector,
    #[serde(default)]
    pub extraction_time_ms: f64,
}

/// Decode data from JSON bytes.
pub fn from_json<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| IndexError::Serialization(e.to_string()))
}

/// Encode data to pretty-printed JSON bytes.
pub fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(value).map_err(|e| IndexError::Serialization(e.to_string()))
}

/// Turn file entries into records with ids `0..n`.
pub fn assign_ids(entries: Vec<RecordEntry>) -> Vec<ImageRecord> {
    entries
        .into_iter()
        .enumerate()
        .map(|(id, entry)| ImageRecord {
            id,
            key: entry.key,
            features: entry.features,
            extraction_time_ms: entry.extraction_time_ms,
        })
        .collect()
}

/// Load a record file. All records must share one dimension.
pub fn load_records(path: impl AsRef<Path>) -> Result<Vec<ImageRecord>> {
    let bytes = std::fs::read(path)?;
    let records = assign_ids(from_json(&bytes)?);

    if let Some(first) = records.first() {
        for record in &records {
            record.features.ensure_dimension(first.dimension())?;
        }
    }
    Ok(records)
}

/// Write records back out in the record file format.
pub fn save_records(path: impl AsRef<Path>, records: &[ImageRecord]) -> Result<()> {
    let entries: Vec<RecordEntry> = records
        .iter()
        .map(|r| RecordEntry {
            key: r.key.clone(),
            features: r.features.clone(),
            extraction_time_ms: r.extraction_time_ms,
        })
        .collect();
    std::fs::write(path, to_json(&entries)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_assigns_ids_in_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.json");
        std::fs::write(
            &path,
            r#"[
                { "key": "a.jpg", "features": [0.1, 0.2], "extraction_time_ms": 3.5 },
                { "key": "b.jpg", "features": [0.3, 0.4] }
            ]"#,
        )
        .unwrap();

        let records = load_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, 0);
        assert_eq!(records[1].id, 1);
        assert_eq!(records[1].key, "b.jpg");
        assert_eq!(records[0].extraction_time_ms, 3.5);
        assert_eq!(records[1].features.as_slice(), &[0.3, 0.4]);
    }

    #[test]
    fn test_mixed_dimensions_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.json");
        std::fs::write(
            &path,
            r#"[{ "key": "a", "features": [1.0] }, { "key": "b", "features": [1.0, 2.0] }]"#,
        )
        .unwrap();
        assert!(matches!(
            load_records(&path),
            Err(IndexError::DimensionMismatch { expected: 1, actual: 2 })
        ));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.json");
        let records = vec![
            ImageRecord::new(0, "x.png", FeatureVector::new(vec![1.0, 2.0])),
            ImageRecord::new(1, "y.png", FeatureVector::new(vec![3.0, 4.0])),
        ];
        save_records(&path, &records).unwrap();
        assert_eq!(load_records(&path).unwrap(), records);
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            from_json::<Vec<RecordEntry>>(b"not json"),
            Err(IndexError::Serialization(_))
        ));
    }
}
