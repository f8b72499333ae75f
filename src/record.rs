//! Image records and the canonical id-to-record store

use crate::error::{Result, IndexError};
use crate::vector::FeatureVector;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Caller-assigned record identifier.
pub type RecordId = usize;

/// An indexed image: external key, feature vector and extraction metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: RecordId,
    /// Human-readable external key, e.g. a file name. Only the hash index looks at it.
    pub key: String,
    pub features: FeatureVector,
    #[serde(default)]
    pub extraction_time_ms: f64,
}

impl ImageRecord {
    pub fn new(id: RecordId, key: impl Into<String>, features: FeatureVector) -> Self {
        Self {
            id,
            key: key.into(),
            features,
            extraction_time_ms: 0.0,
        }
    }

    /// Build a record keyed by the file name component of `path`.
    pub fn from_path(
        id: RecordId,
        path: impl AsRef<Path>,
        features: FeatureVector,
        extraction_time_ms: f64,
    ) -> Self {
        let path = path.as_ref();
        let key = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self {
            id,
            key,
            features,
            extraction_time_ms,
        }
    }

    pub fn dimension(&self) -> usize {
        self.features.dimension()
    }
}

/// Insertion-ordered record storage with O(1) lookup by id.
#[derive(Debug, Default, Clone)]
pub struct RecordStore {
    records: Vec<ImageRecord>,
    /// id -> position in `records`
    positions: HashMap<RecordId, usize>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record, returning its position. Ids must be unique.
    pub fn insert(&mut self, record: ImageRecord) -> Result<usize> {
        if self.positions.contains_key(&record.id) {
            return Err(IndexError::DuplicateId { id: record.id });
        }
        let position = self.records.len();
        self.positions.insert(record.id, position);
        self.records.push(record);
        Ok(position)
    }

    pub fn get(&self, id: RecordId) -> Result<&ImageRecord> {
        self.positions
            .get(&id)
            .map(|&pos| &self.records[pos])
            .ok_or(IndexError::RecordNotFound { id })
    }

    /// Record at an insertion position.
    pub fn get_at(&self, position: usize) -> Option<&ImageRecord> {
        self.records.get(position)
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.positions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ImageRecord> {
        self.records.iter()
    }
}
