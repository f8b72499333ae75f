//! Bucketed hash index: records partitioned by a hash of their external key.
//!
//! The partition key (the record's file name) has nothing to do with the
//! distance metric, so a query still has to visit every bucket. The structure
//! is kept as a metric-blind baseline next to the linear scan.

use crate::distance;
use crate::error::{Result, IndexError};
use crate::index::{check_query, pin_dimension, BestMatch, NearestIndex, Neighbor};
use crate::record::{ImageRecord, RecordId};
use crate::vector::FeatureVector;

/// Default number of buckets.
pub const DEFAULT_BUCKETS: usize = 101;

/// A fixed-size table of buckets keyed by CRC-32 of the record key.
#[derive(Debug)]
pub struct HashIndex {
    buckets: Vec<Vec<ImageRecord>>,
    count: usize,
    dimension: Option<usize>,
}

impl Default for HashIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl HashIndex {
    /// Create an index with the default bucket count.
    pub fn new() -> Self {
        Self::with_buckets(DEFAULT_BUCKETS)
    }

    /// Create an index with `bucket_count` buckets (at least one).
    pub fn with_buckets(bucket_count: usize) -> Self {
        Self {
            buckets: vec![Vec::new(); bucket_count.max(1)],
            count: 0,
            dimension: None,
        }
    }

    /// Bucket a key maps to.
    pub fn bucket_for(&self, key: &str) -> usize {
        crc32fast::hash(key.as_bytes()) as usize % self.buckets.len()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Number of records held in each bucket, in bucket order.
    pub fn bucket_sizes(&self) -> Vec<usize> {
        self.buckets.iter().map(Vec::len).collect()
    }

    /// Records in traversal order: bucket index first, then insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ImageRecord> {
        self.buckets.iter().flatten()
    }

    /// Record at a global traversal position.
    pub fn nth(&self, position: usize) -> Option<&ImageRecord> {
        self.iter().nth(position)
    }
}

impl NearestIndex for HashIndex {
    fn name(&self) -> &'static str {
        "hash"
    }

    fn insert(&mut self, record: ImageRecord) -> Result<()> {
        pin_dimension(&mut self.dimension, &record.features)?;
        let bucket = self.bucket_for(&record.key);
        self.buckets[bucket].push(record);
        self.count += 1;
        Ok(())
    }

    fn find_nearest_counted(
        &self,
        query: &FeatureVector,
        ignore: Option<RecordId>,
        comparisons: &mut usize,
    ) -> Result<Option<Neighbor>> {
        check_query(self.dimension, query)?;

        let mut best = BestMatch::new();
        for record in self.iter().filter(|r| Some(r.id) != ignore) {
            *comparisons += 1;
            best.offer(record.id, distance::euclidean(query, &record.features)?);
        }
        Ok(best.into_neighbor())
    }

    fn get(&self, id: RecordId) -> Result<&ImageRecord> {
        self.iter()
            .find(|r| r.id == id)
            .ok_or(IndexError::RecordNotFound { id })
    }

    fn len(&self) -> usize {
        self.count
    }
}
