//! Linear index: exhaustive O(n) scan, the correctness oracle for the other structures

use crate::distance;
use crate::error::{Result, IndexError};
use crate::index::{check_query, pin_dimension, BestMatch, NearestIndex, Neighbor};
use crate::record::{ImageRecord, RecordId};
use crate::vector::FeatureVector;

/// An ordered list of records that computes distance to every stored vector.
#[derive(Debug, Default)]
pub struct LinearIndex {
    records: Vec<ImageRecord>,
    dimension: Option<usize>,
}

impl LinearIndex {
    /// Create a new empty linear index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterate over records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ImageRecord> {
        self.records.iter()
    }
}

impl NearestIndex for LinearIndex {
    fn name(&self) -> &'static str {
        "linear"
    }

    fn insert(&mut self, record: ImageRecord) -> Result<()> {
        pin_dimension(&mut self.dimension, &record.features)?;
        self.records.push(record);
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
        for record in self.records.iter().filter(|r| Some(r.id) != ignore) {
            *comparisons += 1;
            best.offer(record.id, distance::euclidean(query, &record.features)?);
        }
        Ok(best.into_neighbor())
    }

    fn get(&self, id: RecordId) -> Result<&ImageRecord> {
        self.records
            .iter()
            .find(|r| r.id == id)
            .ok_or(IndexError::RecordNotFound { id })
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}
