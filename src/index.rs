//! Shared nearest-neighbor contract for every index structure

use crate::error::Result;
use crate::record::{ImageRecord, RecordId};
use crate::vector::FeatureVector;

/// A search hit: the matching record id and its Euclidean distance to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: RecordId,
    pub distance: f32,
}

impl Neighbor {
    pub fn new(id: RecordId, distance: f32) -> Self {
        Self { id, distance }
    }
}

/// A nearest-neighbor index over image records.
///
/// Records are inserted once and queried any number of times. Every
/// implementation answers with `Ok(None)` when no candidate is left after
/// excluding `ignore`; that is a normal outcome, not an error.
pub trait NearestIndex {
    /// Short human-readable name used in reports.
    fn name(&self) -> &'static str;

    /// Add one record. The record's own `id` is used as its identifier.
    fn insert(&mut self, record: ImageRecord) -> Result<()>;

    /// Find the stored record closest to `query`, skipping the record whose id
    /// equals `ignore`. `comparisons` is incremented once per true-distance
    /// evaluation against a stored record.
    ///
    /// Ties keep the first record encountered in the index's traversal order.
    fn find_nearest_counted(
        &self,
        query: &FeatureVector,
        ignore: Option<RecordId>,
        comparisons: &mut usize,
    ) -> Result<Option<Neighbor>>;

    /// Same as [`find_nearest_counted`](Self::find_nearest_counted) without the counter.
    fn find_nearest(
        &self,
        query: &FeatureVector,
        ignore: Option<RecordId>,
    ) -> Result<Option<Neighbor>> {
        let mut comparisons = 0;
        self.find_nearest_counted(query, ignore, &mut comparisons)
    }

    /// Exact lookup by id. Fails with `RecordNotFound` if absent.
    fn get(&self, id: RecordId) -> Result<&ImageRecord>;

    /// The number of records in this index.
    fn len(&self) -> usize;

    /// Whether the index is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Running minimum under the strict-improvement rule.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct BestMatch {
    best: Option<Neighbor>,
}

impl BestMatch {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Current best distance, or infinity before the first candidate.
    pub(crate) fn bound(&self) -> f32 {
        self.best.map_or(f32::INFINITY, |n| n.distance)
    }

    /// Replace the current best only if `distance` is strictly smaller.
    pub(crate) fn offer(&mut self, id: RecordId, distance: f32) {
        match self.best {
            Some(current) if distance >= current.distance => {}
            _ => self.best = Some(Neighbor::new(id, distance)),
        }
    }

    pub(crate) fn into_neighbor(self) -> Option<Neighbor> {
        self.best
    }
}

/// Pin the collection dimension on first use and check every later vector against it.
pub(crate) fn pin_dimension(pinned: &mut Option<usize>, features: &FeatureVector) -> Result<()> {
    match *pinned {
        Some(expected) => features.ensure_dimension(expected),
        None => {
            *pinned = Some(features.dimension());
            Ok(())
        }
    }
}

/// Check a query against the pinned dimension. An unpinned (empty) index accepts anything.
pub(crate) fn check_query(pinned: Option<usize>, query: &FeatureVector) -> Result<()> {
    match pinned {
        Some(expected) => query.ensure_dimension(expected),
        None => Ok(()),
    }
}
