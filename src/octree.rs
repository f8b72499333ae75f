//! Spatial octree over a bounded, low-dimensional projection of the features.
//!
//! Each node covers an axis-aligned box. Once a node holds `capacity` records
//! it splits every axis at its midpoint into 2^d children (4 for the usual
//! 2-D image coordinates, 8 in 3-D) and routes further records into the single
//! child whose box contains their position. Search visits every non-empty
//! node without distance-based pruning, so the answer is exact but the cost
//! stays linear.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::distance;
use crate::error::{Result, IndexError};
use crate::index::{check_query, pin_dimension, BestMatch, NearestIndex, Neighbor};
use crate::record::{ImageRecord, RecordId};
use crate::vector::FeatureVector;

/// Upper bound on region axes; a node splits into 2^axes children.
pub const MAX_AXES: usize = 8;

/// Deepest level a node may subdivide to. f32 midpoints stop separating points well before this.
pub const MAX_DEPTH: usize = 64;

/// An axis-aligned box with inclusive bounds on every axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub min: Vec<f32>,
    pub max: Vec<f32>,
}

impl Region {
    pub fn new(min: Vec<f32>, max: Vec<f32>) -> Result<Self> {
        if min.len() != max.len() {
            return Err(IndexError::InvalidConfig(format!(
                "region bounds have {} and {} axes",
                min.len(),
                max.len()
            )));
        }
        if min.is_empty() || min.len() > MAX_AXES {
            return Err(IndexError::InvalidConfig(format!(
                "region must have between 1 and {} axes, got {}",
                MAX_AXES,
                min.len()
            )));
        }
        if min
            .iter()
            .zip(&max)
            .any(|(lo, hi)| lo > hi || lo.is_nan() || hi.is_nan())
        {
            return Err(IndexError::InvalidConfig(
                "region min must not exceed max on any axis".to_string(),
            ));
        }
        Ok(Self { min, max })
    }

    /// The same `[lo, hi]` range on each of `axes` axes.
    pub fn cube(axes: usize, lo: f32, hi: f32) -> Result<Self> {
        Self::new(vec![lo; axes], vec![hi; axes])
    }

    pub fn dimension(&self) -> usize {
        self.min.len()
    }

    pub fn contains(&self, position: &[f32]) -> bool {
        position.len() == self.dimension()
            && position
                .iter()
                .zip(self.min.iter().zip(&self.max))
                .all(|(p, (lo, hi))| lo <= p && p <= hi)
    }

    fn midpoint(&self) -> Vec<f32> {
        self.min
            .iter()
            .zip(&self.max)
            .map(|(lo, hi)| lo + (hi - lo) / 2.0)
            .collect()
    }

    /// Child slot for a position: bit `a` is set when the position lies at or
    /// above the midpoint on axis `a`. Points on the midpoint go to the upper half.
    fn child_index(position: &[f32], mid: &[f32]) -> usize {
        position
            .iter()
            .zip(mid)
            .enumerate()
            .filter(|(_, (p, m))| p >= m)
            .fold(0, |index, (axis, _)| index | (1 << axis))
    }

    fn child_region(&self, index: usize, mid: &[f32]) -> Region {
        let (min, max) = (0..self.dimension())
            .map(|axis| {
                if index & (1 << axis) != 0 {
                    (mid[axis], self.max[axis])
                } else {
                    (self.min[axis], mid[axis])
                }
            })
            .unzip();
        Region { min, max }
    }
}

/// Maps a feature vector to a low-dimensional position: `features[axis] * scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Projection {
    pub axes: Vec<usize>,
    pub scale: f32,
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            axes: vec![0, 1],
            scale: 255.0,
        }
    }
}

impl Projection {
    pub fn project(&self, features: &FeatureVector) -> Result<Vec<f32>> {
        let data = features.as_slice();
        self.axes
            .iter()
            .map(|&axis| {
                data.get(axis)
                    .map(|value| value * self.scale)
                    .ok_or_else(|| IndexError::InvalidVector {
                        reason: format!(
                            "projection axis {} out of range for dimension {}",
                            axis,
                            data.len()
                        ),
                    })
            })
            .collect()
    }
}

/// Configuration for the octree index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OctreeConfig {
    /// Region covered by the root node.
    pub region: Region,
    /// Records held locally before a node subdivides.
    pub capacity: usize,
    /// Depth at which nodes stop subdividing and keep appending.
    pub max_depth: usize,
    /// How positions are derived from feature vectors.
    pub projection: Projection,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            region: Region {
                min: vec![0.0, 0.0],
                max: vec![255.0, 255.0],
            },
            capacity: 4,
            max_depth: 10,
            projection: Projection::default(),
        }
    }
}

impl OctreeConfig {
    pub fn validate(&self) -> Result<()> {
        Region::new(self.region.min.clone(), self.region.max.clone())?;
        if self.projection.axes.len() != self.region.dimension() {
            return Err(IndexError::InvalidConfig(format!(
                "projection has {} axes but the region has {}",
                self.projection.axes.len(),
                self.region.dimension()
            )));
        }
        if self.max_depth > MAX_DEPTH {
            return Err(IndexError::InvalidConfig(format!(
                "max_depth {} exceeds the limit of {}",
                self.max_depth, MAX_DEPTH
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct OctreeEntry {
    record: ImageRecord,
    position: Vec<f32>,
}

#[derive(Debug)]
struct OctreeNode {
    region: Region,
    depth: usize,
    entries: Vec<OctreeEntry>,
    /// Empty until the first overflow, then exactly 2^d children.
    children: Vec<OctreeNode>,
    /// Records held in this subtree, including local ones.
    count: usize,
}

impl OctreeNode {
    fn new(region: Region, depth: usize) -> Self {
        Self {
            region,
            depth,
            entries: Vec::new(),
            children: Vec::new(),
            count: 0,
        }
    }

    fn subdivide(&mut self) {
        let mid = self.region.midpoint();
        let child_count = 1 << self.region.dimension();
        self.children = (0..child_count)
            .map(|index| OctreeNode::new(self.region.child_region(index, &mid), self.depth + 1))
            .collect();
        debug!(depth = self.depth, children = child_count, "octree node subdivided");
    }

    fn insert(&mut self, entry: OctreeEntry, capacity: usize, max_depth: usize) -> bool {
        if !self.region.contains(&entry.position) {
            return false;
        }

        if self.entries.len() < capacity || self.depth >= max_depth {
            self.entries.push(entry);
            self.count += 1;
            return true;
        }

        if self.children.is_empty() {
            self.subdivide();
        }

        let mid = self.region.midpoint();
        let index = Region::child_index(&entry.position, &mid);
        let accepted = match self.children.get_mut(index) {
            Some(child) => child.insert(entry, capacity, max_depth),
            None => false,
        };
        if accepted {
            self.count += 1;
        }
        accepted
    }

    fn search(
        &self,
        query: &FeatureVector,
        ignore: Option<RecordId>,
        best: &mut BestMatch,
        comparisons: &mut usize,
    ) -> Result<()> {
        for entry in self.entries.iter().filter(|e| Some(e.record.id) != ignore) {
            *comparisons += 1;
            best.offer(entry.record.id, distance::euclidean(query, &entry.record.features)?);
        }
        for child in self.children.iter().filter(|c| c.count > 0) {
            child.search(query, ignore, best, comparisons)?;
        }
        Ok(())
    }

    fn find(&self, id: RecordId) -> Option<&ImageRecord> {
        self.entries
            .iter()
            .map(|e| &e.record)
            .find(|r| r.id == id)
            .or_else(|| self.children.iter().find_map(|c| c.find(id)))
    }

    fn height(&self) -> usize {
        1 + self.children.iter().map(OctreeNode::height).max().unwrap_or(0)
    }
}

/// Octree (or quadtree, in 2-D) index over projected record positions.
#[derive(Debug)]
pub struct OctreeIndex {
    root: OctreeNode,
    capacity: usize,
    max_depth: usize,
    projection: Projection,
    dimension: Option<usize>,
    ids: HashSet<RecordId>,
}

impl OctreeIndex {
    /// Create an index with the default 2-D region over [0, 255].
    pub fn new() -> Self {
        Self::from_checked_config(OctreeConfig::default())
    }

    pub fn with_config(config: OctreeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_checked_config(config))
    }

    fn from_checked_config(config: OctreeConfig) -> Self {
        Self {
            root: OctreeNode::new(config.region, 0),
            capacity: config.capacity,
            max_depth: config.max_depth,
            projection: config.projection,
            dimension: None,
            ids: HashSet::new(),
        }
    }

    /// Insert a record at an explicit position. Returns `false`, leaving the
    /// index unchanged, if the position lies outside the root region.
    pub fn insert_at(&mut self, record: ImageRecord, position: Vec<f32>) -> Result<bool> {
        if position.len() != self.root.region.dimension() {
            return Err(IndexError::DimensionMismatch {
                expected: self.root.region.dimension(),
                actual: position.len(),
            });
        }
        if self.ids.contains(&record.id) {
            return Err(IndexError::DuplicateId { id: record.id });
        }
        pin_dimension(&mut self.dimension, &record.features)?;
        if !self.root.region.contains(&position) {
            return Ok(false);
        }

        let id = record.id;
        let accepted = self
            .root
            .insert(OctreeEntry { record, position }, self.capacity, self.max_depth);
        if accepted {
            self.ids.insert(id);
        }
        Ok(accepted)
    }

    /// Position a record would be routed by.
    pub fn position_of(&self, features: &FeatureVector) -> Result<Vec<f32>> {
        self.projection.project(features)
    }

    /// Number of levels, counting the root.
    pub fn height(&self) -> usize {
        self.root.height()
    }

    pub fn region(&self) -> &Region {
        &self.root.region
    }
}

impl Default for OctreeIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl NearestIndex for OctreeIndex {
    fn name(&self) -> &'static str {
        "octree"
    }

    fn insert(&mut self, record: ImageRecord) -> Result<()> {
        let position = self.position_of(&record.features)?;
        let id = record.id;
        if !self.insert_at(record, position.clone())? {
            warn!(id, ?position, "record lies outside the octree region, skipped");
        }
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
        self.root.search(query, ignore, &mut best, comparisons)?;
        Ok(best.into_neighbor())
    }

    fn get(&self, id: RecordId) -> Result<&ImageRecord> {
        self.root.find(id).ok_or(IndexError::RecordNotFound { id })
    }

    fn len(&self) -> usize {
        self.root.count
    }
}
