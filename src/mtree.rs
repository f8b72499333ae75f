//! M-Tree: a balanced metric tree with branch-and-bound nearest-neighbor search.
//!
//! Implements the structure from:
//! "M-tree: An Efficient Access Method for Similarity Search in Metric Spaces"
//! (Ciaccia, Patella & Zezula, 1997).
//!
//! Internal entries are routing objects: value copies of a record's features
//! plus a covering radius that bounds the distance to every record stored
//! beneath them. Search skips a subtree once `max(0, d(q, routing) - radius)`
//! is no better than the best distance found so far, which keeps the answer
//! exact as long as every covering radius is a true upper bound.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::distance;
use crate::error::{Result, IndexError};
use crate::index::{check_query, pin_dimension, BestMatch, NearestIndex, Neighbor};
use crate::record::{ImageRecord, RecordId, RecordStore};
use crate::vector::FeatureVector;

/// Smallest node capacity that still allows a split.
pub const MIN_CAPACITY: usize = 2;

/// Configuration parameters for the M-Tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MTreeConfig {
    /// Maximum entries per node before it splits.
    pub capacity: usize,
}

impl Default for MTreeConfig {
    fn default() -> Self {
        Self { capacity: 10 }
    }
}

/// An object stored in a node: a record at a leaf, a routing object above.
#[derive(Debug, Clone)]
struct MTreeEntry {
    id: RecordId,
    features: FeatureVector,
    /// Distance to the routing object of the parent node (0 at the root).
    distance_to_parent: f32,
}

impl MTreeEntry {
    fn from_record(record: &ImageRecord) -> Self {
        Self {
            id: record.id,
            features: record.features.clone(),
            distance_to_parent: 0.0,
        }
    }
}

/// A tree node. `entries`, `radii` and (for internal nodes) `children` are parallel.
#[derive(Debug)]
struct MTreeNode {
    is_leaf: bool,
    entries: Vec<MTreeEntry>,
    /// Covering radius per entry; always 0 at leaves.
    radii: Vec<f32>,
    children: Vec<MTreeNode>,
}

impl Default for MTreeNode {
    fn default() -> Self {
        Self::leaf()
    }
}

impl MTreeNode {
    fn leaf() -> Self {
        Self {
            is_leaf: true,
            entries: Vec::new(),
            radii: Vec::new(),
            children: Vec::new(),
        }
    }
}

/// One entry of a node being split, carried together with its radius and subtree.
struct Member {
    /// Position in the node before the split.
    slot: usize,
    entry: MTreeEntry,
    radius: f32,
    child: Option<MTreeNode>,
}

/// One side of a split: the new node plus its routing entry and covering radius.
struct SplitHalf {
    routing: MTreeEntry,
    radius: f32,
    node: MTreeNode,
}

/// Metric tree index with covering-radius pruning.
#[derive(Debug)]
pub struct MTreeIndex {
    root: Option<MTreeNode>,
    /// Flat id -> record mirror for O(1) lookups.
    store: RecordStore,
    capacity: usize,
    dimension: Option<usize>,
}

impl Default for MTreeIndex {
    fn default() -> Self {
        Self::with_config(MTreeConfig::default())
    }
}

impl MTreeIndex {
    /// Create an M-Tree whose nodes hold at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self::with_config(MTreeConfig { capacity })
    }

    pub fn with_config(config: MTreeConfig) -> Self {
        let capacity = if config.capacity < MIN_CAPACITY {
            warn!(
                requested = config.capacity,
                used = MIN_CAPACITY,
                "M-Tree capacity too small to split, clamped"
            );
            MIN_CAPACITY
        } else {
            config.capacity
        };
        Self {
            root: None,
            store: RecordStore::new(),
            capacity,
            dimension: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of levels; 0 for an empty tree.
    pub fn height(&self) -> usize {
        let mut height = 0;
        let mut node = self.root.as_ref();
        while let Some(current) = node {
            height += 1;
            node = current.children.first();
        }
        height
    }

    fn insert_into(
        node: &mut MTreeNode,
        mut entry: MTreeEntry,
        routing: Option<&FeatureVector>,
        capacity: usize,
    ) -> Result<()> {
        if node.is_leaf {
            entry.distance_to_parent = match routing {
                Some(parent) => distance::euclidean(&entry.features, parent)?,
                None => 0.0,
            };
            node.entries.push(entry);
            node.radii.push(0.0);
            return Ok(());
        }

        let Some((best, dist)) = Self::choose_best_subtree(node, &entry.features)? else {
            return Err(IndexError::InvariantViolation(
                "internal M-Tree node without entries".to_string(),
            ));
        };
        if best >= node.children.len() {
            return Err(IndexError::InvariantViolation(format!(
                "routing entry {} has no subtree",
                best
            )));
        }

        // enlarge before descending so the radius always covers the subtree
        if dist > node.radii[best] {
            node.radii[best] = dist;
        }
        Self::insert_into(
            &mut node.children[best],
            entry,
            Some(&node.entries[best].features),
            capacity,
        )?;

        if node.children[best].entries.len() > capacity {
            Self::split_child(node, best, routing)?;
        }
        Ok(())
    }

    /// Pick the subtree for `features`: among routing objects already covering
    /// it, the closest one; otherwise the one needing the smallest radius
    /// enlargement. Returns the entry index and the distance to its routing object.
    fn choose_best_subtree(
        node: &MTreeNode,
        features: &FeatureVector,
    ) -> Result<Option<(usize, f32)>> {
        let mut covering: Option<(usize, f32)> = None;
        let mut enlarging: Option<(usize, f32, f32)> = None;

        for (i, (entry, &radius)) in node.entries.iter().zip(&node.radii).enumerate() {
            let dist = distance::euclidean(features, &entry.features)?;
            if dist <= radius {
                if covering.map_or(true, |(_, d)| dist < d) {
                    covering = Some((i, dist));
                }
            } else {
                let enlargement = dist - radius;
                if enlarging.map_or(true, |(_, _, e)| enlargement < e) {
                    enlarging = Some((i, dist, enlargement));
                }
            }
        }

        Ok(covering.or(enlarging.map(|(i, dist, _)| (i, dist))))
    }

    /// The two entries with maximum pairwise distance.
    fn promote(entries: &[MTreeEntry]) -> Result<(usize, usize)> {
        let mut pair = (0, 1);
        let mut max_dist = 0.0;
        for i in 0..entries.len() {
            for j in (i + 1)..entries.len() {
                let dist = distance::euclidean(&entries[i].features, &entries[j].features)?;
                if dist > max_dist {
                    max_dist = dist;
                    pair = (i, j);
                }
            }
        }
        Ok(pair)
    }

    /// Assign every member to the closer promoted object. Neither group is left empty.
    fn partition(
        members: Vec<Member>,
        first: &FeatureVector,
        second: &FeatureVector,
    ) -> Result<(Vec<Member>, Vec<Member>)> {
        let mut group1 = Vec::new();
        let mut group2 = Vec::new();
        for member in members {
            let d1 = distance::euclidean(&member.entry.features, first)?;
            let d2 = distance::euclidean(&member.entry.features, second)?;
            if d1 <= d2 {
                group1.push(member);
            } else {
                group2.push(member);
            }
        }

        if group1.is_empty() {
            group1.extend(group2.pop());
        } else if group2.is_empty() {
            group2.extend(group1.pop());
        }
        Ok((group1, group2))
    }

    /// Build one half of a split around `center_slot` (or the first member if
    /// that entry ended up on the other side). The covering radius is the
    /// largest `d(center, member) + member radius`, a valid bound for every
    /// record below.
    fn build_half(is_leaf: bool, group: Vec<Member>, center_slot: usize) -> Result<SplitHalf> {
        let center = group
            .iter()
            .find(|m| m.slot == center_slot)
            .or_else(|| group.first())
            .map(|m| m.entry.clone())
            .ok_or_else(|| IndexError::InvariantViolation("empty split group".to_string()))?;

        let mut node = MTreeNode {
            is_leaf,
            entries: Vec::with_capacity(group.len()),
            radii: Vec::with_capacity(group.len()),
            children: Vec::new(),
        };
        let mut radius: f32 = 0.0;
        for mut member in group {
            let dist = distance::euclidean(&member.entry.features, &center.features)?;
            member.entry.distance_to_parent = dist;
            radius = radius.max(dist + member.radius);
            node.entries.push(member.entry);
            node.radii.push(member.radius);
            node.children.extend(member.child);
        }

        Ok(SplitHalf {
            routing: MTreeEntry {
                distance_to_parent: 0.0,
                ..center
            },
            radius,
            node,
        })
    }

    /// Promote two routing objects and partition the node's entries around them.
    fn split_node(node: MTreeNode) -> Result<(SplitHalf, SplitHalf)> {
        let (p1, p2) = Self::promote(&node.entries)?;
        let first = node.entries[p1].features.clone();
        let second = node.entries[p2].features.clone();

        let MTreeNode {
            is_leaf,
            entries,
            radii,
            children,
        } = node;
        let mut children = children.into_iter();
        let members = entries
            .into_iter()
            .zip(radii)
            .enumerate()
            .map(|(slot, (entry, radius))| Member {
                slot,
                entry,
                radius,
                child: if is_leaf { None } else { children.next() },
            })
            .collect();

        let (group1, group2) = Self::partition(members, &first, &second)?;
        debug!(
            leaf = is_leaf,
            left = group1.len(),
            right = group2.len(),
            "M-Tree node split"
        );
        Ok((
            Self::build_half(is_leaf, group1, p1)?,
            Self::build_half(is_leaf, group2, p2)?,
        ))
    }

    /// Split `parent.children[index]`, replacing its routing entry with the
    /// first half and appending the second half as a new sibling entry.
    fn split_child(
        parent: &mut MTreeNode,
        index: usize,
        parent_routing: Option<&FeatureVector>,
    ) -> Result<()> {
        if index >= parent.children.len() || parent.children[index].entries.len() < 2 {
            return Ok(());
        }

        let child = std::mem::take(&mut parent.children[index]);
        let (mut first, mut second) = Self::split_node(child)?;
        if let Some(routing) = parent_routing {
            first.routing.distance_to_parent =
                distance::euclidean(&first.routing.features, routing)?;
            second.routing.distance_to_parent =
                distance::euclidean(&second.routing.features, routing)?;
        }

        // routing object, radius and subtree are replaced together
        parent.entries[index] = first.routing;
        parent.radii[index] = first.radius;
        parent.children[index] = first.node;

        parent.entries.push(second.routing);
        parent.radii.push(second.radius);
        parent.children.push(second.node);
        Ok(())
    }

    /// Replace the root with a two-entry internal node over the split halves.
    fn split_root(&mut self) -> Result<()> {
        let Some(root) = self.root.take() else {
            return Ok(());
        };
        if root.entries.len() < 2 {
            self.root = Some(root);
            return Ok(());
        }

        let (first, second) = Self::split_node(root)?;
        self.root = Some(MTreeNode {
            is_leaf: false,
            entries: vec![first.routing, second.routing],
            radii: vec![first.radius, second.radius],
            children: vec![first.node, second.node],
        });
        debug!(height = self.height(), "M-Tree root split");
        Ok(())
    }

    fn search(
        node: &MTreeNode,
        query: &FeatureVector,
        ignore: Option<RecordId>,
        best: &mut BestMatch,
        comparisons: &mut usize,
    ) -> Result<()> {
        if node.is_leaf {
            for entry in node.entries.iter().filter(|e| Some(e.id) != ignore) {
                *comparisons += 1;
                best.offer(entry.id, distance::euclidean(query, &entry.features)?);
            }
            return Ok(());
        }

        let mut candidates = Vec::with_capacity(node.entries.len());
        for (i, (entry, &radius)) in node.entries.iter().zip(&node.radii).enumerate() {
            *comparisons += 1;
            let dist = distance::euclidean(query, &entry.features)?;
            if (dist - radius).max(0.0) < best.bound() {
                candidates.push((dist, i));
            }
        }
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        for (dist, i) in candidates {
            let Some(child) = node.children.get(i) else {
                continue;
            };
            // the bound may have tightened while visiting earlier subtrees
            if (dist - node.radii[i]).max(0.0) < best.bound() {
                Self::search(child, query, ignore, best, comparisons)?;
            }
        }
        Ok(())
    }

    /// Verify the structural invariants: parallel arrays, capacity, covering
    /// radii, parent distances and that every leaf sits at the same depth.
    pub fn check_invariants(&self) -> Result<()> {
        let Some(root) = &self.root else {
            return Ok(());
        };
        let mut leaf_depth = None;
        self.check_node(root, None, 1, &mut leaf_depth)
    }

    fn check_node(
        &self,
        node: &MTreeNode,
        routing: Option<&FeatureVector>,
        depth: usize,
        leaf_depth: &mut Option<usize>,
    ) -> Result<()> {
        let violation = |msg: String| Err(IndexError::InvariantViolation(msg));

        if node.entries.len() != node.radii.len() {
            return violation(format!(
                "{} entries but {} radii",
                node.entries.len(),
                node.radii.len()
            ));
        }
        if node.entries.is_empty() || node.entries.len() > self.capacity {
            return violation(format!("node holds {} entries", node.entries.len()));
        }
        if let Some(parent) = routing {
            for entry in &node.entries {
                let actual = distance::euclidean(&entry.features, parent)?;
                if !within_tolerance(entry.distance_to_parent, actual) {
                    return violation(format!(
                        "entry {} records parent distance {} but is {}",
                        entry.id, entry.distance_to_parent, actual
                    ));
                }
            }
        }

        if node.is_leaf {
            if !node.children.is_empty() || node.radii.iter().any(|&r| r != 0.0) {
                return violation("leaf with children or non-zero radius".to_string());
            }
            let expected = *leaf_depth.get_or_insert(depth);
            if expected != depth {
                return violation(format!("leaf at depth {} but another at {}", depth, expected));
            }
            return Ok(());
        }

        if node.children.len() != node.entries.len() {
            return violation(format!(
                "{} routing entries but {} children",
                node.entries.len(),
                node.children.len()
            ));
        }
        for ((entry, &radius), child) in node.entries.iter().zip(&node.radii).zip(&node.children) {
            let mut covered = Ok(());
            Self::for_each_record(child, &mut |record: &MTreeEntry| {
                let dist = distance::euclidean(&record.features, &entry.features)?;
                if covered.is_ok() && dist > radius && !within_tolerance(dist, radius) {
                    covered = violation(format!(
                        "record {} at {} escapes covering radius {} of routing object {}",
                        record.id, dist, radius, entry.id
                    ));
                }
                Ok(())
            })?;
            covered?;
            self.check_node(child, Some(&entry.features), depth + 1, leaf_depth)?;
        }
        Ok(())
    }

    fn for_each_record(
        node: &MTreeNode,
        f: &mut impl FnMut(&MTreeEntry) -> Result<()>,
    ) -> Result<()> {
        if node.is_leaf {
            return node.entries.iter().try_for_each(|e| f(e));
        }
        node.children
            .iter()
            .try_for_each(|child| Self::for_each_record(child, f))
    }
}

/// Float comparison allowing for rounding in summed distances.
fn within_tolerance(a: f32, b: f32) -> bool {
    (a - b).abs() <= 1e-4 * (1.0 + a.abs().max(b.abs()))
}

impl NearestIndex for MTreeIndex {
    fn name(&self) -> &'static str {
        "mtree"
    }

    fn insert(&mut self, record: ImageRecord) -> Result<()> {
        if self.store.contains(record.id) {
            return Err(IndexError::DuplicateId { id: record.id });
        }
        pin_dimension(&mut self.dimension, &record.features)?;

        let entry = MTreeEntry::from_record(&record);
        match self.root.as_mut() {
            None => {
                let mut root = MTreeNode::leaf();
                root.entries.push(entry);
                root.radii.push(0.0);
                self.root = Some(root);
            }
            Some(root) => {
                Self::insert_into(root, entry, None, self.capacity)?;
                if root.entries.len() > self.capacity {
                    self.split_root()?;
                }
            }
        }

        self.store.insert(record)?;
        Ok(())
    }

    fn find_nearest_counted(
        &self,
        query: &FeatureVector,
        ignore: Option<RecordId>,
        comparisons: &mut usize,
    ) -> Result<Option<Neighbor>> {
        check_query(self.dimension, query)?;

        let Some(root) = &self.root else {
            return Ok(None);
        };
        let mut best = BestMatch::new();
        Self::search(root, query, ignore, &mut best, comparisons)?;
        Ok(best.into_neighbor())
    }

    fn get(&self, id: RecordId) -> Result<&ImageRecord> {
        self.store.get(id)
    }

    fn len(&self) -> usize {
        self.store.len()
    }
}
