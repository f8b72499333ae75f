//! Side-by-side comparison of the index structures.
//!
//! Every record is used as a leave-one-out query: its nearest neighbor is
//! searched with its own id ignored. Answers are checked against the linear
//! scan, which is exact by construction.

use std::fmt;
use std::time::{Duration, Instant};

use clap::ValueEnum;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::IndexSuiteConfig;
use crate::error::{IndexError, Result};
use crate::hash_index::HashIndex;
use crate::index::{NearestIndex, Neighbor};
use crate::linear_index::LinearIndex;
use crate::lsh::{LshConfig, LshIndex};
use crate::metrics::MetricsCollector;
use crate::mtree::MTreeIndex;
use crate::octree::OctreeIndex;
use crate::record::ImageRecord;

/// Relative tolerance when comparing a distance against the linear scan.
pub const DISTANCE_TOLERANCE: f32 = 1e-5;

/// The available index structures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Linear,
    Hash,
    Octree,
    Lsh,
    #[value(name = "mtree")]
    MTree,
}

impl IndexKind {
    pub const ALL: [IndexKind; 5] = [
        IndexKind::Linear,
        IndexKind::Hash,
        IndexKind::Octree,
        IndexKind::Lsh,
        IndexKind::MTree,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Linear => "linear",
            IndexKind::Hash => "hash",
            IndexKind::Octree => "octree",
            IndexKind::Lsh => "lsh",
            IndexKind::MTree => "mtree",
        }
    }

    /// Whether this structure always returns the exact nearest neighbor.
    /// The octree is exact only over the records its region accepted.
    pub fn is_exact(&self) -> bool {
        matches!(self, IndexKind::Linear | IndexKind::Hash | IndexKind::MTree)
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Create an empty index of the given kind. `dimension` overrides the
/// configured LSH dimension.
pub fn build_index(
    kind: IndexKind,
    config: &IndexSuiteConfig,
    dimension: usize,
) -> Result<Box<dyn NearestIndex>> {
    let index: Box<dyn NearestIndex> = match kind {
        IndexKind::Linear => Box::new(LinearIndex::new()),
        IndexKind::Hash => Box::new(HashIndex::with_buckets(config.hash_buckets)),
        IndexKind::Octree => Box::new(OctreeIndex::with_config(config.octree.clone())?),
        IndexKind::Lsh => Box::new(LshIndex::new(LshConfig {
            dimension,
            ..config.lsh.clone()
        })?),
        IndexKind::MTree => Box::new(MTreeIndex::with_config(config.mtree.clone())),
    };
    Ok(index)
}

/// Exact leave-one-out answers for `queries`, computed in parallel.
pub fn linear_answers(
    oracle: &LinearIndex,
    queries: &[ImageRecord],
) -> Result<Vec<Option<Neighbor>>> {
    queries
        .par_iter()
        .map(|query| oracle.find_nearest(&query.features, Some(query.id)))
        .collect()
}

/// Two answers agree when both are empty or their distances match within
/// [`DISTANCE_TOLERANCE`]. Ids may differ between equidistant records.
pub fn answers_agree(actual: Option<Neighbor>, expected: Option<Neighbor>) -> bool {
    match (actual, expected) {
        (None, None) => true,
        (Some(a), Some(b)) => {
            (a.distance - b.distance).abs()
                <= DISTANCE_TOLERANCE * (1.0 + a.distance.max(b.distance))
        }
        _ => false,
    }
}

/// Results for one index structure.
#[derive(Debug, Clone)]
pub struct IndexReport {
    pub kind: IndexKind,
    /// Records the index actually holds after the build.
    pub indexed: usize,
    pub build_time: Duration,
    pub metrics: MetricsCollector,
    /// Queries whose answer matched the linear scan.
    pub agreeing: usize,
}

impl IndexReport {
    /// Fraction of queries matching the linear scan.
    pub fn agreement(&self) -> f64 {
        let total = self.metrics.total_queries();
        if total == 0 {
            return 1.0;
        }
        self.agreeing as f64 / total as f64
    }
}

/// Build each requested index over `records` and run up to `max_queries`
/// leave-one-out queries against it.
pub fn compare(
    records: &[ImageRecord],
    kinds: &[IndexKind],
    config: &IndexSuiteConfig,
    max_queries: Option<usize>,
) -> Result<Vec<IndexReport>> {
    let first = records.first().ok_or_else(|| {
        IndexError::InvalidConfig("cannot compare indexes over an empty record set".to_string())
    })?;
    let dimension = first.dimension();
    let query_count = max_queries.unwrap_or(records.len()).min(records.len());
    let queries = &records[..query_count];

    let mut oracle = LinearIndex::new();
    for record in records {
        oracle.insert(record.clone())?;
    }
    let expected = linear_answers(&oracle, queries)?;
    debug!(queries = query_count, "computed exact answers");

    let mut reports = Vec::with_capacity(kinds.len());
    for &kind in kinds {
        let report = run_one(kind, records, queries, &expected, config, dimension)?;
        info!(
            index = %kind,
            indexed = report.indexed,
            build_ms = report.build_time.as_secs_f64() * 1e3,
            avg_comparisons = report.metrics.avg_comparisons(),
            agreement = report.agreement(),
            "index compared"
        );
        reports.push(report);
    }
    Ok(reports)
}

fn run_one(
    kind: IndexKind,
    records: &[ImageRecord],
    queries: &[ImageRecord],
    expected: &[Option<Neighbor>],
    config: &IndexSuiteConfig,
    dimension: usize,
) -> Result<IndexReport> {
    let mut metrics = MetricsCollector::new();
    let mut index = build_index(kind, config, dimension)?;

    let start = Instant::now();
    for record in records {
        index.insert(record.clone())?;
        metrics.record_insert();
    }
    let build_time = start.elapsed();

    let mut agreeing = 0;
    for (query, want) in queries.iter().zip(expected) {
        let mut comparisons = 0;
        let start = Instant::now();
        let got = index.find_nearest_counted(&query.features, Some(query.id), &mut comparisons)?;
        metrics.record_query(start.elapsed(), comparisons, got.is_some());

        if answers_agree(got, *want) {
            agreeing += 1;
        }
    }

    Ok(IndexReport {
        kind,
        indexed: index.len(),
        build_time,
        metrics,
        agreeing,
    })
}
