//! Random-hyperplane LSH index.
//!
//! L tables, each defined by K random hyperplanes. A vector's code in a table
//! has bit i set when its dot product with hyperplane i is non-negative. A
//! query only compares against records that share a code with it in at least
//! one table, so recall is probabilistic: more tables raise it, more bits per
//! table make buckets smaller and more selective.

use std::collections::{HashMap, HashSet};

use ndarray::{Array2, ArrayView1};
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::distance;
use crate::error::{Result, IndexError};
use crate::index::{BestMatch, NearestIndex, Neighbor};
use crate::record::{ImageRecord, RecordId, RecordStore};
use crate::vector::FeatureVector;

/// Configuration parameters for the LSH index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LshConfig {
    /// Feature dimension D.
    pub dimension: usize,
    /// Number of hash tables (L).
    pub num_tables: usize,
    /// Hyperplanes per table (K), at most 64.
    pub num_bits: usize,
    /// Seed for hyperplane generation. Fixed for reproducibility only.
    pub seed: u64,
}

impl Default for LshConfig {
    fn default() -> Self {
        Self {
            dimension: 64,
            num_tables: 5,
            num_bits: 10,
            seed: 42,
        }
    }
}

impl LshConfig {
    pub fn new(dimension: usize, num_tables: usize, num_bits: usize) -> Self {
        Self {
            dimension,
            num_tables,
            num_bits,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(IndexError::InvalidConfig(
                "LSH dimension must be greater than 0".to_string(),
            ));
        }
        if self.num_tables == 0 {
            return Err(IndexError::InvalidConfig(
                "LSH needs at least one table".to_string(),
            ));
        }
        if !(1..=64).contains(&self.num_bits) {
            return Err(IndexError::InvalidConfig(format!(
                "LSH bits per table must be in 1..=64, got {}",
                self.num_bits
            )));
        }
        Ok(())
    }
}

/// Locality-sensitive hashing index over random hyperplanes.
#[derive(Debug)]
pub struct LshIndex {
    config: LshConfig,
    /// One (K x D) hyperplane matrix per table.
    planes: Vec<Array2<f32>>,
    /// Per table: hash code -> positions in `store`.
    tables: Vec<HashMap<u64, Vec<usize>>>,
    store: RecordStore,
}

impl LshIndex {
    /// Build the hyperplane tables. The index is a pure function of `config`.
    pub fn new(config: LshConfig) -> Result<Self> {
        config.validate()?;

        let mut rng = StdRng::seed_from_u64(config.seed);
        let planes = (0..config.num_tables)
            .map(|_| {
                Array2::random_using((config.num_bits, config.dimension), StandardNormal, &mut rng)
            })
            .collect();
        debug!(
            tables = config.num_tables,
            bits = config.num_bits,
            dimension = config.dimension,
            seed = config.seed,
            "LSH hyperplanes generated"
        );

        Ok(Self {
            tables: vec![HashMap::new(); config.num_tables],
            planes,
            config,
            store: RecordStore::new(),
        })
    }

    pub fn config(&self) -> &LshConfig {
        &self.config
    }

    /// K-bit code of `vector` in table `table`, as an integer in [0, 2^K).
    pub fn compute_hash(&self, vector: &FeatureVector, table: usize) -> Result<u64> {
        vector.ensure_dimension(self.config.dimension)?;
        let planes = self.planes.get(table).ok_or_else(|| {
            IndexError::InvalidConfig(format!(
                "table {} out of range for {} tables",
                table, self.config.num_tables
            ))
        })?;

        let projections = planes.dot(&ArrayView1::from(vector.as_slice()));
        Ok(projections
            .iter()
            .enumerate()
            .filter(|(_, &p)| p >= 0.0)
            .fold(0u64, |code, (bit, _)| code | (1u64 << bit)))
    }

    fn hashes(&self, vector: &FeatureVector) -> Result<Vec<u64>> {
        (0..self.config.num_tables)
            .map(|table| self.compute_hash(vector, table))
            .collect()
    }

    /// Store positions sharing a bucket with `query` in any table, first-seen order.
    fn candidates(&self, query: &FeatureVector) -> Result<Vec<usize>> {
        let mut visited = HashSet::new();
        let mut candidates = Vec::new();
        for (table, code) in self.tables.iter().zip(self.hashes(query)?) {
            if let Some(bucket) = table.get(&code) {
                for &position in bucket {
                    if visited.insert(position) {
                        candidates.push(position);
                    }
                }
            }
        }
        Ok(candidates)
    }

    /// Number of distinct records the query would be compared against.
    pub fn candidate_count(&self, query: &FeatureVector) -> Result<usize> {
        Ok(self.candidates(query)?.len())
    }
}

impl NearestIndex for LshIndex {
    fn name(&self) -> &'static str {
        "lsh"
    }

    fn insert(&mut self, record: ImageRecord) -> Result<()> {
        let codes = self.hashes(&record.features)?;
        let position = self.store.insert(record)?;
        for (table, code) in self.tables.iter_mut().zip(codes) {
            table.entry(code).or_default().push(position);
        }
        Ok(())
    }

    fn find_nearest_counted(
        &self,
        query: &FeatureVector,
        ignore: Option<RecordId>,
        comparisons: &mut usize,
    ) -> Result<Option<Neighbor>> {
        let mut best = BestMatch::new();
        for position in self.candidates(query)? {
            let Some(record) = self.store.get_at(position) else {
                continue;
            };
            if Some(record.id) == ignore {
                continue;
            }
            *comparisons += 1;
            best.offer(record.id, distance::euclidean(query, &record.features)?);
        }
        Ok(best.into_neighbor())
    }

    fn get(&self, id: RecordId) -> Result<&ImageRecord> {
        self.store.get(id)
    }

    fn len(&self) -> usize {
        self.store.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: RecordId, data: Vec<f32>) -> ImageRecord {
        ImageRecord::new(id, format!("r{}", id), FeatureVector::new(data))
    }

    fn spread_vector(i: usize, dim: usize) -> Vec<f32> {
        (0..dim)
            .map(|d| (((i * 31 + d * 17) % 23) as f32 - 11.0) / 7.0)
            .collect()
    }

    #[test]
    fn test_config_validation() {
        assert!(LshIndex::new(LshConfig::new(0, 5, 10)).is_err());
        assert!(LshIndex::new(LshConfig::new(8, 0, 10)).is_err());
        assert!(LshIndex::new(LshConfig::new(8, 5, 0)).is_err());
        assert!(LshIndex::new(LshConfig::new(8, 5, 65)).is_err());
        assert!(LshIndex::new(LshConfig::new(8, 5, 64)).is_ok());
    }

    #[test]
    fn test_hash_range_and_determinism() {
        let a = LshIndex::new(LshConfig::new(16, 3, 6)).unwrap();
        let b = LshIndex::new(LshConfig::new(16, 3, 6)).unwrap();
        let v = FeatureVector::new(spread_vector(3, 16));
        for table in 0..3 {
            let code = a.compute_hash(&v, table).unwrap();
            assert!(code < 1 << 6);
            assert_eq!(code, b.compute_hash(&v, table).unwrap());
        }
        assert!(a.compute_hash(&v, 3).is_err());
    }

    #[test]
    fn test_zero_vector_sets_every_bit() {
        let index = LshIndex::new(LshConfig::new(4, 1, 8)).unwrap();
        let zero = FeatureVector::new(vec![0.0; 4]);
        assert_eq!(index.compute_hash(&zero, 0).unwrap(), 0xFF);
    }

    #[test]
    fn test_self_query_finds_itself() {
        let mut index = LshIndex::new(LshConfig::new(12, 4, 8)).unwrap();
        for i in 0..50 {
            index.insert(record(i, spread_vector(i, 12))).unwrap();
        }
        for i in 0..50 {
            let query = index.get(i).unwrap().features.clone();
            let hit = index.find_nearest(&query, None).unwrap().unwrap();
            assert_eq!(hit.distance, 0.0);
        }
    }

    #[test]
    fn test_comparisons_bounded_by_candidates() {
        let mut index = LshIndex::new(LshConfig::new(12, 2, 12)).unwrap();
        for i in 0..100 {
            index.insert(record(i, spread_vector(i, 12))).unwrap();
        }
        let query = FeatureVector::new(spread_vector(7, 12));
        let mut comparisons = 0;
        index
            .find_nearest_counted(&query, None, &mut comparisons)
            .unwrap();
        assert_eq!(comparisons, index.candidate_count(&query).unwrap());
        assert!(comparisons <= index.len());
    }

    #[test]
    fn test_miss_in_every_table_is_not_found() {
        let mut index = LshIndex::new(LshConfig::new(2, 1, 1)).unwrap();
        let plane = index.planes[0].row(0).to_owned();
        // one record strictly on each side of the single hyperplane
        let positive = FeatureVector::new(vec![plane[0], plane[1]]);
        let negative = FeatureVector::new(vec![-plane[0], -plane[1]]);
        index
            .insert(ImageRecord::new(0, "pos", positive.clone()))
            .unwrap();

        assert!(index.find_nearest(&negative, None).unwrap().is_none());
        assert_eq!(index.find_nearest(&positive, None).unwrap().unwrap().id, 0);
    }

    #[test]
    fn test_duplicate_and_dimension_errors() {
        let mut index = LshIndex::new(LshConfig::new(3, 2, 4)).unwrap();
        index.insert(record(0, vec![1.0, 2.0, 3.0])).unwrap();
        assert!(matches!(
            index.insert(record(0, vec![1.0, 2.0, 3.0])),
            Err(IndexError::DuplicateId { id: 0 })
        ));
        assert!(matches!(
            index.insert(record(1, vec![1.0, 2.0])),
            Err(IndexError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            index.find_nearest(&FeatureVector::new(vec![1.0]), None),
            Err(IndexError::DimensionMismatch { .. })
        ));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_ignore_self() {
        let mut index = LshIndex::new(LshConfig::new(3, 4, 2)).unwrap();
        index.insert(record(0, vec![1.0, 1.0, 1.0])).unwrap();
        // a positive multiple has the same sign against every hyperplane
        index.insert(record(1, vec![2.0, 2.0, 2.0])).unwrap();
        let query = FeatureVector::new(vec![1.0, 1.0, 1.0]);
        for table in 0..4 {
            assert_eq!(
                index.compute_hash(&query, table).unwrap(),
                index.compute_hash(&FeatureVector::new(vec![2.0, 2.0, 2.0]), table).unwrap()
            );
        }
        let hit = index.find_nearest(&query, Some(0)).unwrap().unwrap();
        assert_eq!(hit.id, 1);
        assert!((hit.distance - 3.0f32.sqrt()).abs() < 1e-6);
    }
}
