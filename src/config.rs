//! Configuration for building the full suite of indexes

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dataset;
use crate::error::Result;
use crate::hash_index::DEFAULT_BUCKETS;
use crate::lsh::LshConfig;
use crate::mtree::MTreeConfig;
use crate::octree::OctreeConfig;

/// Parameters for every index structure, loadable from a JSON file.
///
/// ```json
/// { "hash_buckets": 101, "lsh": { "num_tables": 8, "num_bits": 6 }, "mtree": { "capacity": 16 } }
/// ```
///
/// Missing fields fall back to their defaults. The LSH dimension is replaced
/// by the dimension of the records actually indexed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSuiteConfig {
    pub hash_buckets: usize,
    pub octree: OctreeConfig,
    pub lsh: LshConfig,
    pub mtree: MTreeConfig,
}

impl Default for IndexSuiteConfig {
    fn default() -> Self {
        Self {
            hash_buckets: DEFAULT_BUCKETS,
            octree: OctreeConfig::default(),
            lsh: LshConfig::default(),
            mtree: MTreeConfig::default(),
        }
    }
}

impl IndexSuiteConfig {
    /// Load a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let config: Self = dataset::from_json(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.octree.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: IndexSuiteConfig =
            dataset::from_json(br#"{ "lsh": { "num_tables": 8 }, "mtree": { "capacity": 16 } }"#)
                .unwrap();
        assert_eq!(config.hash_buckets, DEFAULT_BUCKETS);
        assert_eq!(config.lsh.num_tables, 8);
        assert_eq!(config.lsh.num_bits, 10);
        assert_eq!(config.lsh.seed, 42);
        assert_eq!(config.mtree.capacity, 16);
        assert_eq!(config.octree.capacity, 4);
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "hash_buckets": 7 }}"#).unwrap();
        let config = IndexSuiteConfig::from_file(file.path()).unwrap();
        assert_eq!(config.hash_buckets, 7);
    }

    #[test]
    fn test_invalid_octree_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "octree": {{ "region": {{ "min": [0, 0, 0], "max": [255, 255, 255] }} }} }}"#
        )
        .unwrap();
        // three region axes against the default two-axis projection
        assert!(IndexSuiteConfig::from_file(file.path()).is_err());
    }
}
