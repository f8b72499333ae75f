//! # Similarity Index
//!
//! Nearest-neighbor search over image feature vectors, with five interchangeable
//! index structures behind one [`NearestIndex`] trait:
//!
//! - [`LinearIndex`]: exhaustive scan, the exact reference
//! - [`HashIndex`]: records bucketed by key, still scanned exhaustively
//! - [`OctreeIndex`]: spatial subdivision over a low-dimensional projection
//! - [`LshIndex`]: random-hyperplane hashing, approximate
//! - [`MTreeIndex`]: metric tree with covering radii, exact with pruning
//!
//! ## Example
//!
//! ```rust
//! use similarity_index::{FeatureVector, ImageRecord, MTreeIndex, NearestIndex};
//!
//! let mut index = MTreeIndex::new(4);
//! index.insert(ImageRecord::new(0, "a.jpg", FeatureVector::new(vec![0.0, 0.0]))).unwrap();
//! index.insert(ImageRecord::new(1, "b.jpg", FeatureVector::new(vec![3.0, 4.0]))).unwrap();
//!
//! let query = FeatureVector::new(vec![0.0, 0.0]);
//! let nearest = index.find_nearest(&query, Some(0)).unwrap().unwrap();
//! assert_eq!(nearest.id, 1);
//! assert_eq!(nearest.distance, 5.0);
//! ```

pub mod benchmark;
pub mod config;
pub mod dataset;
pub mod distance;
pub mod error;
pub mod features;
pub mod hash_index;
pub mod index;
pub mod linear_index;
pub mod logging;
pub mod lsh;
pub mod metrics;
pub mod mtree;
pub mod octree;
pub mod record;
pub mod vector;

pub use benchmark::{IndexKind, IndexReport};
pub use config::IndexSuiteConfig;
pub use error::{IndexError, Result};
pub use hash_index::HashIndex;
pub use index::{NearestIndex, Neighbor};
pub use linear_index::LinearIndex;
pub use lsh::{LshConfig, LshIndex};
pub use mtree::{MTreeConfig, MTreeIndex};
pub use octree::{OctreeConfig, OctreeIndex, Projection, Region};
pub use record::{ImageRecord, RecordId, RecordStore};
pub use vector::FeatureVector;
