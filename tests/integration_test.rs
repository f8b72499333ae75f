//! Integration tests: every index structure behind the shared trait.

use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use similarity_index::benchmark::{build_index, IndexKind};
use similarity_index::{
    FeatureVector, HashIndex, ImageRecord, IndexError, IndexSuiteConfig, LinearIndex,
    MTreeIndex, NearestIndex, OctreeIndex,
};

fn record(id: usize, data: Vec<f32>) -> ImageRecord {
    ImageRecord::new(id, format!("img_{}.jpg", id), FeatureVector::new(data))
}

/// Random records in [0, 1)^dim, which the default octree projection maps
/// inside its [0, 255]^2 region.
fn random_records(n: usize, dim: usize, seed: u64) -> Vec<ImageRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| record(i, (0..dim).map(|_| rng.gen::<f32>()).collect()))
        .collect()
}

fn build(kind: IndexKind, records: &[ImageRecord]) -> Box<dyn NearestIndex> {
    let dimension = records.first().map(|r| r.dimension()).unwrap_or(3);
    let mut index = build_index(kind, &IndexSuiteConfig::default(), dimension).unwrap();
    for r in records {
        index.insert(r.clone()).unwrap();
    }
    index
}

fn scenario_records() -> Vec<ImageRecord> {
    vec![
        record(0, vec![0.0, 0.0, 0.0]),
        record(1, vec![1.0, 0.0, 0.0]),
        record(2, vec![10.0, 10.0, 10.0]),
        record(3, vec![1.0, 1.0, 0.0]),
    ]
}

#[test]
fn test_scenario_linear_and_mtree() {
    let query = FeatureVector::new(vec![0.0, 0.0, 0.0]);

    let mut linear = LinearIndex::new();
    let mut mtree = MTreeIndex::new(2);
    for r in scenario_records() {
        linear.insert(r.clone()).unwrap();
        mtree.insert(r).unwrap();
    }
    mtree.check_invariants().unwrap();

    for index in [&linear as &dyn NearestIndex, &mtree] {
        let nearest = index.find_nearest(&query, Some(0)).unwrap().unwrap();
        assert_eq!(nearest.id, 1, "{}", index.name());
        assert_relative_eq!(nearest.distance, 1.0);
    }
}

#[test]
fn test_scenario_without_ignore_finds_self() {
    let query = FeatureVector::new(vec![0.0, 0.0, 0.0]);
    for kind in [IndexKind::Linear, IndexKind::Hash, IndexKind::MTree, IndexKind::Lsh] {
        let index = build(kind, &scenario_records());
        let nearest = index.find_nearest(&query, None).unwrap().unwrap();
        assert_eq!(nearest.id, 0, "{}", kind);
        assert_eq!(nearest.distance, 0.0);
    }
}

#[test]
fn test_exact_indexes_match_linear() {
    let records = random_records(300, 8, 7);
    let linear = build(IndexKind::Linear, &records);
    let exact = [IndexKind::Hash, IndexKind::Octree, IndexKind::MTree];
    let indexes: Vec<_> = exact.iter().map(|&k| build(k, &records)).collect();

    for query in &records {
        let expected = linear
            .find_nearest(&query.features, Some(query.id))
            .unwrap()
            .unwrap();
        for index in &indexes {
            let got = index
                .find_nearest(&query.features, Some(query.id))
                .unwrap()
                .unwrap();
            assert_relative_eq!(got.distance, expected.distance, epsilon = 1e-5);
        }
    }
}

#[test]
fn test_unseen_queries_match_linear() {
    let records = random_records(250, 6, 11);
    let queries = random_records(40, 6, 12);
    let linear = build(IndexKind::Linear, &records);
    let mtree = build(IndexKind::MTree, &records);
    let hash = build(IndexKind::Hash, &records);

    for query in &queries {
        let expected = linear.find_nearest(&query.features, None).unwrap().unwrap();
        for index in [&mtree, &hash] {
            let got = index.find_nearest(&query.features, None).unwrap().unwrap();
            assert_relative_eq!(got.distance, expected.distance, epsilon = 1e-5);
        }
    }
}

#[test]
fn test_get_and_len_every_kind() {
    let records = random_records(50, 4, 3);
    for kind in IndexKind::ALL {
        let index = build(kind, &records);
        assert_eq!(index.len(), 50, "{}", kind);
        assert!(!index.is_empty());
        for r in &records {
            assert_eq!(index.get(r.id).unwrap(), r, "{}", kind);
        }
        assert!(matches!(
            index.get(999),
            Err(IndexError::RecordNotFound { id: 999 })
        ));
    }
}

#[test]
fn test_empty_and_single_every_kind() {
    let query = FeatureVector::new(vec![0.5, 0.5, 0.5]);
    for kind in IndexKind::ALL {
        let empty = build_index(kind, &IndexSuiteConfig::default(), 3).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.find_nearest(&query, None).unwrap(), None, "{}", kind);

        let single = build(kind, &[record(5, vec![0.5, 0.5, 0.5])]);
        assert_eq!(single.find_nearest(&query, Some(5)).unwrap(), None, "{}", kind);
    }
}

#[test]
fn test_dimension_mismatch_every_kind() {
    let records = random_records(10, 3, 5);
    let short = FeatureVector::new(vec![0.1, 0.2]);
    for kind in IndexKind::ALL {
        let mut index = build(kind, &records);
        assert!(index.find_nearest(&short, None).is_err(), "{}", kind);
        assert!(index.insert(record(100, vec![0.1, 0.2])).is_err(), "{}", kind);
        assert_eq!(index.len(), 10);
    }
}

#[test]
fn test_linear_comparisons_skip_ignored() {
    let records = random_records(20, 3, 9);
    let index = build(IndexKind::Linear, &records);
    let mut comparisons = 0;
    index
        .find_nearest_counted(&records[0].features, Some(0), &mut comparisons)
        .unwrap();
    assert_eq!(comparisons, 19);
}

#[test]
fn test_mtree_prunes_comparisons() {
    let records = random_records(2000, 2, 21);
    let linear = build(IndexKind::Linear, &records);
    let mtree = build(IndexKind::MTree, &records);

    let mut linear_total = 0;
    let mut mtree_total = 0;
    for query in records.iter().take(50) {
        linear
            .find_nearest_counted(&query.features, Some(query.id), &mut linear_total)
            .unwrap();
        mtree
            .find_nearest_counted(&query.features, Some(query.id), &mut mtree_total)
            .unwrap();
    }
    assert!(
        mtree_total < linear_total,
        "mtree {} vs linear {}",
        mtree_total,
        linear_total
    );
}

#[test]
fn test_hash_and_octree_concrete_types() {
    let records = random_records(30, 2, 13);
    let mut hash = HashIndex::with_buckets(7);
    let mut octree = OctreeIndex::new();
    for r in &records {
        hash.insert(r.clone()).unwrap();
        octree.insert(r.clone()).unwrap();
    }
    assert_eq!(hash.bucket_sizes().iter().sum::<usize>(), 30);
    assert_eq!(octree.len(), 30);
    assert!(octree.height() > 1);
}
