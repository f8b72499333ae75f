//! Euclidean distance, the single metric every index is built on

use crate::error::{Result, IndexError};
use crate::vector::FeatureVector;

/// Compute the Euclidean (L2) distance between two vectors.
///
/// Fails with `DimensionMismatch` when the lengths differ; vectors are never
/// truncated or padded.
pub fn euclidean(v1: &FeatureVector, v2: &FeatureVector) -> Result<f32> {
    if !v1.has_same_dimension(v2) {
        return Err(IndexError::DimensionMismatch {
            expected: v1.dimension(),
            actual: v2.dimension(),
        });
    }
    Ok(euclidean_unchecked(v1.as_slice(), v2.as_slice()))
}

/// Euclidean distance over two slices the caller has already checked for equal length.
pub fn euclidean_unchecked(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_euclidean_distance() {
        let v1 = FeatureVector::new(vec![1.0, 2.0, 3.0]);
        let v2 = FeatureVector::new(vec![4.0, 5.0, 6.0]);
        let dist = euclidean(&v1, &v2).unwrap();
        assert_relative_eq!(dist, 5.196152, epsilon = 1e-5);
    }

    #[test]
    fn test_euclidean_same_vector() {
        let v = FeatureVector::new(vec![1.0, 2.0, 3.0]);
        assert_eq!(euclidean(&v, &v).unwrap(), 0.0);
    }

    #[test]
    fn test_euclidean_symmetric() {
        let v1 = FeatureVector::new(vec![0.25, -3.0, 7.5]);
        let v2 = FeatureVector::new(vec![1.0, 2.0, -0.5]);
        assert_eq!(euclidean(&v1, &v2).unwrap(), euclidean(&v2, &v1).unwrap());
    }

    #[test]
    fn test_dimension_mismatch() {
        let v1 = FeatureVector::new(vec![1.0, 2.0]);
        let v2 = FeatureVector::new(vec![1.0, 2.0, 3.0]);
        assert!(matches!(
            euclidean(&v1, &v2),
            Err(IndexError::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }
}
