//! Feature vector type

use crate::error::{Result, IndexError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A fixed-length feature vector, e.g. a normalized color histogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector {
    data: Vec<f32>,
}

impl FeatureVector {
    /// Create a new feature vector from a Vec<f32>
    pub fn new(data: Vec<f32>) -> Self {
        Self { data }
    }

    /// Get the dimension of the vector
    pub fn dimension(&self) -> usize {
        self.data.len()
    }

    /// Get the underlying data as a slice
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Check if this vector has the same dimension as another
    pub fn has_same_dimension(&self, other: &FeatureVector) -> bool {
        self.dimension() == other.dimension()
    }

    /// Fail with `DimensionMismatch` unless this vector has `expected` components.
    pub fn ensure_dimension(&self, expected: usize) -> Result<()> {
        if self.dimension() != expected {
            return Err(IndexError::DimensionMismatch {
                expected,
                actual: self.dimension(),
            });
        }
        Ok(())
    }
}

impl From<Vec<f32>> for FeatureVector {
    fn from(data: Vec<f32>) -> Self {
        Self::new(data)
    }
}

impl FromStr for FeatureVector {
    type Err = IndexError;

    /// Parse a vector from a comma-separated string
    fn from_str(s: &str) -> Result<Self> {
        let data = s
            .split(',')
            .map(|x| {
                let value = x.trim().parse::<f32>().map_err(|_| IndexError::InvalidVector {
                    reason: format!("Invalid float: {}", x),
                })?;
                if !value.is_finite() {
                    return Err(IndexError::InvalidVector {
                        reason: format!("Non-finite component: {}", x),
                    });
                }
                Ok(value)
            })
            .collect::<Result<Vec<f32>>>()?;
        Ok(FeatureVector::new(data))
    }
}
