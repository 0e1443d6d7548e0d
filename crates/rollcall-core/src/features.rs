//! Pixel feature extraction.
//!
//! A face crop is flattened row-major and L2-normalized, so every feature
//! vector lies on the unit sphere and Euclidean distance ranks candidates the
//! same way cosine similarity would.

use crate::frame::FaceImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("degenerate input: image has no non-zero pixels")]
    Degenerate,
}

/// Unit-norm feature vector derived from a face crop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector {
    values: Vec<f32>,
}

impl FeatureVector {
    /// Normalize raw values to unit length.
    ///
    /// An all-zero input has no direction and fails with [`FeatureError::Degenerate`].
    pub fn from_raw(raw: Vec<f32>) -> Result<Self, FeatureError> {
        let norm = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm <= 0.0 || !norm.is_finite() {
            return Err(FeatureError::Degenerate);
        }
        Ok(Self {
            values: raw.into_iter().map(|x| x / norm).collect(),
        })
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn norm(&self) -> f32 {
        self.values.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    /// Euclidean distance. Callers must compare vectors of equal length.
    pub fn euclidean_distance(&self, other: &FeatureVector) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// Flatten a grayscale crop and divide by its L2 norm.
pub fn extract(face: &FaceImage) -> Result<FeatureVector, FeatureError> {
    FeatureVector::from_raw(face.pixels().iter().map(|&p| p as f32).collect())
}
