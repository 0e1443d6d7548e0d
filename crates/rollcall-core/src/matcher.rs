use crate::features::{self, FeatureError, FeatureVector};
use crate::frame::{FaceImage, FrameError};
use crate::model::IdentityModel;
use serde::Serialize;
use thiserror::Error;

/// Largest possible distance between two unit vectors.
const MAX_UNIT_DISTANCE: f32 = 2.0;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("identity model is not trained; enroll at least one person first")]
    ModelNotTrained,
    #[error("probe has {actual} features, model expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error("invalid probe image: {0}")]
    Frame(#[from] FrameError),
}

/// Outcome of one recognition attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    /// Nearest label, or `None` when the probe is farther than the rejection threshold.
    pub label: Option<String>,
    /// Score in [0, 100], strictly decreasing in `distance`.
    pub confidence: f32,
    /// Euclidean distance to the nearest exemplar.
    pub distance: f32,
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        self.label.is_some()
    }
}

/// Map a nearest-neighbor distance onto a [0, 100] confidence score.
pub fn confidence_from_distance(distance: f32) -> f32 {
    (100.0 * (1.0 - distance / MAX_UNIT_DISTANCE)).clamp(0.0, 100.0)
}

/// Strategy for comparing a probe feature vector against a trained model.
pub trait Matcher {
    fn compare(
        &self,
        probe: &FeatureVector,
        model: &IdentityModel,
    ) -> Result<MatchResult, MatchError>;

    /// Extract features from a face crop, then compare.
    fn match_face(
        &self,
        model: &IdentityModel,
        face: &FaceImage,
    ) -> Result<MatchResult, MatchError> {
        if !model.is_trained() {
            return Err(MatchError::ModelNotTrained);
        }
        let probe = features::extract(face)?;
        self.compare(&probe, model)
    }
}

/// 1-nearest-neighbor matcher with a rejection threshold.
///
/// Always visits every exemplar; on equal distances the earliest exemplar wins.
#[derive(Debug, Clone, Copy)]
pub struct NearestNeighborMatcher {
    pub max_distance: f32,
}

impl NearestNeighborMatcher {
    pub fn new(max_distance: f32) -> Self {
        Self { max_distance }
    }

    /// Confidence a probe must exceed (or reach) to be accepted.
    pub fn min_confidence(&self) -> f32 {
        confidence_from_distance(self.max_distance)
    }
}

impl Matcher for NearestNeighborMatcher {
    fn compare(
        &self,
        probe: &FeatureVector,
        model: &IdentityModel,
    ) -> Result<MatchResult, MatchError> {
        let expected = model.dimension().ok_or(MatchError::ModelNotTrained)?;
        if probe.len() != expected {
            return Err(MatchError::DimensionMismatch {
                expected,
                actual: probe.len(),
            });
        }

        let mut best_dist = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, exemplar) in model.exemplars().iter().enumerate() {
            let dist = probe.euclidean_distance(&exemplar.vector);
            if dist < best_dist {
                best_dist = dist;
                best_idx = Some(i);
            }
        }

        let Some(idx) = best_idx else {
            return Err(MatchError::ModelNotTrained);
        };

        let label = (best_dist <= self.max_distance).then(|| model.exemplars()[idx].label.clone());

        tracing::debug!(
            nearest = %model.exemplars()[idx].label,
            distance = best_dist,
            accepted = label.is_some(),
            "1-NN comparison"
        );

        Ok(MatchResult {
            label,
            confidence: confidence_from_distance(best_dist),
            distance: best_dist,
        })
    }
}
