use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for matching and enrollment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Side length every crop is resized to before storage and matching.
    pub face_size: u32,
    /// Rejection threshold: largest accepted nearest-neighbor distance.
    pub max_distance: f32,
    /// Valid crops required for one enrollment.
    pub min_samples: usize,
    /// Frames read at most per enrollment capture.
    pub max_capture_frames: usize,
    /// Wall-clock bound on one enrollment capture.
    pub capture_timeout_secs: u64,
    /// Crops darker than this fraction of pixels are rejected.
    pub dark_threshold: f32,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            face_size: 100,
            max_distance: 0.30,
            min_samples: 5,
            max_capture_frames: 150,
            capture_timeout_secs: 30,
            dark_threshold: 0.95,
        }
    }
}

impl RecognitionConfig {
    pub fn capture_timeout(&self) -> Duration {
        Duration::from_secs(self.capture_timeout_secs)
    }
}
