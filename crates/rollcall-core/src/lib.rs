//! rollcall-core: face identity matching and enrollment.
//!
//! Face crops are flattened into unit-norm pixel vectors and classified by
//! 1-nearest-neighbor against every enrolled exemplar, with a distance
//! threshold that rejects unknown faces.

pub mod capture;
pub mod config;
pub mod enroll;
pub mod features;
pub mod frame;
pub mod labels;
pub mod matcher;
pub mod model;
pub mod samples;
pub mod trainer;

pub use capture::{CaptureError, CaptureSource, Detection, DetectorError, FaceDetector};
pub use config::RecognitionConfig;
pub use enroll::{
    EnrollError, EnrollmentCoordinator, EnrollmentResult, Identification, IdentifyError,
};
pub use features::{extract, FeatureError, FeatureVector};
pub use frame::{BoundingBox, FaceImage, Frame, FrameError};
pub use matcher::{MatchError, MatchResult, Matcher, NearestNeighborMatcher};
pub use model::{IdentityModel, ModelStore, PersistenceError};
pub use samples::SampleStore;
pub use trainer::{FaceSample, Trainer, TrainingError};
