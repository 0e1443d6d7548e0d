//! Identity model and its on-disk store.
//!
//! The model is a 1-nearest-neighbor classifier: it memorizes every
//! (feature vector, label) exemplar it was trained on. The store persists it
//! as a single JSON blob guarded by a SHA-256 checksum.

use crate::features::FeatureVector;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;

const MODEL_FORMAT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("model file I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("model file is corrupt: {0}")]
    Corrupt(String),
    #[error("model checksum mismatch: expected {expected}, computed {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("unsupported model format version {0}")]
    UnsupportedVersion(u32),
}

/// One memorized training point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exemplar {
    pub label: String,
    pub vector: FeatureVector,
}

/// Trained classifier state. Immutable once built; retraining produces a new model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentityModel {
    exemplars: Vec<Exemplar>,
    trained_at: Option<DateTime<Utc>>,
}

impl IdentityModel {
    /// An untrained model with no exemplars.
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn from_exemplars(exemplars: Vec<Exemplar>, trained_at: DateTime<Utc>) -> Self {
        Self {
            exemplars,
            trained_at: Some(trained_at),
        }
    }

    /// True iff the model holds at least one labeled exemplar.
    pub fn is_trained(&self) -> bool {
        !self.exemplars.is_empty()
    }

    pub fn exemplars(&self) -> &[Exemplar] {
        &self.exemplars
    }

    /// Distinct labels in first-seen order.
    pub fn labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = Vec::new();
        for ex in &self.exemplars {
            if !labels.contains(&ex.label.as_str()) {
                labels.push(&ex.label);
            }
        }
        labels
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.exemplars.iter().any(|ex| ex.label == label)
    }

    /// Feature dimension shared by every exemplar, if trained.
    pub fn dimension(&self) -> Option<usize> {
        self.exemplars.first().map(|ex| ex.vector.len())
    }

    pub fn trained_at(&self) -> Option<DateTime<Utc>> {
        self.trained_at
    }
}

/// Serialized form of the model blob.
#[derive(Serialize, Deserialize)]
struct ModelBlob {
    format_version: u32,
    trained_at: Option<DateTime<Utc>>,
    dimension: usize,
    checksum: String,
    exemplars: Vec<Exemplar>,
}

/// File-backed persistence for [`IdentityModel`].
#[derive(Debug, Clone)]
pub struct ModelStore {
    path: PathBuf,
}

impl ModelStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted model.
    ///
    /// A missing file is the valid "untrained" state and returns `Ok(None)`.
    pub fn load(&self) -> Result<Option<IdentityModel>, PersistenceError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(PersistenceError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let blob: ModelBlob =
            serde_json::from_slice(&bytes).map_err(|e| PersistenceError::Corrupt(e.to_string()))?;

        if blob.format_version != MODEL_FORMAT_VERSION {
            return Err(PersistenceError::UnsupportedVersion(blob.format_version));
        }

        let actual = checksum(&blob.exemplars)?;
        if actual != blob.checksum {
            return Err(PersistenceError::ChecksumMismatch {
                expected: blob.checksum,
                actual,
            });
        }

        if blob.exemplars.iter().any(|ex| ex.vector.len() != blob.dimension) {
            return Err(PersistenceError::Corrupt(format!(
                "exemplar dimension differs from declared {}",
                blob.dimension
            )));
        }

        tracing::debug!(
            path = %self.path.display(),
            exemplars = blob.exemplars.len(),
            dimension = blob.dimension,
            "model blob loaded"
        );

        Ok(Some(IdentityModel {
            exemplars: blob.exemplars,
            trained_at: blob.trained_at,
        }))
    }

    /// Persist the model atomically: write a sibling temp file, then rename
    /// it over the target.
    pub fn save(&self, model: &IdentityModel) -> Result<(), PersistenceError> {
        let blob = ModelBlob {
            format_version: MODEL_FORMAT_VERSION,
            trained_at: model.trained_at,
            dimension: model.dimension().unwrap_or(0),
            checksum: checksum(&model.exemplars)?,
            exemplars: model.exemplars.clone(),
        };
        let bytes =
            serde_json::to_vec(&blob).map_err(|e| PersistenceError::Corrupt(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, &bytes).map_err(|source| PersistenceError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| self.io_error(source))?;

        tracing::info!(
            path = %self.path.display(),
            exemplars = model.exemplars.len(),
            labels = model.labels().len(),
            "model saved"
        );
        Ok(())
    }

    /// Delete the persisted blob. Missing files are not an error.
    pub fn clear(&self) -> Result<(), PersistenceError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(self.io_error(source)),
        }
    }

    fn io_error(&self, source: std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

fn checksum(exemplars: &[Exemplar]) -> Result<String, PersistenceError> {
    let bytes =
        serde_json::to_vec(exemplars).map_err(|e| PersistenceError::Corrupt(e.to_string()))?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}
