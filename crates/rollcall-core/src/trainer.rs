//! Builds identity models from labeled face samples.
//!
//! Training is additive: [`Trainer::train_onto`] keeps every exemplar of the
//! base model and appends the new ones, so the resulting label set is always a
//! superset of the base model's.

use crate::features::{self, FeatureError};
use crate::frame::FaceImage;
use crate::model::{Exemplar, IdentityModel, ModelStore, PersistenceError};
use chrono::Utc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrainingError {
    #[error("no usable training samples")]
    NoSamples,
    #[error("sample for '{label}' has {actual} features, model expects {expected}")]
    DimensionMismatch {
        label: String,
        expected: usize,
        actual: usize,
    },
    #[error("failed to persist trained model: {0}")]
    Persistence(#[from] PersistenceError),
}

/// A grayscale face crop attributed to an identity label.
#[derive(Debug, Clone)]
pub struct FaceSample {
    pub label: String,
    pub image: FaceImage,
}

impl FaceSample {
    pub fn new(label: impl Into<String>, image: FaceImage) -> Self {
        Self {
            label: label.into(),
            image,
        }
    }
}

/// Trains 1-NN identity models and persists them through a [`ModelStore`].
pub struct Trainer {
    store: ModelStore,
}

impl Trainer {
    pub fn new(store: ModelStore) -> Self {
        Self { store }
    }

    /// Train a fresh model on `samples` alone.
    pub fn train(&self, samples: &[FaceSample]) -> Result<IdentityModel, TrainingError> {
        self.train_onto(&IdentityModel::empty(), samples)
    }

    /// Train a model holding every exemplar of `base` followed by `samples`.
    ///
    /// Degenerate (all-zero) samples are skipped. The new model is built fully
    /// in memory and saved before it is returned; `base` is never touched.
    pub fn train_onto(
        &self,
        base: &IdentityModel,
        samples: &[FaceSample],
    ) -> Result<IdentityModel, TrainingError> {
        let mut expected = base.dimension();
        let mut fresh = Vec::with_capacity(samples.len());

        for sample in samples {
            let vector = match features::extract(&sample.image) {
                Ok(v) => v,
                Err(FeatureError::Degenerate) => {
                    tracing::warn!(label = %sample.label, "skipping degenerate training sample");
                    continue;
                }
            };

            let dim = *expected.get_or_insert(vector.len());
            if vector.len() != dim {
                return Err(TrainingError::DimensionMismatch {
                    label: sample.label.clone(),
                    expected: dim,
                    actual: vector.len(),
                });
            }

            fresh.push(Exemplar {
                label: sample.label.clone(),
                vector,
            });
        }

        if fresh.is_empty() {
            return Err(TrainingError::NoSamples);
        }

        let added = fresh.len();
        let mut exemplars = base.exemplars().to_vec();
        exemplars.extend(fresh);
        let model = IdentityModel::from_exemplars(exemplars, Utc::now());

        self.store.save(&model)?;

        tracing::info!(
            added,
            skipped = samples.len() - added,
            exemplars = model.exemplars().len(),
            labels = model.labels().len(),
            "training complete"
        );

        Ok(model)
    }
}
