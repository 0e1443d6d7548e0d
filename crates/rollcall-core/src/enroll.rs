//! Enrollment coordinator: the single owner of the live identity model.
//!
//! Readers take an `Arc` snapshot of the current model and match against it
//! without holding any lock. Writers (enroll, rebuild, remove) are serialized,
//! build the replacement model fully in memory, persist it, then swap the
//! `Arc`. An in-flight match therefore sees either the old or the new model.

use crate::capture::{CaptureError, CaptureSession, CaptureSource, DetectorError, FaceDetector};
use crate::config::RecognitionConfig;
use crate::frame::{BoundingBox, FaceImage};
use crate::labels::{self, LabelError};
use crate::matcher::{MatchError, MatchResult, Matcher, NearestNeighborMatcher};
use crate::model::{IdentityModel, ModelStore, PersistenceError};
use crate::samples::{SampleStore, SampleStoreError};
use crate::trainer::{FaceSample, Trainer, TrainingError};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("captured {captured} usable face samples, {required} required")]
    InsufficientSamples { captured: usize, required: usize },
    #[error("invalid label: {0}")]
    InvalidLabel(#[from] LabelError),
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error("sample store error: {0}")]
    Samples(#[from] SampleStoreError),
    #[error("training error: {0}")]
    Training(#[from] TrainingError),
    #[error("model store error: {0}")]
    Persistence(#[from] PersistenceError),
}

#[derive(Error, Debug)]
pub enum IdentifyError {
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Detector(#[from] DetectorError),
}

/// Summary of a successful enrollment or rebuild.
#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentResult {
    pub label: Option<String>,
    pub samples_added: usize,
    pub frames_read: usize,
    pub exemplars: usize,
    pub labels: Vec<String>,
}

impl EnrollmentResult {
    fn new(
        label: Option<&str>,
        samples_added: usize,
        frames_read: usize,
        model: &IdentityModel,
    ) -> Self {
        Self {
            label: label.map(str::to_string),
            samples_added,
            frames_read,
            exemplars: model.exemplars().len(),
            labels: model.labels().into_iter().map(str::to_string).collect(),
        }
    }
}

/// Outcome of a live identification run.
#[derive(Debug, Clone, Serialize)]
pub struct Identification {
    /// Accepted label, or `None` when the capture bound was reached first.
    pub label: Option<String>,
    /// The accepted match, or the closest rejected one. `None` if no usable
    /// face was seen.
    pub best: Option<MatchResult>,
    /// Where the face behind `best` was found.
    pub bbox: Option<BoundingBox>,
    pub frames_read: usize,
    pub faces_seen: usize,
}

/// Frame and wall-clock bounds shared by every capture loop.
struct CaptureBudget {
    deadline: Option<Instant>,
    max_frames: usize,
    frames_read: usize,
}

impl CaptureBudget {
    fn new(config: &RecognitionConfig) -> Self {
        // A timeout too large to represent means no deadline at all.
        Self {
            deadline: Instant::now().checked_add(config.capture_timeout()),
            max_frames: config.max_capture_frames,
            frames_read: 0,
        }
    }

    fn exhausted(&self) -> bool {
        if self.frames_read >= self.max_frames {
            return true;
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            tracing::warn!(frames_read = self.frames_read, "capture timed out");
            return true;
        }
        false
    }
}

pub struct EnrollmentCoordinator {
    config: RecognitionConfig,
    store: ModelStore,
    trainer: Trainer,
    samples: SampleStore,
    matcher: NearestNeighborMatcher,
    model: RwLock<Arc<IdentityModel>>,
    writer: Mutex<()>,
}

impl EnrollmentCoordinator {
    /// Load the persisted model.
    ///
    /// When the blob is missing, unreadable, or was built for a different face
    /// size, the model is rebuilt from the sample store. With no stored samples
    /// (or a failed rebuild) the coordinator starts untrained.
    pub fn open(config: RecognitionConfig, store: ModelStore, samples: SampleStore) -> Self {
        let expected_dim = (config.face_size as usize).pow(2);
        let model = match store.load() {
            Ok(Some(model)) if model.dimension().is_some_and(|d| d != expected_dim) => {
                tracing::warn!(
                    path = %store.path().display(),
                    dimension = ?model.dimension(),
                    expected = expected_dim,
                    "model was trained for a different face size"
                );
                None
            }
            Ok(Some(model)) => {
                tracing::info!(
                    path = %store.path().display(),
                    exemplars = model.exemplars().len(),
                    labels = model.labels().len(),
                    "identity model loaded"
                );
                Some(model)
            }
            Ok(None) => {
                tracing::info!(path = %store.path().display(), "no identity model yet");
                None
            }
            Err(e) => {
                tracing::warn!(
                    path = %store.path().display(),
                    error = %e,
                    "identity model unusable"
                );
                None
            }
        };

        let loaded = model.is_some();
        let coordinator = Self {
            matcher: NearestNeighborMatcher::new(config.max_distance),
            trainer: Trainer::new(store.clone()),
            config,
            store,
            samples,
            model: RwLock::new(Arc::new(model.unwrap_or_else(IdentityModel::empty))),
            writer: Mutex::new(()),
        };
        if !loaded {
            coordinator.recover_from_store();
        }
        coordinator
    }

    /// Rebuild from stored samples when no usable blob was found, so the next
    /// enrollment never trains on top of a model missing earlier identities.
    fn recover_from_store(&self) {
        match self.samples.labels() {
            Ok(labels) if labels.is_empty() => {
                tracing::info!("sample store empty; enrollment required");
            }
            Ok(labels) => {
                tracing::warn!(labels = labels.len(), "rebuilding model from stored samples");
                if let Err(e) = self.rebuild() {
                    tracing::warn!(error = %e, "rebuild failed; starting untrained");
                }
            }
            Err(e) => tracing::warn!(error = %e, "sample store unreadable; starting untrained"),
        }
    }

    pub fn config(&self) -> &RecognitionConfig {
        &self.config
    }

    pub fn matcher(&self) -> &NearestNeighborMatcher {
        &self.matcher
    }

    pub fn model_store(&self) -> &ModelStore {
        &self.store
    }

    pub fn sample_store(&self) -> &SampleStore {
        &self.samples
    }

    /// The current model. Later swaps do not affect the returned snapshot.
    pub fn snapshot(&self) -> Arc<IdentityModel> {
        self.model
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_trained(&self) -> bool {
        self.snapshot().is_trained()
    }

    pub fn labels(&self) -> Vec<String> {
        self.snapshot().labels().into_iter().map(str::to_string).collect()
    }

    /// Identify a face crop. An unknown face is `Ok` with `label: None`.
    pub fn recognize(&self, face: &FaceImage) -> Result<MatchResult, MatchError> {
        let model = self.snapshot();
        if !model.is_trained() {
            return Err(MatchError::ModelNotTrained);
        }
        let face = face.resize(self.config.face_size)?;
        self.matcher.match_face(&model, &face)
    }

    /// Capture faces from a live source and enroll them under `label`.
    ///
    /// The capture loop stops after `min_samples` usable crops, after
    /// `max_capture_frames` frames, at the capture timeout, or when the source
    /// runs dry. The source is released before training starts.
    pub fn enroll(
        &self,
        label: &str,
        capture: &mut dyn CaptureSource,
        detector: &mut dyn FaceDetector,
    ) -> Result<EnrollmentResult, EnrollError> {
        labels::validate_label(label)?;
        let (crops, frames_read) = self.capture_crops(capture, detector)?;

        tracing::info!(label, captured = crops.len(), frames_read, "enroll: capture finished");
        self.require_min(crops.len())?;
        self.commit(label, crops, frames_read)
    }

    /// Enroll already-cropped face images under `label`.
    pub fn enroll_images(
        &self,
        label: &str,
        images: &[FaceImage],
    ) -> Result<EnrollmentResult, EnrollError> {
        labels::validate_label(label)?;
        let crops: Vec<FaceImage> = images.iter().filter_map(|img| self.prepare(img)).collect();

        tracing::info!(
            label,
            offered = images.len(),
            usable = crops.len(),
            "enroll: images received"
        );
        self.require_min(crops.len())?;
        self.commit(label, crops, 0)
    }

    /// Retrain from the entire sample store and replace the live model.
    pub fn rebuild(&self) -> Result<EnrollmentResult, EnrollError> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let model = self.train_from_store()?;
        let result = EnrollmentResult::new(None, model.exemplars().len(), 0, &model);
        self.publish(model);
        Ok(result)
    }

    /// Forget a label: retrain without its samples, then delete them.
    ///
    /// Returns false if the label was neither stored nor known to the model.
    /// A failed retrain leaves both the samples and the live model untouched.
    pub fn remove(&self, label: &str) -> Result<bool, EnrollError> {
        labels::validate_label(label)?;
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let had_samples = self.samples.labels()?.iter().any(|l| l == label);
        let in_model = self.snapshot().has_label(label);
        if !had_samples && !in_model {
            return Ok(false);
        }

        let remaining = self.stored_samples(Some(label))?;
        let model = match self.trainer.train(&remaining) {
            Ok(model) => model,
            Err(TrainingError::NoSamples) => {
                self.store.clear()?;
                IdentityModel::empty()
            }
            Err(e) => return Err(e.into()),
        };
        self.publish(model);
        self.samples.remove(label)?;

        tracing::info!(label, "identity removed");
        Ok(true)
    }

    /// Watch a live source until an enrolled face shows up.
    ///
    /// Every detected face in a frame is matched, in detection order; the first
    /// accepted one ends the run. Reaching `max_capture_frames`, the capture
    /// timeout, or the end of the source yields `label: None`.
    pub fn identify(
        &self,
        capture: &mut dyn CaptureSource,
        detector: &mut dyn FaceDetector,
    ) -> Result<Identification, IdentifyError> {
        let model = self.snapshot();
        if !model.is_trained() {
            return Err(MatchError::ModelNotTrained.into());
        }

        let mut budget = CaptureBudget::new(&self.config);
        let mut session = CaptureSession::open(capture)?;
        let mut outcome = Identification {
            label: None,
            best: None,
            bbox: None,
            frames_read: 0,
            faces_seen: 0,
        };

        while !budget.exhausted() {
            let Some(frame) = session.next_frame()? else {
                tracing::debug!(frames_read = budget.frames_read, "identify: source exhausted");
                break;
            };
            budget.frames_read += 1;

            for detection in detector.detect(&frame)? {
                let Some(crop) = self.prepare(&detection.face) else {
                    continue;
                };
                outcome.faces_seen += 1;
                let result = self.matcher.match_face(&model, &crop)?;

                let closer = outcome.best.as_ref().map_or(true, |b| result.distance < b.distance);
                if result.is_match() || closer {
                    outcome.label = result.label.clone();
                    outcome.bbox = Some(detection.bbox);
                    outcome.best = Some(result);
                }
                if outcome.label.is_some() {
                    outcome.frames_read = budget.frames_read;
                    tracing::info!(
                        label = ?outcome.label,
                        frames_read = outcome.frames_read,
                        "identify: face recognized"
                    );
                    return Ok(outcome);
                }
            }
        }

        outcome.frames_read = budget.frames_read;
        tracing::info!(
            frames_read = outcome.frames_read,
            faces_seen = outcome.faces_seen,
            "identify: no enrolled face recognized"
        );
        Ok(outcome)
    }

    fn capture_crops(
        &self,
        capture: &mut dyn CaptureSource,
        detector: &mut dyn FaceDetector,
    ) -> Result<(Vec<FaceImage>, usize), EnrollError> {
        let required = self.config.min_samples;
        let mut budget = CaptureBudget::new(&self.config);
        let mut session = CaptureSession::open(capture)?;
        let mut crops = Vec::with_capacity(required);

        while crops.len() < required && !budget.exhausted() {
            let Some(frame) = session.next_frame()? else {
                tracing::debug!(frames_read = budget.frames_read, "enroll: source exhausted");
                break;
            };
            budget.frames_read += 1;

            // Several faces in one enrollment frame: keep the largest.
            let Some(best) = detector
                .detect(&frame)?
                .into_iter()
                .max_by_key(|d| d.bbox.area())
            else {
                continue;
            };

            match self.prepare(&best.face) {
                Some(crop) => crops.push(crop),
                None => tracing::debug!(seq = frame.sequence, "enroll: unusable face crop"),
            }
        }

        Ok((crops, budget.frames_read))
    }

    /// Resize to the model's face size; reject dark or blank crops.
    fn prepare(&self, face: &FaceImage) -> Option<FaceImage> {
        let crop = face.resize(self.config.face_size).ok()?;
        if crop.is_dark(self.config.dark_threshold) || crop.pixels().iter().all(|&p| p == 0) {
            return None;
        }
        Some(crop)
    }

    fn require_min(&self, captured: usize) -> Result<(), EnrollError> {
        let required = self.config.min_samples;
        if captured < required {
            return Err(EnrollError::InsufficientSamples { captured, required });
        }
        Ok(())
    }

    /// Store the crops and train them onto the live model.
    ///
    /// If the live model lacks a label the sample store holds, the model is
    /// retrained from the whole store instead, so no stored identity drops
    /// out. Crops are deleted again when training fails.
    fn commit(
        &self,
        label: &str,
        crops: Vec<FaceImage>,
        frames_read: usize,
    ) -> Result<EnrollmentResult, EnrollError> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let base = self.snapshot();
        let missing: Vec<String> = self
            .samples
            .labels()?
            .into_iter()
            .filter(|l| !base.has_label(l))
            .collect();

        let mut saved: Vec<PathBuf> = Vec::with_capacity(crops.len());
        for crop in &crops {
            match self.samples.save(label, crop) {
                Ok(path) => saved.push(path),
                Err(e) => {
                    self.samples.discard(&saved);
                    return Err(e.into());
                }
            }
        }

        let trained = if missing.is_empty() {
            let samples: Vec<FaceSample> = crops
                .into_iter()
                .map(|image| FaceSample::new(label, image))
                .collect();
            self.trainer.train_onto(&base, &samples).map_err(EnrollError::from)
        } else {
            tracing::warn!(?missing, "live model lacks stored labels; retraining from store");
            self.train_from_store()
        };

        let model = match trained {
            Ok(model) => model,
            Err(e) => {
                self.samples.discard(&saved);
                return Err(e);
            }
        };

        let result = EnrollmentResult::new(Some(label), saved.len(), frames_read, &model);
        self.publish(model);
        tracing::info!(label, exemplars = result.exemplars, "enrolled");
        Ok(result)
    }

    fn train_from_store(&self) -> Result<IdentityModel, EnrollError> {
        let samples = self.stored_samples(None)?;
        Ok(self.trainer.train(&samples)?)
    }

    /// Every stored sample resized to the face size, optionally minus one label.
    fn stored_samples(&self, except: Option<&str>) -> Result<Vec<FaceSample>, EnrollError> {
        Ok(self
            .samples
            .load_all()?
            .into_iter()
            .filter(|s| except != Some(s.label.as_str()))
            .filter_map(|s| {
                let image = s.image.resize(self.config.face_size).ok()?;
                Some(FaceSample::new(s.label, image))
            })
            .collect())
    }

    fn publish(&self, model: IdentityModel) {
        let mut slot = self.model.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Arc::new(model);
    }
}
