use crate::config::Config;
use crate::frames::{DirectoryCapture, WholeFrameDetector};
use chrono::{DateTime, Utc};
use rollcall_core::{
    EnrollError, EnrollmentCoordinator, EnrollmentResult, FaceImage, Identification,
    IdentifyError, MatchError, MatchResult, ModelStore, SampleStore,
};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Enroll(#[from] EnrollError),
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error(transparent)]
    Identify(#[from] IdentifyError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Snapshot of the engine's model state.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub version: &'static str,
    pub trained: bool,
    pub labels: Vec<String>,
    pub exemplars: usize,
    pub dimension: Option<usize>,
    pub trained_at: Option<DateTime<Utc>>,
    pub model_path: PathBuf,
    pub samples_dir: PathBuf,
    pub max_distance: f32,
}

/// Messages sent from CLI tasks to the engine thread.
enum EngineRequest {
    Recognize {
        face: FaceImage,
        reply: oneshot::Sender<Result<MatchResult, EngineError>>,
    },
    Identify {
        frames_dir: PathBuf,
        reply: oneshot::Sender<Result<Identification, EngineError>>,
    },
    Enroll {
        label: String,
        images: Vec<FaceImage>,
        reply: oneshot::Sender<Result<EnrollmentResult, EngineError>>,
    },
    EnrollFrames {
        label: String,
        frames_dir: PathBuf,
        reply: oneshot::Sender<Result<EnrollmentResult, EngineError>>,
    },
    Rebuild {
        import_dir: Option<PathBuf>,
        reply: oneshot::Sender<Result<EnrollmentResult, EngineError>>,
    },
    Remove {
        label: String,
        reply: oneshot::Sender<Result<bool, EngineError>>,
    },
    Status {
        reply: oneshot::Sender<EngineStatus>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    pub async fn recognize(&self, face: FaceImage) -> Result<MatchResult, EngineError> {
        self.call(|reply| EngineRequest::Recognize { face, reply }).await?
    }

    /// Watch a directory of frames, replayed as a camera, for an enrolled face.
    pub async fn identify(&self, frames_dir: PathBuf) -> Result<Identification, EngineError> {
        self.call(|reply| EngineRequest::Identify { frames_dir, reply }).await?
    }

    pub async fn enroll(
        &self,
        label: String,
        images: Vec<FaceImage>,
    ) -> Result<EnrollmentResult, EngineError> {
        self.call(|reply| EngineRequest::Enroll { label, images, reply }).await?
    }

    /// Enroll from a directory of frames replayed as a capture source.
    pub async fn enroll_frames(
        &self,
        label: String,
        frames_dir: PathBuf,
    ) -> Result<EnrollmentResult, EngineError> {
        self.call(|reply| EngineRequest::EnrollFrames { label, frames_dir, reply }).await?
    }

    /// Optionally import a folder-per-label directory, then retrain from the whole store.
    pub async fn rebuild(
        &self,
        import_dir: Option<PathBuf>,
    ) -> Result<EnrollmentResult, EngineError> {
        self.call(|reply| EngineRequest::Rebuild { import_dir, reply }).await?
    }

    pub async fn remove(&self, label: String) -> Result<bool, EngineError> {
        self.call(|reply| EngineRequest::Remove { label, reply }).await?
    }

    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        self.call(|reply| EngineRequest::Status { reply }).await
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread is the only owner of the enrollment coordinator; requests are
/// handled one at a time in arrival order.
pub fn spawn_engine(config: &Config) -> Result<EngineHandle, EngineError> {
    let coordinator = EnrollmentCoordinator::open(
        config.recognition.clone(),
        ModelStore::new(&config.model_path),
        SampleStore::new(&config.samples_dir),
    );
    tracing::info!(
        model = %config.model_path.display(),
        samples = %config.samples_dir.display(),
        trained = coordinator.is_trained(),
        "coordinator ready"
    );

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(16);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::debug!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                handle_request(&coordinator, req);
            }
            tracing::debug!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

fn handle_request(coordinator: &EnrollmentCoordinator, req: EngineRequest) {
    match req {
        EngineRequest::Recognize { face, reply } => {
            let _ = reply.send(coordinator.recognize(&face).map_err(EngineError::from));
        }
        EngineRequest::Identify { frames_dir, reply } => {
            let mut capture = DirectoryCapture::new(frames_dir);
            let mut detector = detector_for(coordinator);
            let result = coordinator.identify(&mut capture, &mut detector);
            let _ = reply.send(result.map_err(EngineError::from));
        }
        EngineRequest::Enroll { label, images, reply } => {
            let result = coordinator.enroll_images(&label, &images);
            let _ = reply.send(result.map_err(EngineError::from));
        }
        EngineRequest::EnrollFrames { label, frames_dir, reply } => {
            let mut capture = DirectoryCapture::new(frames_dir);
            let mut detector = detector_for(coordinator);
            let result = coordinator.enroll(&label, &mut capture, &mut detector);
            let _ = reply.send(result.map_err(EngineError::from));
        }
        EngineRequest::Rebuild { import_dir, reply } => {
            let _ = reply.send(run_rebuild(coordinator, import_dir));
        }
        EngineRequest::Remove { label, reply } => {
            let _ = reply.send(coordinator.remove(&label).map_err(EngineError::from));
        }
        EngineRequest::Status { reply } => {
            let _ = reply.send(status(coordinator));
        }
    }
}

fn detector_for(coordinator: &EnrollmentCoordinator) -> WholeFrameDetector {
    WholeFrameDetector {
        dark_threshold: coordinator.config().dark_threshold,
    }
}

fn run_rebuild(
    coordinator: &EnrollmentCoordinator,
    import_dir: Option<PathBuf>,
) -> Result<EnrollmentResult, EngineError> {
    if let Some(dir) = import_dir {
        coordinator
            .sample_store()
            .import_dir(&dir, coordinator.config().face_size)
            .map_err(EnrollError::from)?;
    }
    Ok(coordinator.rebuild()?)
}

fn status(coordinator: &EnrollmentCoordinator) -> EngineStatus {
    let model = coordinator.snapshot();
    let store = coordinator.sample_store();
    EngineStatus {
        version: env!("CARGO_PKG_VERSION"),
        trained: model.is_trained(),
        labels: model.labels().into_iter().map(str::to_string).collect(),
        exemplars: model.exemplars().len(),
        dimension: model.dimension(),
        trained_at: model.trained_at(),
        model_path: coordinator.model_store().path().to_path_buf(),
        samples_dir: store.root().to_path_buf(),
        max_distance: coordinator.matcher().max_distance,
    }
}
