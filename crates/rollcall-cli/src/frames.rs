//! Offline capture: replay a directory of frame images as a camera.

use rollcall_core::frame::{self, BoundingBox, Frame};
use rollcall_core::{CaptureError, CaptureSource, Detection, DetectorError, FaceDetector};
use std::collections::VecDeque;
use std::path::PathBuf;

/// Serves the images of a directory, sorted by name, as consecutive frames.
pub struct DirectoryCapture {
    dir: PathBuf,
    pending: VecDeque<PathBuf>,
    sequence: u32,
}

impl DirectoryCapture {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            pending: VecDeque::new(),
            sequence: 0,
        }
    }
}

impl CaptureSource for DirectoryCapture {
    fn open(&mut self) -> Result<(), CaptureError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| {
            CaptureError::DeviceUnavailable(format!("{}: {e}", self.dir.display()))
        })?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();
        files.sort();
        tracing::debug!(dir = %self.dir.display(), frames = files.len(), "frame directory opened");
        self.pending = files.into();
        self.sequence = 0;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        while let Some(path) = self.pending.pop_front() {
            let img = match image::open(&path) {
                Ok(img) => img.to_luma8(),
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "skipping non-image file");
                    continue;
                }
            };
            let (width, height) = img.dimensions();
            let frame = Frame::new(img.into_raw(), width, height, self.sequence)
                .map_err(|e| CaptureError::CaptureFailed(format!("{}: {e}", path.display())))?;
            self.sequence += 1;
            return Ok(Some(frame));
        }
        Ok(None)
    }

    fn close(&mut self) {
        self.pending.clear();
    }
}

/// Treats a whole frame as a single face crop, unless it is dark.
pub struct WholeFrameDetector {
    pub dark_threshold: f32,
}

impl FaceDetector for WholeFrameDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectorError> {
        if frame::is_dark_frame(&frame.data, self.dark_threshold) {
            return Ok(Vec::new());
        }
        let bbox = BoundingBox {
            x: 0,
            y: 0,
            width: frame.width,
            height: frame.height,
        };
        let face = frame::crop(frame, &bbox).map_err(|e| DetectorError(e.to_string()))?;
        Ok(vec![Detection { bbox, face }])
    }
}
