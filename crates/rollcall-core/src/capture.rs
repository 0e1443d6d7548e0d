//! Collaborator seams: frame sources and face detectors.
//!
//! Neither is implemented here; the enrollment coordinator drives whatever
//! the caller plugs in.

use crate::frame::{BoundingBox, FaceImage, Frame};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
}

#[derive(Error, Debug)]
#[error("face detection failed: {0}")]
pub struct DetectorError(pub String);

/// A source of grayscale frames, e.g. a camera.
pub trait CaptureSource {
    /// Acquire the underlying device.
    fn open(&mut self) -> Result<(), CaptureError>;

    /// Next frame, or `Ok(None)` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError>;

    /// Release the device. Must be safe to call after a failed `open`.
    fn close(&mut self);
}

/// One face located in a frame.
#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub face: FaceImage,
}

/// Locates faces in a frame. Zero or more results, in no particular order.
pub trait FaceDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectorError>;
}

/// Scoped acquisition of a [`CaptureSource`]: opened on construction,
/// closed on drop, whichever way the scope is left.
pub struct CaptureSession<'a> {
    source: &'a mut dyn CaptureSource,
}

impl<'a> CaptureSession<'a> {
    pub fn open(source: &'a mut dyn CaptureSource) -> Result<Self, CaptureError> {
        if let Err(e) = source.open() {
            source.close();
            return Err(e);
        }
        Ok(Self { source })
    }

    pub fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        self.source.next_frame()
    }
}

impl Drop for CaptureSession<'_> {
    fn drop(&mut self) {
        self.source.close();
        tracing::debug!("capture source released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Probe {
        fail_open: bool,
        opened: bool,
        closed: usize,
    }

    impl CaptureSource for Probe {
        fn open(&mut self) -> Result<(), CaptureError> {
            if self.fail_open {
                return Err(CaptureError::DeviceUnavailable("probe".into()));
            }
            self.opened = true;
            Ok(())
        }

        fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
            Err(CaptureError::CaptureFailed("boom".into()))
        }

        fn close(&mut self) {
            self.closed += 1;
        }
    }

    #[test]
    fn test_session_closes_on_error_path() {
        let mut probe = Probe::default();
        let result = (|| -> Result<(), CaptureError> {
            let mut session = CaptureSession::open(&mut probe)?;
            session.next_frame()?;
            Ok(())
        })();

        assert!(result.is_err());
        assert!(probe.opened);
        assert_eq!(probe.closed, 1);
    }

    #[test]
    fn test_failed_open_still_closes() {
        let mut probe = Probe {
            fail_open: true,
            ..Default::default()
        };
        assert!(CaptureSession::open(&mut probe).is_err());
        assert_eq!(probe.closed, 1);
    }
}
