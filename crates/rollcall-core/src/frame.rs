//! Grayscale frame and face-crop types, with cropping, resizing and dark detection.

use image::imageops::FilterType;
use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Pixel values below this count as "dark" for [`is_dark_frame`].
const DARK_PIXEL_CUTOFF: u8 = 32;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid pixel buffer: {width}x{height} needs {expected} bytes, got {actual}")]
    InvalidDimensions {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("image has zero width or height")]
    EmptyImage,
}

/// A full grayscale camera frame, as handed over by a capture source.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Grayscale pixel data (width * height bytes, row-major).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub sequence: u32,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u32) -> Result<Self, FrameError> {
        check_dimensions(&data, width, height)?;
        Ok(Self {
            data,
            width,
            height,
            sequence,
        })
    }
}

/// Axis-aligned face region in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// A grayscale face crop of any rectangular size ≥ 1×1.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceImage {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl FaceImage {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
        check_dimensions(&data, width, height)?;
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major pixel intensities.
    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Resize to `size × size`. A crop already at that size is returned untouched.
    pub fn resize(&self, size: u32) -> Result<FaceImage, FrameError> {
        if size == 0 {
            return Err(FrameError::EmptyImage);
        }
        if self.width == size && self.height == size {
            return Ok(self.clone());
        }
        let resized =
            image::imageops::resize(&self.to_gray_image(), size, size, FilterType::Triangle);
        Ok(FaceImage::from(resized))
    }

    pub fn to_gray_image(&self) -> GrayImage {
        // Dimensions were validated on construction, so from_raw cannot fail.
        GrayImage::from_raw(self.width, self.height, self.data.clone())
            .unwrap_or_else(|| GrayImage::new(self.width, self.height))
    }

    pub fn is_dark(&self, threshold_pct: f32) -> bool {
        is_dark_frame(&self.data, threshold_pct)
    }
}

impl From<GrayImage> for FaceImage {
    fn from(img: GrayImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            data: img.into_raw(),
        }
    }
}

impl From<&Frame> for FaceImage {
    fn from(frame: &Frame) -> Self {
        Self {
            width: frame.width,
            height: frame.height,
            data: frame.data.clone(),
        }
    }
}

/// Cut a bounding box out of a frame. The box is clipped to the frame edges;
/// a box that lies entirely outside the frame yields [`FrameError::EmptyImage`].
pub fn crop(frame: &Frame, bbox: &BoundingBox) -> Result<FaceImage, FrameError> {
    let x0 = bbox.x.min(frame.width);
    let y0 = bbox.y.min(frame.height);
    let x1 = bbox.x.saturating_add(bbox.width).min(frame.width);
    let y1 = bbox.y.saturating_add(bbox.height).min(frame.height);
    if x1 <= x0 || y1 <= y0 {
        return Err(FrameError::EmptyImage);
    }

    let w = (x1 - x0) as usize;
    let stride = frame.width as usize;
    let mut data = Vec::with_capacity(w * (y1 - y0) as usize);
    for y in y0 as usize..y1 as usize {
        let start = y * stride + x0 as usize;
        data.extend_from_slice(&frame.data[start..start + w]);
    }

    FaceImage::new(x1 - x0, y1 - y0, data)
}

/// Check if a pixel buffer is dark.
///
/// Returns true if more than `threshold_pct` of pixels fall below 32.
pub fn is_dark_frame(gray: &[u8], threshold_pct: f32) -> bool {
    if gray.is_empty() {
        return true;
    }
    let dark_count = gray.iter().filter(|&&p| p < DARK_PIXEL_CUTOFF).count();
    (dark_count as f32 / gray.len() as f32) > threshold_pct
}

fn check_dimensions(data: &[u8], width: u32, height: u32) -> Result<(), FrameError> {
    if width == 0 || height == 0 {
        return Err(FrameError::EmptyImage);
    }
    let expected = width as usize * height as usize;
    if data.len() != expected {
        return Err(FrameError::InvalidDimensions {
            width,
            height,
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}
