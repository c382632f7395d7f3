//! Decoded frames.
//!
//! - `Frame`: a decoded RGB raster handed from a reader to the scheduler. It is moved
//!   between stages and never shared mutably, so it has no `Clone`.
//! - `AnnotatedFrame`: the raster after boxes, labels and the HUD have been drawn,
//!   ready for the display.

use image::{ImageFormat, RgbImage};

use crate::error::{AcquireError, AcquireResult};

/// Largest encoded frame the readers accept.
pub const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;

/// Decoded camera frame.
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    /// Wrap an already decoded raster.
    pub fn from_rgb(image: RgbImage) -> Self {
        Self { image }
    }

    /// Decode one JPEG image (start-of-image through end-of-image markers).
    pub fn decode_jpeg(bytes: &[u8]) -> AcquireResult<Self> {
        if bytes.len() > MAX_JPEG_BYTES {
            return Err(AcquireError::Decode(format!(
                "encoded frame of {} bytes exceeds {} byte limit",
                bytes.len(),
                MAX_JPEG_BYTES
            )));
        }
        let image = image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)
            .map_err(|e| AcquireError::Decode(e.to_string()))?
            .into_rgb8();
        if image.width() == 0 || image.height() == 0 {
            return Err(AcquireError::Decode("decoded frame has no pixels".into()));
        }
        Ok(Self { image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }
}

/// Frame prepared for presentation.
pub struct AnnotatedFrame {
    image: RgbImage,
    vehicle_count: usize,
}

impl AnnotatedFrame {
    pub fn new(image: RgbImage, vehicle_count: usize) -> Self {
        Self {
            image,
            vehicle_count,
        }
    }

    /// Raw frame shown as-is, with zero detections.
    pub fn unannotated(frame: Frame) -> Self {
        Self::new(frame.into_image(), 0)
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicle_count
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }
}
