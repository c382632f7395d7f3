//! Drawing and presentation.
//!
//! `Annotator` draws detection boxes, labels, the HUD and the connection-lost
//! placeholder. Text needs a TrueType font; without one only boxes are drawn.
//! `Display` is the presentation seam polled once per loop iteration.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ab_glyph::{FontVec, PxScale};
use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::detect::{BoundingBox, Detection};
use crate::frame::{AnnotatedFrame, Frame};

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const COUNT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const PLACEHOLDER_WIDTH: u32 = 640;
const PLACEHOLDER_HEIGHT: u32 = 480;

/// Draws overlays onto frames.
#[derive(Default)]
pub struct Annotator {
    font: Option<FontVec>,
}

impl Annotator {
    pub fn new(font: Option<FontVec>) -> Self {
        Self { font }
    }

    /// Load the label font if one is configured.
    pub fn from_font_file(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let bytes = std::fs::read(path)
            .with_context(|| format!("read label font {}", path.display()))?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|_| anyhow!("{} is not a usable TrueType font", path.display()))?;
        Ok(Self::new(Some(font)))
    }

    /// Draw each detection as a 2px box labelled "class confidence".
    pub fn annotate(&self, frame: Frame, detections: &[Detection]) -> AnnotatedFrame {
        let mut image = frame.into_image();
        for detection in detections {
            draw_box(&mut image, &detection.bbox);
            let label = format!("{} {:.2}", detection.label, detection.confidence);
            self.text(
                &mut image,
                BOX_COLOR,
                detection.bbox.x,
                detection.bbox.y.saturating_sub(20),
                16.0,
                &label,
            );
        }
        AnnotatedFrame::new(image, detections.len())
    }

    /// Vehicle count and frame index in the top-left corner.
    pub fn draw_hud(&self, annotated: &mut AnnotatedFrame, frame_index: u64) {
        let count = format!("Vehicles detected: {}", annotated.vehicle_count());
        let index = format!("Frame: {}", frame_index);
        let image = annotated.image_mut();
        self.text(image, COUNT_COLOR, 10, 10, 28.0, &count);
        self.text(image, TEXT_COLOR, 10, 50, 20.0, &index);
    }

    /// Black screen shown while the camera is unreachable.
    pub fn placeholder(&self, failures: u32) -> AnnotatedFrame {
        let mut image = RgbImage::new(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT);
        self.text(&mut image, COUNT_COLOR, 100, 180, 28.0, "No connection to camera");
        self.text(
            &mut image,
            TEXT_COLOR,
            150,
            230,
            22.0,
            &format!("Retrying... ({})", failures),
        );
        self.text(&mut image, BOX_COLOR, 150, 280, 22.0, "Press Ctrl-C to quit");
        AnnotatedFrame::new(image, 0)
    }

    fn text(&self, image: &mut RgbImage, color: Rgb<u8>, x: i32, y: i32, size: f32, text: &str) {
        if let Some(font) = &self.font {
            draw_text_mut(image, color, x, y.max(0), PxScale::from(size), font, text);
        }
    }
}

fn draw_box(image: &mut RgbImage, bbox: &BoundingBox) {
    if bbox.width <= 0 || bbox.height <= 0 {
        return;
    }
    draw_hollow_rect_mut(
        image,
        Rect::at(bbox.x, bbox.y).of_size(bbox.width as u32, bbox.height as u32),
        BOX_COLOR,
    );
    if bbox.width > 2 && bbox.height > 2 {
        draw_hollow_rect_mut(
            image,
            Rect::at(bbox.x.saturating_add(1), bbox.y.saturating_add(1)).of_size(bbox.width as u32 - 2, bbox.height as u32 - 2),
            BOX_COLOR,
        );
    }
}

/// Presentation target for annotated frames.
pub trait Display {
    fn show(&mut self, frame: &AnnotatedFrame) -> Result<()>;

    /// Non-blocking check for a quit request.
    fn poll_cancel(&mut self) -> bool;
}

/// Headless display: logs a summary per frame and quits on Ctrl-C.
pub struct LogDisplay {
    cancel: Arc<AtomicBool>,
    shown: u64,
}

impl LogDisplay {
    pub fn new(cancel: Arc<AtomicBool>) -> Self {
        Self { cancel, shown: 0 }
    }

    /// Install a Ctrl-C handler that flips the returned display's cancel flag.
    pub fn with_ctrlc() -> Result<Self> {
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = cancel.clone();
        ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
            .context("install Ctrl-C handler")?;
        Ok(Self::new(cancel))
    }

    pub fn shown(&self) -> u64 {
        self.shown
    }
}

impl Display for LogDisplay {
    fn show(&mut self, frame: &AnnotatedFrame) -> Result<()> {
        self.shown += 1;
        let (width, height) = frame.image().dimensions();
        log::debug!(
            "display #{}: {}x{} with {} vehicles",
            self.shown,
            width,
            height,
            frame.vehicle_count()
        );
        Ok(())
    }

    fn poll_cancel(&mut self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}
