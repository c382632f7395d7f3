/// Axis-aligned box in frame pixel coordinates, top-left anchored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Convert a center-based box given as fractions of the frame size.
    ///
    /// Each step truncates toward zero, so boxes land on the same pixels a
    /// center-then-offset integer conversion would produce.
    pub fn from_normalized_center(
        center_x: f32,
        center_y: f32,
        width: f32,
        height: f32,
        frame_width: u32,
        frame_height: u32,
    ) -> Self {
        let cx = (center_x * frame_width as f32) as i32;
        let cy = (center_y * frame_height as f32) as i32;
        let w = (width * frame_width as f32) as i32;
        let h = (height * frame_height as f32) as i32;
        Self {
            x: (cx as f32 - w as f32 / 2.0) as i32,
            y: (cy as f32 - h as f32 / 2.0) as i32,
            width: w,
            height: h,
        }
    }

    pub fn area(&self) -> f32 {
        self.width.max(0) as f32 * self.height.max(0) as f32
    }

    /// Edges are computed in `i64`; saturated boxes from non-finite model output
    /// cannot overflow.
    pub fn intersection_area(&self, other: &BoundingBox) -> f32 {
        let (ax, ay) = (i64::from(self.x), i64::from(self.y));
        let (bx, by) = (i64::from(other.x), i64::from(other.y));
        let left = ax.max(bx);
        let right = (ax + i64::from(self.width)).min(bx + i64::from(other.width));
        let top = ay.max(by);
        let bottom = (ay + i64::from(self.height)).min(by + i64::from(other.height));
        (right - left).max(0) as f32 * (bottom - top).max(0) as f32
    }

    /// Intersection over union; zero when both boxes are empty.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let intersection = self.intersection_area(other);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

/// One vehicle found in a frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub class_id: usize,
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Detections produced for one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionResult {
    /// Index of the frame the detections were computed on.
    pub frame_index: u64,
    pub detections: Vec<Detection>,
}

impl DetectionResult {
    pub fn new(frame_index: u64, detections: Vec<Detection>) -> Self {
        Self {
            frame_index,
            detections,
        }
    }

    pub fn empty(frame_index: u64) -> Self {
        Self::new(frame_index, Vec::new())
    }

    pub fn vehicle_count(&self) -> usize {
        self.detections.len()
    }
}
