//! Pretrained vision models and the predictions they produce.

pub mod labels;
pub mod onnx;
pub mod yolo;

use crate::error::Result;
use crate::mode::Mode;
use image::{GrayImage, RgbImage};

pub use onnx::{InferenceOptions, YoloOnnx};

/// A loaded inference capability bound to one [`Mode`].
///
/// Implementations are read-only after construction so a single instance can
/// be shared between pipelines through an `Arc`.
pub trait VisionModel: Send + Sync {
    fn mode(&self) -> Mode;

    /// Runs inference on `frame`. Coordinates in the returned predictions are
    /// in `frame` pixel space.
    fn predict(&self, frame: &RgbImage) -> Result<Predictions>;
}

/// Axis-aligned box, corners in pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let inter = BoundingBox::new(
            self.x1.max(other.x1),
            self.y1.max(other.y1),
            self.x2.min(other.x2),
            self.y2.min(other.y2),
        )
        .area();
        if inter <= 0.0 {
            return 0.0;
        }
        inter / (self.area() + other.area() - inter)
    }

    /// Clamps the box to a `width` x `height` raster.
    pub fn clamp_to(self, width: u32, height: u32) -> Self {
        let w = width as f32;
        let h = height as f32;
        Self::new(
            self.x1.clamp(0.0, w),
            self.y1.clamp(0.0, h),
            self.x2.clamp(0.0, w),
            self.y2.clamp(0.0, h),
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
}

#[derive(Clone, Debug)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub score: f32,
    pub class_id: usize,
    /// Frame-sized instance mask, non-zero where the instance is.
    pub mask: Option<GrayImage>,
    /// COCO ordered keypoints, empty outside pose mode.
    pub keypoints: Vec<Keypoint>,
}

impl Detection {
    pub fn new(bbox: BoundingBox, score: f32, class_id: usize) -> Self {
        Self {
            bbox,
            score,
            class_id,
            mask: None,
            keypoints: Vec::new(),
        }
    }

    pub fn with_mask(mut self, mask: GrayImage) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn with_keypoints(mut self, keypoints: Vec<Keypoint>) -> Self {
        self.keypoints = keypoints;
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct Predictions {
    pub detections: Vec<Detection>,
}

impl Predictions {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}
