use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::model::labels::{class_name, POSE_SKELETON};
use crate::model::{Detection, Predictions, VisionModel};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut,
};
use imageproc::rect::Rect;
use tracing::{trace, warn};

/// A decoded 8-bit RGB raster.
pub type Frame = RgbImage;

const PALETTE: [[u8; 3]; 20] = [
    [0xFF, 0x38, 0x38],
    [0xFF, 0x9D, 0x97],
    [0xFF, 0x70, 0x1F],
    [0xFF, 0xB2, 0x1D],
    [0xCF, 0xD2, 0x31],
    [0x48, 0xF9, 0x0A],
    [0x92, 0xCC, 0x17],
    [0x3D, 0xDB, 0x86],
    [0x1A, 0x93, 0x34],
    [0x00, 0xD4, 0xBB],
    [0x2C, 0x99, 0xA8],
    [0x00, 0xC2, 0xFF],
    [0x34, 0x45, 0x93],
    [0x64, 0x73, 0xFF],
    [0x00, 0x18, 0xEC],
    [0x84, 0x38, 0xFF],
    [0x52, 0x00, 0x85],
    [0xCB, 0x38, 0xFF],
    [0xFF, 0x95, 0xC8],
    [0xFF, 0x37, 0xC7],
];
const LABEL_TEXT: Rgb<u8> = Rgb([255, 255, 255]);
const KEYPOINT_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const LIMB_COLOR: Rgb<u8> = Rgb([51, 153, 255]);
const KEYPOINT_MIN_CONFIDENCE: f32 = 0.5;
const GLYPH_ADVANCE: i32 = 6;
const GLYPH_HEIGHT: i32 = 7;

/// Model output burned into a copy of the source frame.
#[derive(Clone, Debug)]
pub struct AnnotatedFrame {
    image: RgbImage,
    predictions: Predictions,
}

impl AnnotatedFrame {
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn predictions(&self) -> &Predictions {
        &self.predictions
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnnotationStyle {
    pub line_thickness: u32,
    pub mask_alpha: f32,
    pub labels: bool,
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self {
            line_thickness: 2,
            mask_alpha: 0.45,
            labels: true,
        }
    }
}

impl From<&Config> for AnnotationStyle {
    fn from(cfg: &Config) -> Self {
        Self {
            line_thickness: cfg.line_thickness.max(1),
            mask_alpha: cfg.mask_alpha.clamp(0.0, 1.0),
            labels: true,
        }
    }
}

/// Runs a model on a frame and draws what it found.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameAnnotator {
    style: AnnotationStyle,
}

impl FrameAnnotator {
    pub fn new(style: AnnotationStyle) -> Self {
        Self { style }
    }

    /// Returns a new image; `frame` is left untouched.
    pub fn annotate(&self, frame: &Frame, model: &dyn VisionModel) -> Result<AnnotatedFrame> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(PipelineError::Decode("zero-sized frame".into()));
        }
        let predictions = model.predict(frame)?;
        trace!(detections = predictions.len(), "frame annotated");
        let image = self.render(frame, &predictions);
        Ok(AnnotatedFrame { image, predictions })
    }

    pub fn render(&self, frame: &Frame, predictions: &Predictions) -> RgbImage {
        let mut canvas = frame.clone();
        for det in &predictions.detections {
            self.draw_mask(&mut canvas, det);
        }
        for det in &predictions.detections {
            self.draw_box(&mut canvas, det);
            self.draw_skeleton(&mut canvas, det);
        }
        if self.style.labels {
            for det in &predictions.detections {
                draw_label(&mut canvas, det);
            }
        }
        canvas
    }

    fn draw_mask(&self, canvas: &mut RgbImage, det: &Detection) {
        let Some(mask) = &det.mask else {
            return;
        };
        if mask.dimensions() != canvas.dimensions() {
            warn!(mask = ?mask.dimensions(), frame = ?canvas.dimensions(), "mask size mismatch, skipped");
            return;
        }
        let color = class_color(det.class_id);
        let alpha = self.style.mask_alpha;
        for (px, m) in canvas.pixels_mut().zip(mask.pixels()) {
            if m.0[0] == 0 {
                continue;
            }
            for c in 0..3 {
                let blended = px.0[c] as f32 * (1.0 - alpha) + color.0[c] as f32 * alpha;
                px.0[c] = blended.round() as u8;
            }
        }
    }

    fn draw_box(&self, canvas: &mut RgbImage, det: &Detection) {
        let color = class_color(det.class_id);
        let bbox = det.bbox.clamp_to(canvas.width(), canvas.height());
        for t in 0..self.style.line_thickness as i32 {
            let x = bbox.x1.round() as i32 + t;
            let y = bbox.y1.round() as i32 + t;
            let w = bbox.width().round() as i32 - 2 * t;
            let h = bbox.height().round() as i32 - 2 * t;
            if w < 1 || h < 1 {
                break;
            }
            draw_hollow_rect_mut(canvas, Rect::at(x, y).of_size(w as u32, h as u32), color);
        }
    }

    fn draw_skeleton(&self, canvas: &mut RgbImage, det: &Detection) {
        if det.keypoints.is_empty() {
            return;
        }
        let visible = |i: usize| {
            det.keypoints
                .get(i)
                .filter(|kp| kp.confidence >= KEYPOINT_MIN_CONFIDENCE)
        };
        for (a, b) in POSE_SKELETON {
            if let (Some(a), Some(b)) = (visible(a), visible(b)) {
                draw_line_segment_mut(canvas, (a.x, a.y), (b.x, b.y), LIMB_COLOR);
            }
        }
        let radius = (self.style.line_thickness as i32 + 1).max(2);
        for kp in det.keypoints.iter().filter(|kp| kp.confidence >= KEYPOINT_MIN_CONFIDENCE) {
            draw_filled_circle_mut(
                canvas,
                (kp.x.round() as i32, kp.y.round() as i32),
                radius,
                KEYPOINT_COLOR,
            );
        }
    }
}

fn class_color(class_id: usize) -> Rgb<u8> {
    Rgb(PALETTE[class_id % PALETTE.len()])
}

fn draw_label(canvas: &mut RgbImage, det: &Detection) {
    let text = format!("{} {:.0}%", class_name(det.class_id), det.score * 100.0);
    let text_width = text.chars().count() as i32 * GLYPH_ADVANCE + 2;
    let x = (det.bbox.x1.round() as i32).max(0);
    let top = det.bbox.y1.round() as i32 - GLYPH_HEIGHT - 3;
    let y = if top < 0 { det.bbox.y1.round() as i32 + 1 } else { top };
    let y = y.clamp(0, (canvas.height() as i32 - GLYPH_HEIGHT - 2).max(0));
    draw_filled_rect_mut(
        canvas,
        Rect::at(x, y).of_size(text_width as u32, GLYPH_HEIGHT as u32 + 2),
        class_color(det.class_id),
    );
    draw_text(canvas, x + 1, y + 1, &text, LABEL_TEXT);
}

fn draw_text(canvas: &mut RgbImage, mut x: i32, y: i32, text: &str, color: Rgb<u8>) {
    let (width, height) = (canvas.width() as i32, canvas.height() as i32);
    for ch in text.chars().flat_map(char::to_uppercase) {
        if let Some(rows) = glyph(ch) {
            for (row, bits) in rows.iter().enumerate() {
                let py = y + row as i32;
                for col in 0..5 {
                    let px = x + col;
                    if (bits >> (4 - col)) & 1 == 1 && (0..width).contains(&px) && (0..height).contains(&py) {
                        canvas.put_pixel(px as u32, py as u32, color);
                    }
                }
            }
        }
        x += GLYPH_ADVANCE;
    }
}

/// 5x7 bitmap glyphs, one byte per row, most significant of the low five bits
/// on the left.
fn glyph(ch: char) -> Option<[u8; 7]> {
    let rows = match ch {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x0A, 0x04, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1E, 0x01, 0x01, 0x0E, 0x01, 0x01, 0x1E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '%' => [0x11, 0x12, 0x04, 0x08, 0x12, 0x11, 0x00],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x06, 0x06],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        ' ' => [0x00; 7],
        _ => return None,
    };
    Some(rows)
}
