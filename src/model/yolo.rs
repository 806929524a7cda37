//! Tensor-free YOLO pre/post-processing: letterboxing, head decoding,
//! non-maximum suppression and instance mask assembly.

use crate::error::{PipelineError, Result};
use crate::mode::Mode;
use crate::model::{BoundingBox, Detection, Keypoint, Predictions};
use image::{imageops::FilterType, GrayImage, Luma, Rgb, RgbImage};

const PAD_VALUE: u8 = 114;
const MAX_DETECTIONS: usize = 300;
const MASK_THRESHOLD: f32 = 0.5;

/// Maps a frame into a square model input while keeping its aspect ratio.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    pub size: u32,
    pub scale: f32,
    pub pad_x: u32,
    pub pad_y: u32,
    pub resized_width: u32,
    pub resized_height: u32,
}

impl Letterbox {
    pub fn fit(width: u32, height: u32, size: u32) -> Self {
        let size = size.max(1);
        let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
        let resized_width = ((width as f32 * scale).round() as u32).clamp(1, size);
        let resized_height = ((height as f32 * scale).round() as u32).clamp(1, size);
        Self {
            size,
            scale,
            pad_x: (size - resized_width) / 2,
            pad_y: (size - resized_height) / 2,
            resized_width,
            resized_height,
        }
    }

    pub fn apply(&self, frame: &RgbImage) -> RgbImage {
        let resized = image::imageops::resize(
            frame,
            self.resized_width,
            self.resized_height,
            FilterType::Triangle,
        );
        let mut canvas = RgbImage::from_pixel(self.size, self.size, Rgb([PAD_VALUE; 3]));
        image::imageops::replace(&mut canvas, &resized, self.pad_x as i64, self.pad_y as i64);
        canvas
    }

    /// Model input coordinates to frame coordinates.
    pub fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scale,
            (y - self.pad_y as f32) / self.scale,
        )
    }

    /// Frame coordinates to model input coordinates.
    pub fn to_input(&self, x: f32, y: f32) -> (f32, f32) {
        (
            x * self.scale + self.pad_x as f32,
            y * self.scale + self.pad_y as f32,
        )
    }

    fn box_to_frame(&self, bbox: BoundingBox) -> BoundingBox {
        let (x1, y1) = self.to_frame(bbox.x1, bbox.y1);
        let (x2, y2) = self.to_frame(bbox.x2, bbox.y2);
        BoundingBox::new(x1, y1, x2, y2)
    }
}

/// One anchor that survived the confidence filter, still in input space.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub bbox: BoundingBox,
    pub score: f32,
    pub class_id: usize,
    /// Mask coefficients or raw keypoint triples, depending on the head.
    pub extras: Vec<f32>,
}

/// Decodes a `channels x anchors` YOLO head. The first four channels are
/// `cx, cy, w, h`, followed by class scores and `extra` trailing channels.
pub fn decode_head(head: &[Vec<f32>], extra: usize, confidence: f32) -> Result<Vec<Candidate>> {
    let channels = head.len();
    if channels <= 4 + extra {
        return Err(PipelineError::Inference(format!(
            "head has {channels} channels, expected more than {}",
            4 + extra
        )));
    }
    let classes = channels - 4 - extra;
    let anchors = head[0].len();
    if head.iter().any(|row| row.len() != anchors) {
        return Err(PipelineError::Inference("ragged detection head".into()));
    }

    let mut out = Vec::new();
    for a in 0..anchors {
        let (class_id, score) = (0..classes)
            .map(|c| (c, head[4 + c][a]))
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
        if score < confidence {
            continue;
        }
        let bbox = BoundingBox::from_center(head[0][a], head[1][a], head[2][a], head[3][a]);
        let extras = (0..extra).map(|e| head[4 + classes + e][a]).collect();
        out.push(Candidate {
            bbox,
            score,
            class_id,
            extras,
        });
    }
    Ok(out)
}

/// Class-aware greedy suppression, highest score first.
pub fn non_max_suppression(mut candidates: Vec<Candidate>, iou: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut kept: Vec<Candidate> = Vec::new();
    for cand in candidates {
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == cand.class_id && k.bbox.iou(&cand.bbox) > iou);
        if !suppressed {
            kept.push(cand);
            if kept.len() >= MAX_DETECTIONS {
                break;
            }
        }
    }
    kept
}

/// Builds a frame-sized mask from prototype maps (`k x mh x mw`) and the
/// instance coefficients, cropped to `bbox` (frame space).
pub fn instance_mask(
    coeffs: &[f32],
    protos: &[Vec<Vec<f32>>],
    bbox: BoundingBox,
    letterbox: &Letterbox,
    frame_width: u32,
    frame_height: u32,
) -> Result<GrayImage> {
    if protos.len() != coeffs.len() || protos.is_empty() {
        return Err(PipelineError::Inference(format!(
            "{} mask coefficients for {} prototypes",
            coeffs.len(),
            protos.len()
        )));
    }
    let mh = protos[0].len();
    let mw = protos[0].first().map(Vec::len).unwrap_or(0);
    if mh == 0 || mw == 0 {
        return Err(PipelineError::Inference("empty mask prototypes".into()));
    }

    let mut logits = vec![0.0f32; mh * mw];
    for (k, proto) in protos.iter().enumerate() {
        for (y, row) in proto.iter().enumerate().take(mh) {
            for (x, v) in row.iter().enumerate().take(mw) {
                logits[y * mw + x] += coeffs[k] * v;
            }
        }
    }

    let mut mask = GrayImage::new(frame_width, frame_height);
    let bbox = bbox.clamp_to(frame_width, frame_height);
    let sx = mw as f32 / letterbox.size as f32;
    let sy = mh as f32 / letterbox.size as f32;
    for fy in bbox.y1.floor() as u32..(bbox.y2.ceil() as u32).min(frame_height) {
        for fx in bbox.x1.floor() as u32..(bbox.x2.ceil() as u32).min(frame_width) {
            let (ix, iy) = letterbox.to_input(fx as f32 + 0.5, fy as f32 + 0.5);
            let px = ((ix * sx) as usize).min(mw - 1);
            let py = ((iy * sy) as usize).min(mh - 1);
            if sigmoid(logits[py * mw + px]) > MASK_THRESHOLD {
                mask.put_pixel(fx, fy, Luma([255]));
            }
        }
    }
    Ok(mask)
}

/// Turns decoded candidates into frame-space predictions for `mode`.
pub fn finalize(
    mode: Mode,
    candidates: Vec<Candidate>,
    protos: Option<&[Vec<Vec<f32>>]>,
    letterbox: &Letterbox,
    frame_width: u32,
    frame_height: u32,
    iou: f32,
) -> Result<Predictions> {
    let mut detections = Vec::new();
    for cand in non_max_suppression(candidates, iou) {
        let bbox = letterbox
            .box_to_frame(cand.bbox)
            .clamp_to(frame_width, frame_height);
        let mut det = Detection::new(bbox, cand.score, cand.class_id);
        match mode {
            Mode::Detection => {}
            Mode::Segmentation => {
                let protos = protos.ok_or_else(|| {
                    PipelineError::Inference("segmentation model produced no prototypes".into())
                })?;
                det = det.with_mask(instance_mask(
                    &cand.extras,
                    protos,
                    bbox,
                    letterbox,
                    frame_width,
                    frame_height,
                )?);
            }
            Mode::Pose => {
                let keypoints = cand
                    .extras
                    .chunks_exact(3)
                    .map(|kp| {
                        let (x, y) = letterbox.to_frame(kp[0], kp[1]);
                        Keypoint {
                            x: x.clamp(0.0, frame_width as f32),
                            y: y.clamp(0.0, frame_height as f32),
                            confidence: kp[2],
                        }
                    })
                    .collect();
                det = det.with_keypoints(keypoints);
            }
        }
        detections.push(det);
    }
    Ok(Predictions::new(detections))
}

fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}
