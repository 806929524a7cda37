use image::{Rgb, RgbImage};
use proptest::prelude::*;
use visionflow::model::yolo::{
    decode_head, finalize, instance_mask, non_max_suppression, Candidate, Letterbox,
};
use visionflow::model::BoundingBox;
use visionflow::{Mode, PipelineError};

/// Builds a `channels x anchors` head from per-anchor columns.
fn head_from_columns(columns: &[Vec<f32>]) -> Vec<Vec<f32>> {
    let channels = columns[0].len();
    (0..channels)
        .map(|c| columns.iter().map(|col| col[c]).collect())
        .collect()
}

fn candidate(x1: f32, y1: f32, x2: f32, y2: f32, score: f32, class_id: usize) -> Candidate {
    Candidate {
        bbox: BoundingBox::new(x1, y1, x2, y2),
        score,
        class_id,
        extras: Vec::new(),
    }
}

proptest! {
    #[test]
    fn letterbox_round_trips_points(
        w in 1u32..2000, h in 1u32..2000, fx in 0f32..1.0, fy in 0f32..1.0
    ) {
        let lb = Letterbox::fit(w, h, 640);
        prop_assert!(lb.resized_width <= 640 && lb.resized_height <= 640);
        prop_assert!(lb.resized_width == 640 || lb.resized_height == 640);
        let (x, y) = (fx * w as f32, fy * h as f32);
        let (ix, iy) = lb.to_input(x, y);
        let (bx, by) = lb.to_frame(ix, iy);
        prop_assert!((bx - x).abs() < 1e-2 * w as f32 + 1e-3);
        prop_assert!((by - y).abs() < 1e-2 * h as f32 + 1e-3);
    }
}

#[test]
fn letterbox_pads_the_short_side() {
    let lb = Letterbox::fit(640, 480, 640);
    assert_eq!(lb.scale, 1.0);
    assert_eq!((lb.pad_x, lb.pad_y), (0, 80));
    let frame = RgbImage::from_pixel(640, 480, Rgb([200, 10, 10]));
    let input = lb.apply(&frame);
    assert_eq!(input.dimensions(), (640, 640));
    assert_eq!(input.get_pixel(320, 10), &Rgb([114, 114, 114]));
    assert_eq!(input.get_pixel(320, 320), &Rgb([200, 10, 10]));
}

#[test]
fn decode_picks_best_class_and_filters() {
    // cx, cy, w, h, class0, class1
    let head = head_from_columns(&[
        vec![100.0, 100.0, 20.0, 40.0, 0.1, 0.8],
        vec![300.0, 200.0, 10.0, 10.0, 0.05, 0.1],
        vec![50.0, 60.0, 10.0, 20.0, 0.7, 0.2],
    ]);
    let cands = decode_head(&head, 0, 0.25).unwrap();
    assert_eq!(cands.len(), 2);
    assert_eq!(cands[0].class_id, 1);
    assert_eq!(cands[0].bbox, BoundingBox::new(90.0, 80.0, 110.0, 120.0));
    assert_eq!(cands[1].class_id, 0);
    assert!((cands[1].score - 0.7).abs() < 1e-6);
}

#[test]
fn decode_keeps_trailing_channels() {
    // one class then three extra channels
    let head = head_from_columns(&[vec![10.0, 10.0, 4.0, 4.0, 0.9, 1.0, 2.0, 3.0]]);
    let cands = decode_head(&head, 3, 0.5).unwrap();
    assert_eq!(cands[0].extras, vec![1.0, 2.0, 3.0]);
}

#[test]
fn decode_rejects_short_heads() {
    let head = vec![vec![0.0; 8]; 4];
    assert!(matches!(decode_head(&head, 0, 0.1), Err(PipelineError::Inference(_))));
    let head = vec![vec![0.0; 8]; 40];
    assert!(matches!(decode_head(&head, 51, 0.1), Err(PipelineError::Inference(_))));
}

#[test]
fn nms_suppresses_overlaps_within_class_only() {
    let kept = non_max_suppression(
        vec![
            candidate(0.0, 0.0, 10.0, 10.0, 0.6, 0),
            candidate(1.0, 1.0, 11.0, 11.0, 0.9, 0),
            candidate(1.0, 1.0, 11.0, 11.0, 0.5, 1),
            candidate(50.0, 50.0, 60.0, 60.0, 0.4, 0),
        ],
        0.45,
    );
    let scores: Vec<f32> = kept.iter().map(|c| c.score).collect();
    assert_eq!(scores, vec![0.9, 0.5, 0.4]);
}

#[test]
fn instance_mask_is_cropped_to_box() {
    // two 4x4 prototypes; coefficients select the first, which is positive everywhere
    let protos = vec![vec![vec![10.0; 4]; 4], vec![vec![-10.0; 4]; 4]];
    let lb = Letterbox::fit(64, 64, 64);
    let bbox = BoundingBox::new(8.0, 8.0, 24.0, 16.0);
    let mask = instance_mask(&[1.0, 0.0], &protos, bbox, &lb, 64, 64).unwrap();
    assert_eq!(mask.dimensions(), (64, 64));
    assert_eq!(mask.get_pixel(10, 10).0[0], 255);
    assert_eq!(mask.get_pixel(30, 10).0[0], 0);
    assert_eq!(mask.get_pixel(10, 20).0[0], 0);

    let empty = instance_mask(&[0.0, 1.0], &protos, bbox, &lb, 64, 64).unwrap();
    assert!(empty.pixels().all(|p| p.0[0] == 0));
}

#[test]
fn instance_mask_checks_coefficient_count() {
    let protos = vec![vec![vec![1.0; 2]; 2]];
    let lb = Letterbox::fit(8, 8, 8);
    let bbox = BoundingBox::new(0.0, 0.0, 8.0, 8.0);
    assert!(instance_mask(&[1.0, 2.0], &protos, bbox, &lb, 8, 8).is_err());
}

#[test]
fn finalize_maps_pose_back_to_frame() {
    // 640x480 frame letterboxed into 640 square: 80px padding on top
    let lb = Letterbox::fit(640, 480, 640);
    let mut extras = Vec::new();
    for i in 0..17 {
        extras.extend_from_slice(&[100.0 + i as f32, 180.0, 0.9]);
    }
    let cand = Candidate {
        bbox: BoundingBox::new(90.0, 170.0, 130.0, 300.0),
        score: 0.8,
        class_id: 0,
        extras,
    };
    let preds = finalize(Mode::Pose, vec![cand], None, &lb, 640, 480, 0.45).unwrap();
    let det = &preds.detections[0];
    assert_eq!(det.bbox, BoundingBox::new(90.0, 90.0, 130.0, 220.0));
    assert_eq!(det.keypoints.len(), 17);
    assert_eq!((det.keypoints[3].x, det.keypoints[3].y), (103.0, 100.0));
    assert!(det.mask.is_none());
}

#[test]
fn finalize_segmentation_needs_prototypes() {
    let lb = Letterbox::fit(64, 64, 64);
    let cand = Candidate {
        bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
        score: 0.8,
        class_id: 2,
        extras: vec![1.0],
    };
    assert!(matches!(
        finalize(Mode::Segmentation, vec![cand], None, &lb, 64, 64, 0.45),
        Err(PipelineError::Inference(_))
    ));
}

#[test]
fn iou_of_identical_and_disjoint_boxes() {
    let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
    assert_eq!(a.iou(&a), 1.0);
    assert_eq!(a.iou(&BoundingBox::new(20.0, 20.0, 30.0, 30.0)), 0.0);
}

#[test]
fn letterbox_tolerates_zero_target() {
    let lb = Letterbox::fit(640, 480, 0);
    assert_eq!(lb.size, 1);
    assert_eq!((lb.resized_width, lb.resized_height), (1, 1));
}
