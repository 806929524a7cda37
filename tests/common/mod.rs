#![allow(dead_code)]

use image::{GrayImage, Luma, Rgb, RgbImage};
use std::collections::VecDeque;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use visionflow::media::{MediaSink, MediaSource};
use visionflow::model::{BoundingBox, Detection, Keypoint, Predictions, VisionModel};
use visionflow::{AnnotatedFrame, Frame, Mode, PipelineError};

/// Reports one object in the middle of every frame, shaped for its mode.
pub struct CenterObjectModel {
    pub mode: Mode,
    pub calls: AtomicUsize,
}

impl CenterObjectModel {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn center_box(width: u32, height: u32) -> BoundingBox {
        let (w, h) = (width as f32, height as f32);
        BoundingBox::new(w * 0.25, h * 0.25, w * 0.75, h * 0.75)
    }
}

impl VisionModel for CenterObjectModel {
    fn mode(&self) -> Mode {
        self.mode
    }

    fn predict(&self, frame: &RgbImage) -> Result<Predictions, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (w, h) = frame.dimensions();
        let bbox = Self::center_box(w, h);
        let mut det = Detection::new(bbox, 0.9, 0);
        match self.mode {
            Mode::Detection => {}
            Mode::Segmentation => {
                let mut mask = GrayImage::new(w, h);
                for y in (h / 3)..(2 * h / 3) {
                    for x in (w / 3)..(2 * w / 3) {
                        mask.put_pixel(x, y, Luma([255]));
                    }
                }
                det = det.with_mask(mask);
            }
            Mode::Pose => {
                let cx = w as f32 / 2.0;
                let keypoints = (0..17)
                    .map(|i| Keypoint {
                        x: cx,
                        y: bbox.y1 + i as f32 * bbox.height() / 17.0,
                        confidence: 0.9,
                    })
                    .collect();
                det = det.with_keypoints(keypoints);
            }
        }
        Ok(Predictions::new(vec![det]))
    }
}

/// Finds nothing, so annotated frames equal their sources.
pub struct EmptyModel(pub Mode);

impl VisionModel for EmptyModel {
    fn mode(&self) -> Mode {
        self.0
    }

    fn predict(&self, _frame: &RgbImage) -> Result<Predictions, PipelineError> {
        Ok(Predictions::default())
    }
}

pub struct RejectingModel;

impl VisionModel for RejectingModel {
    fn mode(&self) -> Mode {
        Mode::Detection
    }

    fn predict(&self, frame: &RgbImage) -> Result<Predictions, PipelineError> {
        Err(PipelineError::Inference(format!(
            "cannot handle {:?}",
            frame.dimensions()
        )))
    }
}

pub fn solid_frame(width: u32, height: u32, value: u8) -> Frame {
    RgbImage::from_pixel(width, height, Rgb([value, value, value]))
}

/// Finite in-memory source that records when it is dropped.
pub struct VecSource {
    frames: VecDeque<Frame>,
    pub released: Arc<AtomicBool>,
}

impl VecSource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
            released: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl MediaSource for VecSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, PipelineError> {
        Ok(self.frames.pop_front())
    }
}

impl Drop for VecSource {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Camera stand-in: delivers `good_frames` frames, then fails to capture.
/// `None` means it never fails.
pub struct ScriptedCamera {
    good_frames: Option<u64>,
    produced: u64,
    pub released: Arc<AtomicBool>,
}

impl ScriptedCamera {
    pub fn failing_after(good_frames: u64) -> Self {
        Self {
            good_frames: Some(good_frames),
            produced: 0,
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn endless() -> Self {
        Self {
            good_frames: None,
            produced: 0,
            released: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl MediaSource for ScriptedCamera {
    fn next_frame(&mut self) -> Result<Option<Frame>, PipelineError> {
        if self.good_frames.is_some_and(|n| self.produced >= n) {
            return Err(PipelineError::Capture("device unplugged".into()));
        }
        self.produced += 1;
        std::thread::sleep(std::time::Duration::from_millis(2));
        Ok(Some(solid_frame(64, 48, (self.produced % 250) as u8)))
    }
}

impl Drop for ScriptedCamera {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub frames: Vec<AnnotatedFrame>,
}

impl MediaSink for RecordingSink {
    fn push(&mut self, frame: AnnotatedFrame) -> Result<(), PipelineError> {
        self.frames.push(frame);
        Ok(())
    }
}

/// Video tests skip themselves without `ffmpeg`/`ffprobe`. Setting
/// `VISIONFLOW_REQUIRE_FFMPEG=1` turns the skip into a failure.
pub fn ffmpeg_available() -> bool {
    let found = ["ffmpeg", "ffprobe"].iter().all(|tool| {
        Command::new(tool)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    });
    if !found {
        assert!(
            std::env::var_os("VISIONFLOW_REQUIRE_FFMPEG").is_none(),
            "VISIONFLOW_REQUIRE_FFMPEG is set but ffmpeg/ffprobe are not on PATH"
        );
        eprintln!("ffmpeg/ffprobe not on PATH, skipping video test");
    }
    found
}
