use crate::annotate::Frame;
use crate::error::{PipelineError, Result};
use crate::media::MediaSource;
use nokhwa::{
    pixel_format::RgbFormat,
    utils::{CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType},
    Camera,
};
use tracing::{debug, warn};

const PREFERRED_SIZES: [(u32, u32); 2] = [(1280, 720), (640, 480)];
const PREFERRED_FORMATS: [FrameFormat; 3] = [FrameFormat::RAWRGB, FrameFormat::MJPEG, FrameFormat::YUYV];

/// A live camera. Never exhausted; every pull blocks until the device
/// delivers a frame or fails.
pub struct CameraSource {
    camera: Camera,
    index: u32,
}

impl CameraSource {
    pub fn open(index: u32) -> Result<Self> {
        let uri = format!("camera #{index}");
        let mut camera = negotiate(index).ok_or_else(|| {
            PipelineError::source_open(&uri, "no usable capture format")
        })?;
        camera
            .open_stream()
            .map_err(|e| PipelineError::source_open(&uri, e))?;
        debug!(index, format = ?camera.camera_format(), "camera stream opened");
        Ok(Self { camera, index })
    }
}

fn negotiate(index: u32) -> Option<Camera> {
    for (w, h) in PREFERRED_SIZES {
        for fmt in PREFERRED_FORMATS {
            let req = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
                CameraFormat::new_from(w, h, fmt, 30),
            ));
            if let Ok(cam) = Camera::new(CameraIndex::Index(index), req) {
                return Some(cam);
            }
        }
    }
    let fallback = RequestedFormat::new::<RgbFormat>(RequestedFormatType::None);
    Camera::new(CameraIndex::Index(index), fallback).ok()
}

impl MediaSource for CameraSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let buffer = self
            .camera
            .frame()
            .map_err(|e| PipelineError::Capture(e.to_string()))?;
        let frame = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| PipelineError::Capture(e.to_string()))?;
        Ok(Some(frame))
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            warn!(index = self.index, "failed to stop camera stream: {e}");
        }
        debug!(index = self.index, "camera released");
    }
}
