//! Where frames come from and where annotated frames go.

pub mod camera;
pub mod display;
pub mod image_file;
pub mod video;

use crate::annotate::{AnnotatedFrame, Frame};
use crate::error::{PipelineError, Result};
use std::path::Path;

pub use camera::CameraSource;
pub use display::{LatestFrame, SnapshotFile};
pub use image_file::SingleImage;
pub use video::{probe, EncodedVideoSink, FrameRate, VideoArtifact, VideoFileSource, VideoInfo};

/// Produces frames in order. `Ok(None)` means the source is exhausted.
pub trait MediaSource {
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Accepts annotated frames in arrival order.
pub trait MediaSink {
    fn push(&mut self, frame: AnnotatedFrame) -> Result<()>;
}

/// A sink that shows only the most recent frame.
pub trait DisplaySurface: MediaSink {
    fn clear(&mut self);
}

impl<S: MediaSource + ?Sized> MediaSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }
}

impl<S: MediaSink + ?Sized> MediaSink for Box<S> {
    fn push(&mut self, frame: AnnotatedFrame) -> Result<()> {
        (**self).push(frame)
    }
}

impl<S: DisplaySurface + ?Sized> DisplaySurface for Box<S> {
    fn clear(&mut self) {
        (**self).clear()
    }
}

/// What an uploaded file is, judged by its extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub const IMAGE_EXTENSIONS: [&'static str; 3] = ["jpg", "jpeg", "png"];
    pub const VIDEO_EXTENSIONS: [&'static str; 1] = ["mp4"];

    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if Self::IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Ok(Self::Image)
        } else if Self::VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Ok(Self::Video)
        } else {
            Err(PipelineError::Unsupported(path.display().to_string()))
        }
    }
}
