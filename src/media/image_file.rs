use crate::annotate::Frame;
use crate::error::{PipelineError, Result};
use crate::media::MediaSource;
use image::{ImageError, ImageReader};
use std::path::Path;

/// A still image that yields exactly one frame.
pub struct SingleImage {
    frame: Option<Frame>,
}

impl SingleImage {
    pub fn open(path: &Path) -> Result<Self> {
        let uri = path.display().to_string();
        let reader = ImageReader::open(path)
            .and_then(|r| r.with_guessed_format())
            .map_err(|e| PipelineError::source_open(&uri, e))?;
        if reader.format().is_none() {
            return Err(PipelineError::source_open(&uri, "unrecognised image format"));
        }
        let frame = reader.decode().map_err(|e| match e {
            ImageError::Decoding(_) | ImageError::Limits(_) => PipelineError::Decode(e.to_string()),
            other => PipelineError::source_open(&uri, other),
        })?;
        Ok(Self::from_frame(frame.into_rgb8()))
    }

    pub fn from_frame(frame: Frame) -> Self {
        Self { frame: Some(frame) }
    }
}

impl MediaSource for SingleImage {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        Ok(self.frame.take())
    }
}
