use crate::mode::Mode;
use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong between picking a model and handing back a
/// processed item. Each variant is terminal for the item it concerns.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to load {mode} model from {path:?}: {reason}")]
    Initialization {
        mode: Mode,
        path: PathBuf,
        reason: String,
    },
    #[error("failed to open media source {uri:?}: {reason}")]
    SourceOpen { uri: String, reason: String },
    #[error("failed to decode frame: {0}")]
    Decode(String),
    #[error("model rejected input: {0}")]
    Inference(String),
    #[error("camera capture failed: {0}")]
    Capture(String),
    #[error("failed to write output video: {0}")]
    Encode(String),
    #[error("unsupported file type: {0}")]
    Unsupported(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub(crate) fn source_open(uri: impl Into<String>, reason: impl ToString) -> Self {
        Self::SourceOpen {
            uri: uri.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<candle_core::Error> for PipelineError {
    fn from(err: candle_core::Error) -> Self {
        Self::Inference(err.to_string())
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
