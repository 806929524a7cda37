pub mod annotate;
pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod media;
pub mod mode;
pub mod model;
pub mod pipeline;
pub mod registry;

pub use annotate::{AnnotatedFrame, AnnotationStyle, Frame, FrameAnnotator};
pub use cli::{execute, run_cli, Cli, Commands};
pub use error::PipelineError;
pub use mode::Mode;
pub use pipeline::{pump, run_camera, CameraReport, CameraStop, CancelToken, MediaPipeline, Processed};
pub use registry::{ModelLoader, ModelRegistry, SharedModel};
