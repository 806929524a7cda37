//! The frame pump and the two ways of driving it: bounded file processing
//! and an unbounded, cancellable camera loop.

use crate::annotate::{AnnotatedFrame, FrameAnnotator};
use crate::error::{PipelineError, Result};
use crate::media::{
    DisplaySurface, EncodedVideoSink, MediaKind, MediaSink, MediaSource, SingleImage,
    VideoArtifact, VideoFileSource,
};
use crate::mode::Mode;
use crate::model::VisionModel;
use crate::registry::{ModelRegistry, SharedModel};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

/// Cooperative stop signal, observed once per frame.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PumpEnd {
    Exhausted,
    Cancelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PumpStats {
    pub frames: u64,
    pub end: PumpEnd,
}

/// Pull, annotate, push until the source runs dry or `cancel` is set.
/// Frames reach the sink in source order, each exactly once.
pub fn pump<S, K>(
    source: &mut S,
    sink: &mut K,
    annotator: &FrameAnnotator,
    model: &dyn VisionModel,
    cancel: &CancelToken,
) -> Result<PumpStats>
where
    S: MediaSource + ?Sized,
    K: MediaSink + ?Sized,
{
    let mut frames = 0;
    loop {
        if cancel.is_cancelled() {
            return Ok(PumpStats {
                frames,
                end: PumpEnd::Cancelled,
            });
        }
        let Some(frame) = source.next_frame()? else {
            return Ok(PumpStats {
                frames,
                end: PumpEnd::Exhausted,
            });
        };
        let annotated = annotator.annotate(&frame, model)?;
        sink.push(annotated)?;
        frames += 1;
    }
}

/// Result of processing one uploaded file.
#[derive(Debug)]
pub enum Processed {
    Image(AnnotatedFrame),
    Video(VideoArtifact),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CameraStop {
    Cancelled,
    /// The device failed to deliver a frame; carries the reason.
    CaptureFailed(String),
    Exhausted,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraReport {
    pub frames: u64,
    pub stop: CameraStop,
}

/// Runs the pump against a live source until cancelled or a capture fails.
/// The source is consumed and released before this returns, and the display
/// is cleared, on every path.
pub fn run_camera<S, D>(
    mut source: S,
    display: &mut D,
    annotator: &FrameAnnotator,
    model: &dyn VisionModel,
    cancel: &CancelToken,
) -> Result<CameraReport>
where
    S: MediaSource,
    D: DisplaySurface + ?Sized,
{
    let mut counted = CountingSink {
        inner: &mut *display,
        frames: 0,
    };
    let outcome = pump(&mut source, &mut counted, annotator, model, cancel);
    let frames = counted.frames;
    drop(source);
    display.clear();

    match outcome {
        Ok(stats) => {
            let stop = match stats.end {
                PumpEnd::Cancelled => CameraStop::Cancelled,
                PumpEnd::Exhausted => CameraStop::Exhausted,
            };
            info!(frames, ?stop, "camera stopped");
            Ok(CameraReport { frames, stop })
        }
        Err(PipelineError::Capture(reason)) => {
            warn!(frames, "camera capture failed: {reason}");
            Ok(CameraReport {
                frames,
                stop: CameraStop::CaptureFailed(reason),
            })
        }
        Err(e) => Err(e),
    }
}

struct CountingSink<'a, D: ?Sized> {
    inner: &'a mut D,
    frames: u64,
}

impl<D: MediaSink + ?Sized> MediaSink for CountingSink<'_, D> {
    fn push(&mut self, frame: AnnotatedFrame) -> Result<()> {
        self.inner.push(frame)?;
        self.frames += 1;
        Ok(())
    }
}

/// A camera loop running on its own thread.
pub struct CameraHandle {
    cancel: CancelToken,
    worker: JoinHandle<Result<CameraReport>>,
}

impl CameraHandle {
    /// Requests a stop; takes effect at the next frame boundary.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    pub fn join(self) -> Result<CameraReport> {
        self.worker
            .join()
            .unwrap_or_else(|_| Err(PipelineError::Capture("camera worker panicked".into())))
    }
}

/// Binds a mode's model, the annotator and the registry for one session.
pub struct MediaPipeline {
    mode: Mode,
    model: SharedModel,
    annotator: FrameAnnotator,
}

impl MediaPipeline {
    pub fn new(registry: &ModelRegistry, mode: Mode, annotator: FrameAnnotator) -> Result<Self> {
        let model = registry.resolve(mode)?;
        Ok(Self {
            mode,
            model,
            annotator,
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn annotate_image(&self, path: &Path) -> Result<AnnotatedFrame> {
        let mut source = SingleImage::open(path)?;
        let frame = source
            .next_frame()?
            .ok_or_else(|| PipelineError::Decode("image produced no frame".into()))?;
        self.annotator.annotate(&frame, self.model.as_ref())
    }

    /// Re-encodes `path` with every frame annotated. Nothing is created on
    /// disk unless the source opens successfully.
    pub fn process_video(&self, path: &Path) -> Result<VideoArtifact> {
        let mut source = VideoFileSource::open(path)?;
        let info = source.info();
        let mut sink = EncodedVideoSink::create(info.width, info.height, info.frame_rate)?;
        let stats = pump(
            &mut source,
            &mut sink,
            &self.annotator,
            self.model.as_ref(),
            &CancelToken::new(),
        )?;
        drop(source);
        debug!(path = %path.display(), frames = stats.frames, "video pumped");
        if let Some(expected) = info.frame_count.filter(|&n| stats.frames < n) {
            return Err(PipelineError::source_open(
                path.display().to_string(),
                format!("truncated: decoded {} of {expected} frames", stats.frames),
            ));
        }
        sink.finish(download_name(path))
    }

    pub fn process_file(&self, path: &Path) -> Result<Processed> {
        match MediaKind::from_path(path)? {
            MediaKind::Image => self.annotate_image(path).map(Processed::Image),
            MediaKind::Video => self.process_video(path).map(Processed::Video),
        }
    }

    /// Starts a camera loop on a worker thread. The source is opened on the
    /// worker so devices that cannot cross threads still work.
    pub fn spawn_camera<S, F, D>(&self, open: F, mut display: D) -> CameraHandle
    where
        S: MediaSource,
        F: FnOnce() -> Result<S> + Send + 'static,
        D: DisplaySurface + Send + 'static,
    {
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let model = self.model.clone();
        let annotator = self.annotator;
        let worker = std::thread::spawn(move || {
            let source = open()?;
            debug!("camera worker started");
            run_camera(source, &mut display, &annotator, model.as_ref(), &token)
        });
        CameraHandle { cancel, worker }
    }
}

/// Name a processed upload is offered under.
pub fn download_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video.mp4".to_string());
    format!("processed_{name}")
}
