use crate::annotate::{AnnotationStyle, FrameAnnotator};
use crate::batch::{collect_inputs, process_batch};
use crate::config::{load_config, load_config_from, Config};
use crate::media::{CameraSource, SnapshotFile};
use crate::mode::Mode;
use crate::pipeline::{CameraStop, CancelToken, MediaPipeline, Processed};
use crate::registry::ModelRegistry;
use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "visionflow",
    version,
    about = "Object detection, segmentation and pose estimation on images, videos and cameras"
)]
pub struct Cli {
    /// Vision task to run
    #[arg(short, long, value_enum, default_value_t = Mode::Detection, global = true)]
    pub mode: Mode,
    /// Configuration file, overrides VISIONFLOW_CONFIG
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Annotate image and video files
    Process {
        /// Files or directories to process
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Where annotated images and processed videos are written
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Run live predictions on a camera until Enter is pressed
    Camera {
        /// Camera device index
        #[arg(short, long)]
        index: Option<u32>,
        /// Image file that always holds the latest annotated frame
        #[arg(short, long, default_value = "camera.png")]
        display: PathBuf,
    },
}

pub fn run_cli() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();
    execute(cli)
}

pub fn execute(cli: Cli) -> ExitCode {
    let cfg = match &cli.config {
        Some(path) => load_config_from(path),
        None => load_config(),
    };
    let registry = ModelRegistry::from_config(&cfg);
    if let Err(e) = registry.warm() {
        error!("{e}");
        return ExitCode::FAILURE;
    }
    let annotator = FrameAnnotator::new(AnnotationStyle::from(&cfg));
    let pipeline = match MediaPipeline::new(&registry, cli.mode, annotator) {
        Ok(p) => p,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    info!(mode = %cli.mode, "mode selected");

    match cli.command {
        Commands::Process { inputs, out } => {
            let out = out.unwrap_or_else(|| cfg.output_dir.clone());
            process(&pipeline, &inputs, &out);
        }
        Commands::Camera { index, display } => camera(&pipeline, &cfg, index, display),
    }
    ExitCode::SUCCESS
}

fn process(pipeline: &MediaPipeline, inputs: &[PathBuf], out: &Path) {
    let inputs = collect_inputs(inputs);
    for item in process_batch(pipeline, &inputs) {
        match item.result {
            Ok(Processed::Image(frame)) => {
                let dest = out.join(annotated_name(&item.input));
                let saved = std::fs::create_dir_all(out)
                    .map_err(|e| e.to_string())
                    .and_then(|_| frame.image().save(&dest).map_err(|e| e.to_string()));
                match saved {
                    Ok(()) => println!("{}", dest.display()),
                    Err(e) => error!(path = %dest.display(), "failed to save annotated image: {e}"),
                }
            }
            Ok(Processed::Video(artifact)) => {
                info!(frames = artifact.frames(), "video processing completed");
                match artifact.persist_to(out) {
                    Ok(dest) => println!("{}", dest.display()),
                    Err(e) => error!("failed to save processed video: {e}"),
                }
            }
            Err(_) => {}
        }
    }
}

fn annotated_name(input: &Path) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    format!("annotated_{stem}.png")
}

fn camera(pipeline: &MediaPipeline, cfg: &Config, index: Option<u32>, display: PathBuf) {
    let index = index.unwrap_or(cfg.camera_index);
    info!(display = %display.display(), "starting camera #{index}, press Enter to stop");
    let handle = pipeline.spawn_camera(move || CameraSource::open(index), SnapshotFile::new(display));

    let token = handle.token();
    std::thread::spawn(move || stop_on_enter(std::io::stdin().lock(), &token));

    match handle.join() {
        Ok(report) => match report.stop {
            CameraStop::CaptureFailed(reason) => {
                warn!(frames = report.frames, "failed to access the camera: {reason}")
            }
            stop => info!(frames = report.frames, ?stop, "camera closed"),
        },
        Err(e) => error!("{e}"),
    }
}

/// Cancels `token` once a line arrives on `input`. A closed or unreadable
/// input leaves the camera running.
pub fn stop_on_enter(mut input: impl BufRead, token: &CancelToken) {
    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(n) if n > 0 => token.cancel(),
        Ok(_) => debug!("stdin closed, camera runs until capture stops"),
        Err(e) => warn!("cannot read stdin, camera runs until capture stops: {e}"),
    }
}
