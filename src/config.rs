use crate::mode::Mode;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelPaths {
    pub detection: PathBuf,
    pub segmentation: PathBuf,
    pub pose: PathBuf,
}

impl Default for ModelPaths {
    fn default() -> Self {
        Self {
            detection: PathBuf::from("models/yolo11n.onnx"),
            segmentation: PathBuf::from("models/yolo11n-seg.onnx"),
            pose: PathBuf::from("models/yolo11n-pose.onnx"),
        }
    }
}

impl ModelPaths {
    pub fn for_mode(&self, mode: Mode) -> &PathBuf {
        match mode {
            Mode::Detection => &self.detection,
            Mode::Segmentation => &self.segmentation,
            Mode::Pose => &self.pose,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub models: ModelPaths,
    /// Hugging Face repository to fetch missing weights from.
    pub model_repo: Option<String>,
    pub confidence: f32,
    pub iou: f32,
    pub input_size: u32,
    pub mask_alpha: f32,
    pub line_thickness: u32,
    pub camera_index: u32,
    pub output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            models: ModelPaths::default(),
            model_repo: None,
            confidence: 0.25,
            iou: 0.45,
            input_size: 640,
            mask_alpha: 0.45,
            line_thickness: 2,
            camera_index: 0,
            output_dir: PathBuf::from("."),
        }
    }
}

pub fn config_path() -> PathBuf {
    env::var_os("VISIONFLOW_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("visionflow.json"))
}

/// Reads the configuration file if there is one, then applies the weight
/// location overrides from the environment. Never writes anything back.
pub fn load_config() -> Config {
    load_config_from(&config_path())
}

pub fn load_config_from(path: &Path) -> Config {
    let mut cfg = match fs::read(path) {
        Ok(data) => match serde_json::from_slice(&data) {
            Ok(cfg) => {
                debug!(path = %path.display(), "loaded configuration");
                cfg
            }
            Err(e) => {
                warn!(path = %path.display(), "ignoring invalid configuration: {e}");
                Config::default()
            }
        },
        Err(_) => Config::default(),
    };
    apply_env_overrides(&mut cfg);
    cfg
}

fn apply_env_overrides(cfg: &mut Config) {
    if let Some(p) = env::var_os("VISIONFLOW_DETECTION_MODEL") {
        cfg.models.detection = PathBuf::from(p);
    }
    if let Some(p) = env::var_os("VISIONFLOW_SEGMENTATION_MODEL") {
        cfg.models.segmentation = PathBuf::from(p);
    }
    if let Some(p) = env::var_os("VISIONFLOW_POSE_MODEL") {
        cfg.models.pose = PathBuf::from(p);
    }
    if let Ok(repo) = env::var("VISIONFLOW_MODEL_REPO") {
        if !repo.is_empty() {
            cfg.model_repo = Some(repo);
        }
    }
}
