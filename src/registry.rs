use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::mode::Mode;
use crate::model::{InferenceOptions, VisionModel, YoloOnnx};
use hf_hub::api::sync::Api;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

pub type SharedModel = Arc<dyn VisionModel>;

/// Produces a model for a mode. Called at most once per mode by the registry.
pub trait ModelLoader: Send + Sync {
    fn load(&self, mode: Mode) -> Result<SharedModel>;
}

impl<F> ModelLoader for F
where
    F: Fn(Mode) -> Result<SharedModel> + Send + Sync,
{
    fn load(&self, mode: Mode) -> Result<SharedModel> {
        self(mode)
    }
}

/// Owns one model per [`Mode`], loading each on first use and handing out
/// shared handles afterwards.
pub struct ModelRegistry {
    loader: Box<dyn ModelLoader>,
    models: Mutex<HashMap<Mode, SharedModel>>,
}

impl ModelRegistry {
    pub fn new(loader: impl ModelLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            models: Mutex::new(HashMap::new()),
        }
    }

    /// Registry backed by ONNX weights located through `cfg`.
    pub fn from_config(cfg: &Config) -> Self {
        Self::new(OnnxLoader::new(cfg))
    }

    /// Loads every mode now so the first interactive request does not pay
    /// the load latency. Keeps all three models resident.
    pub fn warm(&self) -> Result<()> {
        for mode in Mode::ALL {
            self.resolve(mode)?;
        }
        info!("all models loaded");
        Ok(())
    }

    pub fn resolve(&self, mode: Mode) -> Result<SharedModel> {
        let mut models = self.models.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(model) = models.get(&mode) {
            return Ok(model.clone());
        }
        debug!(%mode, "loading model");
        let model = self.loader.load(mode)?;
        models.insert(mode, model.clone());
        Ok(model)
    }

    pub fn is_loaded(&self, mode: Mode) -> bool {
        self.models
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&mode)
    }
}

/// Loads YOLO ONNX exports from disk, fetching them from the Hugging Face
/// hub when a repository is configured and the file is not present locally.
pub struct OnnxLoader {
    paths: HashMap<Mode, PathBuf>,
    repo: Option<String>,
    options: InferenceOptions,
}

impl OnnxLoader {
    pub fn new(cfg: &Config) -> Self {
        let paths = Mode::ALL
            .into_iter()
            .map(|m| (m, cfg.models.for_mode(m).clone()))
            .collect();
        Self {
            paths,
            repo: cfg.model_repo.clone(),
            options: InferenceOptions::from(cfg),
        }
    }
}

impl ModelLoader for OnnxLoader {
    fn load(&self, mode: Mode) -> Result<SharedModel> {
        let configured = self.paths.get(&mode).cloned().unwrap_or_default();
        let path = locate_weights(mode, &configured, self.repo.as_deref())?;
        Ok(Arc::new(YoloOnnx::load(mode, &path, self.options)?))
    }
}

fn locate_weights(mode: Mode, path: &Path, repo: Option<&str>) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    let init_err = |reason: String| PipelineError::Initialization {
        mode,
        path: path.to_path_buf(),
        reason,
    };
    let Some(repo) = repo else {
        return Err(init_err("weights not found and no model repository configured".into()));
    };
    let filename = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .ok_or_else(|| init_err("weights path has no file name".into()))?;
    debug!(%mode, repo, filename = %filename, "fetching weights from hub");
    Api::new()
        .and_then(|api| api.model(repo.to_string()).get(&filename))
        .map_err(|e| init_err(format!("download from {repo} failed: {e}")))
}
