use crate::error::{PipelineError, Result};
use crate::pipeline::{MediaPipeline, Processed};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Expands directories into their regular files, sorted by path. Other
/// inputs are passed through untouched.
pub fn collect_inputs(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for input in inputs {
        if input.is_dir() {
            out.extend(list_dir(input));
        } else {
            out.push(input.clone());
        }
    }
    out
}

fn list_dir(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(rd) => {
            let mut paths: Vec<PathBuf> = rd
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file())
                .collect();
            paths.sort();
            if paths.is_empty() {
                warn!("no files found in {}", dir.display());
            }
            paths
        }
        Err(e) => {
            error!("failed to read {}: {e}", dir.display());
            Vec::new()
        }
    }
}

pub struct ItemOutcome {
    pub input: PathBuf,
    pub result: Result<Processed>,
}

impl ItemOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self.result, Err(PipelineError::Unsupported(_)))
    }
}

/// Processes every input in order. A failing item is recorded and the batch
/// moves on; unsupported file types are skipped with a warning.
pub fn process_batch(pipeline: &MediaPipeline, inputs: &[PathBuf]) -> Vec<ItemOutcome> {
    inputs
        .iter()
        .map(|input| {
            debug!(path = %input.display(), mode = %pipeline.mode(), "processing item");
            let result = pipeline.process_file(input);
            match &result {
                Err(PipelineError::Unsupported(_)) => {
                    warn!("unsupported file type: {}", input.display())
                }
                Err(e) => error!(path = %input.display(), "processing failed: {e}"),
                Ok(_) => {}
            }
            ItemOutcome {
                input: input.clone(),
                result,
            }
        })
        .collect()
}
