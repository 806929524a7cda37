use crate::annotate::AnnotatedFrame;
use crate::error::Result;
use crate::media::{DisplaySurface, MediaSink};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{trace, warn};

/// In-memory display slot holding at most one frame. Clones share the slot,
/// so a UI can read what a worker pushes.
#[derive(Clone, Default)]
pub struct LatestFrame {
    slot: Arc<Mutex<Option<AnnotatedFrame>>>,
    shown: Arc<AtomicU64>,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<AnnotatedFrame> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Total frames pushed over the slot's lifetime.
    pub fn frames_shown(&self) -> u64 {
        self.shown.load(Ordering::Relaxed)
    }
}

impl MediaSink for LatestFrame {
    fn push(&mut self, frame: AnnotatedFrame) -> Result<()> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
        self.shown.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl DisplaySurface for LatestFrame {
    fn clear(&mut self) {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

/// Display backed by a single image file that is atomically replaced on
/// every frame and removed on clear.
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MediaSink for SnapshotFile {
    fn push(&mut self, frame: AnnotatedFrame) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let ext = self
            .path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_else(|| ".png".to_string());
        let tmp = tempfile::Builder::new()
            .prefix(".visionflow-")
            .suffix(&ext)
            .tempfile_in(&dir)?
            .into_temp_path();
        frame
            .image()
            .save(&tmp)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        trace!(path = %self.path.display(), "display updated");
        Ok(())
    }
}

impl DisplaySurface for SnapshotFile {
    fn clear(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), "failed to clear display: {e}");
            }
        }
    }
}
