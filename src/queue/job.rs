use serde::Serialize;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tempfile::TempDir;

use super::state::Stage;

/// One queued input file.
#[derive(Debug)]
pub struct Job {
    pub id: u64,
    /// The file the pipeline reads.
    pub input: PathBuf,
    /// What the user queued: the input itself, or the bundle it came from.
    /// Default archive destination is this path's parent.
    pub origin: PathBuf,
    /// Keeps a bundle's extraction directory alive while the job is queued.
    _bundle: Option<Arc<TempDir>>,
}

impl Job {
    pub fn new(id: u64, input: PathBuf) -> Self {
        Self {
            id,
            origin: input.clone(),
            input,
            _bundle: None,
        }
    }

    pub fn from_bundle(id: u64, input: PathBuf, origin: &Path, dir: Arc<TempDir>) -> Self {
        Self {
            id,
            input,
            origin: origin.to_path_buf(),
            _bundle: Some(dir),
        }
    }

    pub fn name(&self) -> String {
        self.input
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.input.display().to_string())
    }
}

/// A progress update emitted by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub job: Option<String>,
    pub stage: Option<Stage>,
    pub percent: u8,
    pub status: String,
}

/// Point-in-time view of the queue.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub paused: bool,
    pub current: Option<String>,
    pub stage: Option<Stage>,
    pub percent: u8,
    pub status: String,
    /// Files not yet picked up, in queue order.
    pub queued: Vec<String>,
    pub completed: usize,
    pub failed: usize,
}
