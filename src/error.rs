use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the pipeline stages.
///
/// The variants fall into the containment classes the queue acts on:
/// per-file (`ColumnIndexOutOfRange`, `ProjectionShapeMismatch`), per-job
/// (`Io`, `Csv`, `Workbook`, `Archive`, `WorkerPool`) and the cooperative
/// `Cancelled`.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Columns ───────────────────────────────────────────────────────────────
    #[error("column {field} at index {index} is out of range for {width} columns")]
    ColumnIndexOutOfRange {
        field: String,
        index: usize,
        width: usize,
    },

    #[error("invalid column label {0:?}")]
    InvalidColumnLabel(String),

    #[error("{} has {actual} columns but {projection} needs {required}", .file.display())]
    ProjectionShapeMismatch {
        file: PathBuf,
        projection: String,
        required: usize,
        actual: usize,
    },

    // ── Input ─────────────────────────────────────────────────────────────────
    #[error("unsupported input {}", .0.display())]
    UnsupportedInput(PathBuf),

    // ── IO ────────────────────────────────────────────────────────────────────
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("worker pool error: {0}")]
    WorkerPool(String),

    // ── Control ───────────────────────────────────────────────────────────────
    #[error("cancellation requested")]
    Cancelled,
}

impl PipelineError {
    /// True for failures that abort the whole job rather than one file.
    pub fn is_io_failure(&self) -> bool {
        matches!(
            self,
            PipelineError::Io(_)
                | PipelineError::Csv(_)
                | PipelineError::Workbook(_)
                | PipelineError::Archive(_)
                | PipelineError::WorkerPool(_)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }
}

impl From<rayon::ThreadPoolBuildError> for PipelineError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        PipelineError::WorkerPool(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
