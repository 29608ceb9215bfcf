// src/read/mod.rs

//! Sequential record readers.
//!
//! The pipeline only needs rows in order; how cells come off disk is behind
//! [`RecordReader`]. Delimited text exports and Excel/OpenDocument workbooks
//! are supported.

pub mod delimited;
pub mod workbook;

use std::path::Path;

use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::process::pool::CancelToken;
use crate::process::table::{Record, RecordSet};

pub use delimited::DelimitedReader;
pub use workbook::WorkbookReader;

/// Rows checked between cancellation polls and progress reports.
const REPORT_EVERY: usize = 10_000;

/// A supplied sequential record reader. Row 0 is data, never a header.
pub trait RecordReader {
    /// Next record, or `None` at end of input.
    fn read_record(&mut self) -> Result<Option<Record>>;

    /// Fraction of the input consumed so far, when the reader can tell.
    fn fraction_read(&self) -> Option<f64> {
        None
    }
}

/// True if `path` has an extension a reader exists for.
pub fn is_supported(path: &Path) -> bool {
    WorkbookReader::is_workbook(path) || DelimitedReader::delimiter_for(path).is_some()
}

/// Opens the reader matching the file's extension.
pub fn open_reader(path: &Path) -> Result<Box<dyn RecordReader + Send>> {
    if WorkbookReader::is_workbook(path) {
        return Ok(Box::new(WorkbookReader::open(path)?));
    }
    match DelimitedReader::delimiter_for(path) {
        Some(delimiter) => Ok(Box::new(DelimitedReader::open(path, delimiter)?)),
        None => Err(PipelineError::UnsupportedInput(path.to_path_buf())),
    }
}

/// Drains `reader` into a [`RecordSet`], reporting the consumed fraction.
pub fn load_record_set(
    reader: &mut dyn RecordReader,
    cancel: &CancelToken,
    mut on_progress: impl FnMut(f64),
) -> Result<RecordSet> {
    let mut rows = Vec::new();
    while let Some(record) = reader.read_record()? {
        rows.push(record);
        if rows.len() % REPORT_EVERY == 0 {
            cancel.check()?;
            if let Some(fraction) = reader.fraction_read() {
                on_progress(fraction);
            }
        }
    }
    on_progress(1.0);

    let set = RecordSet::from_rows(rows);
    debug!(rows = set.len(), width = set.width(), "loaded records");
    Ok(set)
}

/// Logs a warning when the input is unlikely to fit in available memory.
pub fn check_memory_headroom(path: &Path) {
    let Ok(meta) = std::fs::metadata(path) else {
        return;
    };
    let mut sys = sysinfo::System::new();
    sys.refresh_memory();
    let available = sys.available_memory();
    // parsed rows take several times the raw size
    if available > 0 && meta.len().saturating_mul(3) > available {
        warn!(
            file = %path.display(),
            size = meta.len(),
            available,
            "input may not fit in available memory"
        );
    }
}
