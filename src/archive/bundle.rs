use std::{
    collections::HashSet,
    fs::File,
    io::{self, BufWriter},
    path::{Path, PathBuf},
    sync::Arc,
};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::error::Result;
use crate::read;

/// Spreadsheets extracted from one input bundle.
///
/// The extraction directory is shared by every job queued from the bundle and
/// is removed when the last of them drops its handle.
#[derive(Debug)]
pub struct Bundle {
    pub dir: Arc<TempDir>,
    pub files: Vec<PathBuf>,
}

pub fn is_bundle(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("zip"))
}

/// Expands the supported record files of `zip_path` into a fresh temporary
/// directory under `work_root`.
///
/// Entry paths are flattened to their file names; entries that would escape
/// the directory, and files no reader supports, are skipped.
pub fn expand_bundle(zip_path: &Path, work_root: &Path) -> Result<Bundle> {
    let mut archive = ZipArchive::new(File::open(zip_path)?)?;
    let dir = tempfile::Builder::new()
        .prefix("bundle-")
        .tempdir_in(work_root)?;

    let mut files = Vec::new();
    let mut seen = HashSet::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if !entry.is_file() {
            continue;
        }
        let Some(enclosed) = entry.enclosed_name() else {
            warn!(entry = entry.name(), "skipping unsafe bundle entry");
            continue;
        };
        let Some(file_name) = enclosed.file_name().map(|s| s.to_os_string()) else {
            continue;
        };
        let target = dir.path().join(&file_name);
        if !read::is_supported(&target) {
            debug!(entry = entry.name(), "skipping unsupported bundle entry");
            continue;
        }
        if !seen.insert(file_name.clone()) {
            warn!(entry = entry.name(), "skipping duplicate file name in bundle");
            continue;
        }

        let mut out = BufWriter::new(File::create(&target)?);
        io::copy(&mut entry, &mut out)?;
        files.push(target);
    }
    files.sort();

    info!(
        bundle = %zip_path.display(),
        files = files.len(),
        "expanded bundle"
    );
    Ok(Bundle {
        dir: Arc::new(dir),
        files,
    })
}
