// src/archive/mod.rs

pub mod bundle;

use std::{
    fs::{self, File},
    io::{self, BufWriter},
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

use crate::error::{PipelineError, Result};

pub use bundle::{expand_bundle, is_bundle, Bundle};

/// Archive name for `dir`: `<basename>_<timestamp>.zip`.
pub fn archive_name(dir: &Path, timestamp: &str) -> String {
    let base = dir
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".to_string());
    format!("{base}_{timestamp}.zip")
}

/// Compresses the regular files directly inside `src_dir` into
/// `<basename>_<timestamp>.zip` and moves the archive into `dest_dir`.
///
/// The archive is built beside `src_dir`, never inside it; subdirectories are
/// not descended into. Members are added in name order.
#[instrument(level = "info", skip(src_dir, dest_dir), fields(src = %src_dir.display()))]
pub fn archive_dir(src_dir: &Path, timestamp: &str, dest_dir: &Path) -> Result<PathBuf> {
    let name = archive_name(src_dir, timestamp);
    let staging_dir = src_dir.parent().unwrap_or(src_dir);
    let staging = staging_dir.join(&name);

    let mut members: Vec<PathBuf> = fs::read_dir(src_dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.path())
        .filter(|p| *p != staging)
        .collect();
    members.sort();

    if let Err(e) = write_archive(&staging, &members) {
        let _ = fs::remove_file(&staging);
        return Err(e);
    }

    let final_path = move_into(&staging, dest_dir)?;
    info!(
        archive = %final_path.display(),
        members = members.len(),
        "archive written"
    );
    Ok(final_path)
}

fn write_archive(path: &Path, members: &[PathBuf]) -> Result<()> {
    let mut zip = ZipWriter::new(BufWriter::new(File::create(path)?));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);

    for member in members {
        let name = member
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| PipelineError::UnsupportedInput(member.clone()))?;
        zip.start_file(name.as_str(), options)?;
        let mut file = File::open(member)?;
        io::copy(&mut file, &mut zip)?;
        debug!(member = %name, "added archive member");
    }
    zip.finish()?;
    Ok(())
}

/// Moves `file` into `dest_dir` (created if absent). An existing file of the
/// same name is kept and the moved file gets a `_<n>` suffix instead. Falls
/// back to copy-and-delete across filesystems.
pub fn move_into(file: &Path, dest_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dest_dir)?;
    let file_name = file
        .file_name()
        .ok_or_else(|| PipelineError::UnsupportedInput(file.to_path_buf()))?;
    let target = free_target(&dest_dir.join(file_name));
    if target.file_name() != Some(file_name) {
        warn!(
            existing = %dest_dir.join(file_name).display(),
            target = %target.display(),
            "archive name taken; using a suffixed name"
        );
    }
    if fs::rename(file, &target).is_err() {
        fs::copy(file, &target)?;
        fs::remove_file(file)?;
    }
    Ok(target)
}

/// `path` itself if nothing exists there, else the first free `<stem>_<n>.<ext>`.
fn free_target(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|s| format!(".{}", s.to_string_lossy()))
        .unwrap_or_default();
    let mut n = 2;
    loop {
        let candidate = path.with_file_name(format!("{stem}_{n}{ext}"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}
