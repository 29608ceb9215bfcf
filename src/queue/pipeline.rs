// src/queue/pipeline.rs

use chrono::Local;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};
use tracing::{info, instrument, warn};

use super::{job::Job, state::Stage};
use crate::archive::archive_dir;
use crate::config::Settings;
use crate::error::{PipelineError, Result};
use crate::process::{
    clean::Cleaner,
    partition::{group_by_country, write_partition, PartitionUnit},
    pool::{CancelToken, StagePool, UnitOutcome},
    project::{list_csv_files, project_file, ProjectionUnit},
    split::split_oversized,
};
use crate::read;
use crate::schema::{NamedView, ProjectionSchema};

/// Timestamp shared by every archive of one job.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%3f";

/// The driver side of a running job: pause gate, cancellation and progress.
pub trait StageHooks {
    /// Waits while paused; fails with `Cancelled` once a stop was requested.
    fn checkpoint(&mut self) -> Result<()>;

    fn report(&mut self, stage: Stage, percent: u8);

    fn cancel_token(&self) -> CancelToken;
}

/// What one finished job produced.
#[derive(Debug, Clone, Default)]
pub struct JobReport {
    pub partitions: usize,
    /// Archives delivered to the destination, in stage order.
    pub archives: Vec<PathBuf>,
    /// Partition files a projection skipped for being too narrow.
    pub skipped: Vec<PathBuf>,
    pub split_files: usize,
}

/// Status text for a job that ended with `err` while in `stage`.
pub fn failure_status(err: &PipelineError, stage: Stage) -> String {
    match err {
        PipelineError::Cancelled => "Stopped".to_string(),
        PipelineError::ColumnIndexOutOfRange { .. } => "Column index error".to_string(),
        e if e.is_io_failure() && matches!(stage, Stage::FilteringA | Stage::FilteringB) => {
            format!("Error during filtering: {err}")
        }
        _ => format!("Error: {err}"),
    }
}

/// Runs every stage of `job`. The job's working directory lives under
/// `settings.work_root` and is removed however this returns.
#[instrument(level = "info", skip_all, fields(job = job.id, input = %job.input.display()))]
pub fn run_job(job: &Job, settings: &Settings, hooks: &mut dyn StageHooks) -> Result<JobReport> {
    let start = Instant::now();
    hooks.checkpoint()?;

    let work = tempfile::Builder::new()
        .prefix("job-")
        .tempdir_in(&settings.work_root)?;
    let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
    let dest = settings.destination_for(&job.origin);
    let cancel = hooks.cancel_token();
    let mut report = JobReport::default();

    // ── Reading ──────────────────────────────────────────────────────────────
    hooks.report(Stage::Reading, Stage::Reading.percent(0.0));
    read::check_memory_headroom(&job.input);
    let mut reader = read::open_reader(&job.input)?;
    let records = read::load_record_set(reader.as_mut(), &cancel, |fraction| {
        hooks.report(Stage::Reading, Stage::Reading.percent(fraction))
    })?;
    drop(reader);

    let view = NamedView::resolve(&settings.positions, records.width())?;
    let cleaned = Cleaner::new(settings.cleaning, settings.exempt_leading_row).clean(records);
    let view = view.rebase(&cleaned.kept);
    let header = Arc::new(view.header(cleaned.records.width()));

    // ── Partitioning ─────────────────────────────────────────────────────────
    hooks.checkpoint()?;
    hooks.report(Stage::Partitioning, Stage::Partitioning.percent(0.0));
    let processed = work.path().join("processed");
    fs::create_dir_all(&processed)?;

    let units: Vec<PartitionUnit> = group_by_country(cleaned.records, &view)
        .into_iter()
        .map(|partition| PartitionUnit {
            partition,
            header: Arc::clone(&header),
            view,
            out_dir: processed.clone(),
        })
        .collect();
    report.partitions = units.len();

    let outcomes = StagePool::new("partition", settings.workers, cancel.clone()).run(
        units,
        write_partition,
        |done, total| {
            hooks.report(
                Stage::Partitioning,
                Stage::Partitioning.percent(done as f64 / total as f64),
            )
        },
    )?;
    for outcome in outcomes {
        if let UnitOutcome::Failed(e) = outcome {
            return Err(e);
        }
    }
    info!(partitions = report.partitions, "partitions written");

    let archive = split_and_archive(
        &processed,
        Stage::Archiving1,
        settings,
        &timestamp,
        &dest,
        hooks,
        &mut report,
    )?;
    report.archives.push(archive);

    // ── Projections ──────────────────────────────────────────────────────────
    for (schema, stage, archive_stage) in [
        (&settings.crm_inbox, Stage::FilteringA, Stage::Archiving2),
        (&settings.enrichment, Stage::FilteringB, Stage::Archiving3),
    ] {
        let out_dir = work.path().join(&schema.name);
        fs::create_dir_all(&out_dir)?;
        project_stage(schema, &processed, &out_dir, stage, settings, hooks, &mut report)?;
        let archive = split_and_archive(
            &out_dir,
            archive_stage,
            settings,
            &timestamp,
            &dest,
            hooks,
            &mut report,
        )?;
        report.archives.push(archive);
    }

    hooks.report(Stage::Done, Stage::Done.percent(1.0));
    info!(
        archives = report.archives.len(),
        skipped = report.skipped.len(),
        elapsed = ?start.elapsed(),
        "job finished"
    );
    Ok(report)
}

/// Applies `schema` to every partition file, one unit per file. Files too
/// narrow for the schema are skipped; any other failure aborts the job.
fn project_stage(
    schema: &ProjectionSchema,
    input_dir: &Path,
    out_dir: &Path,
    stage: Stage,
    settings: &Settings,
    hooks: &mut dyn StageHooks,
    report: &mut JobReport,
) -> Result<()> {
    hooks.checkpoint()?;
    hooks.report(stage, stage.percent(0.0));

    let schema = Arc::new(schema.clone());
    let units: Vec<ProjectionUnit> = list_csv_files(input_dir)?
        .into_iter()
        .map(|input| ProjectionUnit {
            schema: Arc::clone(&schema),
            input,
            out_dir: out_dir.to_path_buf(),
        })
        .collect();
    let inputs: Vec<PathBuf> = units.iter().map(|u| u.input.clone()).collect();

    let outcomes = StagePool::new("projection", settings.workers, hooks.cancel_token()).run(
        units,
        project_file,
        |done, total| hooks.report(stage, stage.percent(done as f64 / total as f64)),
    )?;

    let mut written = 0usize;
    for (input, outcome) in inputs.into_iter().zip(outcomes) {
        match outcome {
            UnitOutcome::Done(_) => written += 1,
            UnitOutcome::Failed(e @ PipelineError::ProjectionShapeMismatch { .. }) => {
                warn!(projection = %schema.name, error = %e, "skipping file");
                report.skipped.push(input);
            }
            UnitOutcome::Failed(e) => return Err(e),
            UnitOutcome::Skipped => {}
        }
    }
    info!(projection = %schema.name, written, "projection finished");
    Ok(())
}

/// Splits oversized files in `dir`, then archives it into `dest`.
fn split_and_archive(
    dir: &Path,
    stage: Stage,
    settings: &Settings,
    timestamp: &str,
    dest: &Path,
    hooks: &mut dyn StageHooks,
    report: &mut JobReport,
) -> Result<PathBuf> {
    let percent = stage.percent(1.0);

    hooks.checkpoint()?;
    hooks.report(Stage::Splitting, percent);
    report.split_files += split_oversized(dir, settings.split_threshold)?.len();

    hooks.checkpoint()?;
    hooks.report(stage, percent);
    archive_dir(dir, timestamp, dest)
}
