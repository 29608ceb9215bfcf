// src/config.rs

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;

use crate::process::clean::CleaningPolicy;
use crate::schema::{FieldPositions, ProjectionField, ProjectionSchema, CRM_INBOX, ENRICHMENT};

pub const DEFAULT_SPLIT_THRESHOLD_MB: u64 = 48;

/// Column letters of the semantic fields.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ColumnLabels {
    pub country: String,
    pub language: String,
    pub occupation: String,
    pub industry: String,
}

impl Default for ColumnLabels {
    fn default() -> Self {
        Self {
            country: "W".into(),
            language: "BE".into(),
            occupation: "K".into(),
            industry: "BG".into(),
        }
    }
}

/// Replacement field lists for the two export shapes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProjectionOverrides {
    pub crm_inbox: Option<Vec<ProjectionField>>,
    pub enrichment: Option<Vec<ProjectionField>>,
}

/// On-disk configuration. Every key is optional.
///
/// ```yaml
/// destination: /data/exports
/// split_threshold_mb: 48
/// workers: 4
/// cleaning: structural
/// columns:
///   country: W
/// projections:
///   crm_inbox:
///     - { name: Email, column: A }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub destination: Option<PathBuf>,
    pub split_threshold_mb: u64,
    pub workers: Option<usize>,
    pub cleaning: CleaningPolicy,
    pub exempt_leading_row: bool,
    pub work_root: Option<PathBuf>,
    pub columns: ColumnLabels,
    pub projections: ProjectionOverrides,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            destination: None,
            split_threshold_mb: DEFAULT_SPLIT_THRESHOLD_MB,
            workers: None,
            cleaning: CleaningPolicy::Structural,
            exempt_leading_row: true,
            work_root: None,
            columns: ColumnLabels::default(),
            projections: ProjectionOverrides::default(),
        }
    }
}

impl Config {
    /// Load a YAML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text =
            fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Resolve labels and defaults into the settings the pipeline runs with.
    pub fn resolve(&self) -> Result<Settings> {
        let c = &self.columns;
        let positions =
            FieldPositions::from_labels(&c.country, &c.language, &c.occupation, &c.industry)
                .context("resolving column letters")?;

        let crm_inbox = match &self.projections.crm_inbox {
            Some(fields) => ProjectionSchema::from_labels(&CRM_INBOX.name, &CRM_INBOX.suffix, fields)
                .context("resolving crm_inbox projection")?,
            None => CRM_INBOX.clone(),
        };
        let enrichment = match &self.projections.enrichment {
            Some(fields) => {
                ProjectionSchema::from_labels(&ENRICHMENT.name, &ENRICHMENT.suffix, fields)
                    .context("resolving enrichment projection")?
            }
            None => ENRICHMENT.clone(),
        };

        Ok(Settings {
            destination: self.destination.clone(),
            split_threshold: self.split_threshold_mb.max(1).saturating_mul(1024 * 1024),
            workers: self.workers.unwrap_or_else(default_workers).max(1),
            cleaning: self.cleaning,
            exempt_leading_row: self.exempt_leading_row,
            work_root: self.work_root.clone().unwrap_or_else(std::env::temp_dir),
            positions,
            crm_inbox,
            enrichment,
        })
    }
}

/// Half of the logical CPUs, at least one.
pub fn default_workers() -> usize {
    (num_cpus::get() / 2).max(1)
}

/// Fully resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Archive destination; `None` means the input's parent directory.
    pub destination: Option<PathBuf>,
    /// Split threshold in bytes.
    pub split_threshold: u64,
    pub workers: usize,
    pub cleaning: CleaningPolicy,
    pub exempt_leading_row: bool,
    /// Parent of the per-job and per-bundle temporary directories.
    pub work_root: PathBuf,
    pub positions: FieldPositions,
    pub crm_inbox: ProjectionSchema,
    pub enrichment: ProjectionSchema,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            destination: None,
            split_threshold: DEFAULT_SPLIT_THRESHOLD_MB * 1024 * 1024,
            workers: default_workers(),
            cleaning: CleaningPolicy::Structural,
            exempt_leading_row: true,
            work_root: std::env::temp_dir(),
            positions: FieldPositions::default(),
            crm_inbox: CRM_INBOX.clone(),
            enrichment: ENRICHMENT.clone(),
        }
    }
}

impl Settings {
    /// Where archives for an input queued as `origin` are delivered.
    pub fn destination_for(&self, origin: &Path) -> PathBuf {
        match &self.destination {
            Some(dir) => dir.clone(),
            None => origin
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}
