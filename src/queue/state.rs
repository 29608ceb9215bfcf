use serde::Serialize;

/// Where a job is in the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Stage {
    Queued,
    Reading,
    Partitioning,
    Archiving1,
    FilteringA,
    Archiving2,
    FilteringB,
    Archiving3,
    Splitting,
    Done,
    Failed,
    Cancelled,
}

impl Stage {
    pub fn as_str(&self) -> &str {
        match self {
            Stage::Queued => "Queued",
            Stage::Reading => "Reading",
            Stage::Partitioning => "Partitioning",
            Stage::Archiving1 => "Archiving1",
            Stage::FilteringA => "FilteringA",
            Stage::Archiving2 => "Archiving2",
            Stage::FilteringB => "FilteringB",
            Stage::Archiving3 => "Archiving3",
            Stage::Splitting => "Splitting",
            Stage::Done => "Done",
            Stage::Failed => "Failed",
            Stage::Cancelled => "Cancelled",
        }
    }

    /// Progress band (start, end) in percent.
    pub fn band(&self) -> (u8, u8) {
        match self {
            Stage::Queued => (0, 0),
            Stage::Reading => (0, 10),
            Stage::Partitioning => (10, 55),
            Stage::Archiving1 => (55, 55),
            Stage::FilteringA => (55, 75),
            Stage::Archiving2 => (75, 75),
            Stage::FilteringB => (75, 95),
            Stage::Archiving3 => (95, 95),
            Stage::Done => (100, 100),
            // reported with the percentage of the archive step it precedes
            Stage::Splitting | Stage::Failed | Stage::Cancelled => (0, 0),
        }
    }

    /// Scales `fraction` of this stage into an overall percentage.
    pub fn percent(&self, fraction: f64) -> u8 {
        let (lo, hi) = self.band();
        let f = fraction.clamp(0.0, 1.0);
        lo + ((hi - lo) as f64 * f).round() as u8
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
