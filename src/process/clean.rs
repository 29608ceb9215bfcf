// src/process/clean.rs

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use super::table::RecordSet;

/// The flagged special-character run exports use as filler.
static SPECIAL_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"#!\$@-").expect("valid regex"));

/// How columns are reduced before partitioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CleaningPolicy {
    /// Drop columns that are entirely blank or carry the flagged run.
    #[default]
    Structural,
    /// Keep even-positioned columns and blank flagged cells.
    #[value(name = "thinning")]
    PositionalThinning,
}

/// A cleaned set plus the original index of every kept column.
#[derive(Debug, Clone)]
pub struct Cleaned {
    pub records: RecordSet,
    pub kept: Vec<usize>,
}

/// Reduces the column count of a record set. Row order is never changed.
#[derive(Debug, Clone, Copy)]
pub struct Cleaner {
    pub policy: CleaningPolicy,
    /// The leading row stays in the output but is not considered when deciding
    /// whether a column is blank or flagged.
    pub exempt_leading_row: bool,
}

impl Cleaner {
    pub fn new(policy: CleaningPolicy, exempt_leading_row: bool) -> Self {
        Self {
            policy,
            exempt_leading_row,
        }
    }

    pub fn clean(&self, records: RecordSet) -> Cleaned {
        let before = records.width();
        let cleaned = match self.policy {
            CleaningPolicy::Structural => self.structural(records),
            CleaningPolicy::PositionalThinning => thin(records),
        };
        debug!(
            policy = ?self.policy,
            before,
            after = cleaned.records.width(),
            "cleaned columns"
        );
        cleaned
    }

    fn structural(&self, records: RecordSet) -> Cleaned {
        let skip = usize::from(self.exempt_leading_row);
        if records.len() <= skip {
            // nothing to evaluate
            let kept: Vec<usize> = (0..records.width()).collect();
            return Cleaned { records, kept };
        }
        let kept: Vec<usize> = (0..records.width())
            .filter(|&col| {
                let mut cells = records.rows().iter().skip(skip).map(|r| r[col].as_str());
                let all_blank = cells.clone().all(|c| c.trim().is_empty());
                let flagged = cells.any(|c| SPECIAL_RUN.is_match(c));
                !all_blank && !flagged
            })
            .collect();
        Cleaned {
            records: records.select_columns(&kept),
            kept,
        }
    }
}

fn thin(records: RecordSet) -> Cleaned {
    let kept: Vec<usize> = (0..records.width()).step_by(2).collect();
    let mut records = records.select_columns(&kept);
    for row in records.rows_mut() {
        for cell in row.iter_mut() {
            if SPECIAL_RUN.is_match(cell) {
                cell.clear();
            }
        }
    }
    Cleaned { records, kept }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::table::Record;

    fn set(rows: &[&[&str]]) -> RecordSet {
        RecordSet::from_rows(
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect::<Record>())
                .collect(),
        )
    }

    #[test]
    fn structural_drops_blank_and_flagged_columns() {
        let input = set(&[
            &["lead", "h1", "h2", "h3"],
            &["a@x.com", "  ", "ok", "#!$@-"],
            &["b@x.com", "", "fine", "y"],
        ]);
        let cleaned = Cleaner::new(CleaningPolicy::Structural, true).clean(input);
        assert_eq!(cleaned.kept, vec![0, 2]);
        assert_eq!(cleaned.records.width(), 2);
        // leading row kept as data
        assert_eq!(cleaned.records.rows()[0], vec!["lead", "h2"]);
        assert_eq!(cleaned.records.len(), 3);
    }

    #[test]
    fn leading_row_counts_when_not_exempt() {
        let input = set(&[&["keep", "x"], &["", "y"]]);
        let exempt = Cleaner::new(CleaningPolicy::Structural, true).clean(input.clone());
        assert_eq!(exempt.kept, vec![1]);

        let counted = Cleaner::new(CleaningPolicy::Structural, false).clean(input);
        assert_eq!(counted.kept, vec![0, 1]);
    }

    #[test]
    fn single_exempt_row_keeps_every_column() {
        let input = set(&[&["US", "", "dev"]]);
        let cleaned = Cleaner::new(CleaningPolicy::Structural, true).clean(input);
        assert_eq!(cleaned.kept, vec![0, 1, 2]);
        assert_eq!(cleaned.records.rows()[0], vec!["US", "", "dev"]);
    }

    #[test]
    fn flag_must_be_the_full_run() {
        let input = set(&[&["h", "h"], &["#!", "a#!$@-b"]]);
        let cleaned = Cleaner::new(CleaningPolicy::Structural, true).clean(input);
        assert_eq!(cleaned.kept, vec![0]);
    }

    #[test]
    fn thinning_keeps_even_columns_and_blanks_flags() {
        let input = set(&[
            &["a", "b", "c", "d", "e"],
            &["#!$@-", "x", "keep", "y", "z#!$@-z"],
        ]);
        let cleaned = Cleaner::new(CleaningPolicy::PositionalThinning, true).clean(input);
        assert_eq!(cleaned.kept, vec![0, 2, 4]);
        assert_eq!(cleaned.records.rows()[0], vec!["a", "c", "e"]);
        assert_eq!(cleaned.records.rows()[1], vec!["", "keep", ""]);
    }
}
