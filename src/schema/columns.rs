// src/schema/columns.rs

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Converts a spreadsheet column label ("A", "W", "BE") into a zero-based index.
///
/// Letters are read as base-26 digits with A=1, so "A" is 0, "Z" is 25 and
/// "AA" is 26. Lower-case labels are accepted.
pub fn excel_col_to_index(label: &str) -> Result<usize> {
    let label = label.trim();
    if label.is_empty() {
        return Err(PipelineError::InvalidColumnLabel(label.to_string()));
    }

    let mut index: usize = 0;
    for ch in label.chars() {
        if !ch.is_ascii_alphabetic() {
            return Err(PipelineError::InvalidColumnLabel(label.to_string()));
        }
        let digit = (ch.to_ascii_uppercase() as u8 - b'A' + 1) as usize;
        index = index
            .checked_mul(26)
            .and_then(|i| i.checked_add(digit))
            .ok_or_else(|| PipelineError::InvalidColumnLabel(label.to_string()))?;
    }
    Ok(index - 1)
}

/// The four semantic fields resolved by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    Country,
    Language,
    Occupation,
    Industry,
}

impl Field {
    pub const ALL: [Field; 4] = [
        Field::Country,
        Field::Language,
        Field::Occupation,
        Field::Industry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Country => "Country",
            Field::Language => "Language",
            Field::Occupation => "Occupation",
            Field::Industry => "Industry",
        }
    }
}

/// Configured source positions of the semantic fields, before any cleaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldPositions {
    pub country: usize,
    pub language: usize,
    pub occupation: usize,
    pub industry: usize,
}

impl Default for FieldPositions {
    /// Country W, Language BE, Occupation K, Industry BG.
    fn default() -> Self {
        Self {
            country: 22,
            language: 56,
            occupation: 10,
            industry: 58,
        }
    }
}

impl FieldPositions {
    /// Builds positions from column letters.
    pub fn from_labels(country: &str, language: &str, occupation: &str, industry: &str) -> Result<Self> {
        Ok(Self {
            country: excel_col_to_index(country)?,
            language: excel_col_to_index(language)?,
            occupation: excel_col_to_index(occupation)?,
            industry: excel_col_to_index(industry)?,
        })
    }

    pub fn get(&self, field: Field) -> usize {
        match field {
            Field::Country => self.country,
            Field::Language => self.language,
            Field::Occupation => self.occupation,
            Field::Industry => self.industry,
        }
    }
}

/// Semantic fields resolved against one file's actual layout.
///
/// A field is `None` once cleaning has removed its column; reads of an absent
/// field yield the empty cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamedView {
    pub country: Option<usize>,
    pub language: Option<usize>,
    pub occupation: Option<usize>,
    pub industry: Option<usize>,
}

impl NamedView {
    /// Validates `positions` against a file that is `width` columns wide.
    pub fn resolve(positions: &FieldPositions, width: usize) -> Result<Self> {
        for field in Field::ALL {
            let index = positions.get(field);
            if index >= width {
                return Err(PipelineError::ColumnIndexOutOfRange {
                    field: field.as_str().to_string(),
                    index,
                    width,
                });
            }
        }
        Ok(Self {
            country: Some(positions.country),
            language: Some(positions.language),
            occupation: Some(positions.occupation),
            industry: Some(positions.industry),
        })
    }

    /// Re-bases the view onto a cleaned layout. `kept[i]` is the original
    /// index of cleaned column `i`.
    pub fn rebase(&self, kept: &[usize]) -> Self {
        let find = |orig: Option<usize>| orig.and_then(|o| kept.iter().position(|&k| k == o));
        Self {
            country: find(self.country),
            language: find(self.language),
            occupation: find(self.occupation),
            industry: find(self.industry),
        }
    }

    pub fn position(&self, field: Field) -> Option<usize> {
        match field {
            Field::Country => self.country,
            Field::Language => self.language,
            Field::Occupation => self.occupation,
            Field::Industry => self.industry,
        }
    }

    pub fn value<'a>(&self, field: Field, record: &'a [String]) -> &'a str {
        self.position(field)
            .and_then(|i| record.get(i))
            .map(|s| s.as_str())
            .unwrap_or("")
    }

    /// Header row for a file of `width` columns: semantic names where the view
    /// points, `Column<n>` (1-based) elsewhere.
    pub fn header(&self, width: usize) -> Vec<String> {
        (0..width)
            .map(|i| {
                Field::ALL
                    .iter()
                    .find(|f| self.position(**f) == Some(i))
                    .map(|f| f.as_str().to_string())
                    .unwrap_or_else(|| format!("Column{}", i + 1))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_column_labels() {
        assert_eq!(excel_col_to_index("A").unwrap(), 0);
        assert_eq!(excel_col_to_index("Z").unwrap(), 25);
        assert_eq!(excel_col_to_index("AA").unwrap(), 26);
        assert_eq!(excel_col_to_index("BE").unwrap(), 56);
        assert_eq!(excel_col_to_index("be").unwrap(), 56);
        assert_eq!(excel_col_to_index("AF").unwrap(), 31);
    }

    #[test]
    fn rejects_bad_labels() {
        assert!(matches!(
            excel_col_to_index(""),
            Err(PipelineError::InvalidColumnLabel(_))
        ));
        assert!(matches!(
            excel_col_to_index("A1"),
            Err(PipelineError::InvalidColumnLabel(_))
        ));
    }

    #[test]
    fn default_positions_match_labels() {
        let from_labels = FieldPositions::from_labels("W", "BE", "K", "BG").unwrap();
        assert_eq!(from_labels, FieldPositions::default());
    }

    #[test]
    fn resolve_rejects_narrow_files() {
        let positions = FieldPositions::default();
        let err = NamedView::resolve(&positions, 40).unwrap_err();
        match err {
            PipelineError::ColumnIndexOutOfRange { index, width, .. } => {
                assert_eq!(width, 40);
                assert!(index >= 40);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(NamedView::resolve(&positions, 59).is_ok());
    }

    #[test]
    fn rebase_follows_kept_columns() {
        let positions = FieldPositions {
            country: 1,
            language: 3,
            occupation: 4,
            industry: 5,
        };
        let view = NamedView::resolve(&positions, 6).unwrap();
        // columns 0 and 4 were dropped
        let rebased = view.rebase(&[1, 2, 3, 5]);
        assert_eq!(rebased.country, Some(0));
        assert_eq!(rebased.language, Some(2));
        assert_eq!(rebased.occupation, None);
        assert_eq!(rebased.industry, Some(3));

        assert_eq!(
            rebased.header(4),
            vec!["Country", "Column2", "Language", "Industry"]
        );
        let row: Vec<String> = vec!["US".into(), "x".into(), "en".into(), "tech".into()];
        assert_eq!(rebased.value(Field::Occupation, &row), "");
        assert_eq!(rebased.value(Field::Language, &row), "en");
    }
}
