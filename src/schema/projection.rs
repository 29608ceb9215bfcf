// src/schema/projection.rs

use std::path::Path;

use once_cell::sync::Lazy;
use serde::Deserialize;

use super::columns::excel_col_to_index;
use crate::error::{PipelineError, Result};

/// A fixed positional-to-named remapping: ordered (output name, source index) pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionSchema {
    /// Stage name; also the output directory and archive base name.
    pub name: String,
    /// Appended to the input stem: `<stem>_<suffix>.csv`.
    pub suffix: String,
    pub fields: Vec<(String, usize)>,
}

/// One projected column as written in the configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectionField {
    pub name: String,
    pub column: String,
}

impl ProjectionSchema {
    pub fn new(name: &str, suffix: &str, fields: Vec<(String, usize)>) -> Self {
        Self {
            name: name.to_string(),
            suffix: suffix.to_string(),
            fields,
        }
    }

    /// Builds a schema from (name, column letter) pairs.
    pub fn from_labels(name: &str, suffix: &str, fields: &[ProjectionField]) -> Result<Self> {
        let fields = fields
            .iter()
            .map(|f| Ok((f.name.clone(), excel_col_to_index(&f.column)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(name, suffix, fields))
    }

    /// Minimum width a file needs for every field to resolve.
    pub fn required_width(&self) -> usize {
        self.fields.iter().map(|(_, i)| i + 1).max().unwrap_or(0)
    }

    pub fn header(&self) -> Vec<&str> {
        self.fields.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Checks the schema against a file of `width` columns.
    pub fn validate(&self, file: &Path, width: usize) -> Result<()> {
        let required = self.required_width();
        if width < required {
            return Err(PipelineError::ProjectionShapeMismatch {
                file: file.to_path_buf(),
                projection: self.name.clone(),
                required,
                actual: width,
            });
        }
        Ok(())
    }

    /// Projects one record. Callers validate the width first; short rows read
    /// as empty cells.
    pub fn project<'a>(&self, record: &'a csv::StringRecord) -> Vec<&'a str> {
        self.fields
            .iter()
            .map(|(_, i)| record.get(*i).unwrap_or(""))
            .collect()
    }
}

fn template(name: &str, suffix: &str, fields: &[(&str, &str)]) -> ProjectionSchema {
    let fields = fields
        .iter()
        .map(|(n, col)| {
            let idx = excel_col_to_index(col).expect("template column labels should parse");
            (n.to_string(), idx)
        })
        .collect();
    ProjectionSchema::new(name, suffix, fields)
}

/// CRM inbox export: contact basics plus the personalised opener.
pub static CRM_INBOX: Lazy<ProjectionSchema> = Lazy::new(|| {
    template(
        "rachInbox",
        "rachInbox",
        &[
            ("Email", "A"),
            ("First_Name", "C"),
            ("Last_Name", "D"),
            ("Company_Name", "N"),
            ("LinkedIn", "M"),
            ("Personalised_Lines", "AF"),
        ],
    )
});

/// Lead enrichment export.
pub static ENRICHMENT: Lazy<ProjectionSchema> = Lazy::new(|| {
    template(
        "ghl",
        "ghl",
        &[
            ("Email", "A"),
            ("First_Name", "C"),
            ("Last_Name", "D"),
            ("Department", "E"),
            ("Job_Title", "F"),
            ("Job_Level", "G"),
            ("City", "H"),
            ("State", "I"),
            ("Country", "J"),
            ("LinkedIn_Profile", "M"),
            ("Employer", "N"),
            ("Employer_Website", "O"),
            ("Phone", "P"),
            ("Employer_Facebook", "Q"),
            ("Employer_LinkedIn", "R"),
            ("Employer_Founded_Date", "S"),
            ("Employer_Zip", "T"),
            ("Languages_Spoken", "U"),
            ("Industry", "V"),
            ("Focus", "X"),
            ("Skills", "Y"),
        ],
    )
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crm_template_positions() {
        let crm = &*CRM_INBOX;
        assert_eq!(
            crm.header(),
            vec![
                "Email",
                "First_Name",
                "Last_Name",
                "Company_Name",
                "LinkedIn",
                "Personalised_Lines"
            ]
        );
        let idx: Vec<usize> = crm.fields.iter().map(|(_, i)| *i).collect();
        assert_eq!(idx, vec![0, 2, 3, 13, 12, 31]);
        assert_eq!(crm.required_width(), 32);
    }

    #[test]
    fn enrichment_template_shape() {
        let ghl = &*ENRICHMENT;
        assert_eq!(ghl.fields.len(), 21);
        assert_eq!(ghl.fields.first().map(|(n, _)| n.as_str()), Some("Email"));
        assert_eq!(ghl.fields.last().map(|(n, _)| n.as_str()), Some("Skills"));
        assert_eq!(ghl.required_width(), 25);
    }

    #[test]
    fn validate_reports_shape_mismatch() {
        let schema = ProjectionSchema::new("t", "t", vec![("A".into(), 0), ("B".into(), 5)]);
        assert!(schema.validate(Path::new("x.csv"), 6).is_ok());
        match schema.validate(Path::new("x.csv"), 3) {
            Err(PipelineError::ProjectionShapeMismatch {
                required, actual, ..
            }) => {
                assert_eq!(required, 6);
                assert_eq!(actual, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn builds_from_config_labels() {
        let fields = vec![
            ProjectionField {
                name: "Email".into(),
                column: "A".into(),
            },
            ProjectionField {
                name: "Opener".into(),
                column: "AF".into(),
            },
        ];
        let schema = ProjectionSchema::from_labels("custom", "custom", &fields).unwrap();
        assert_eq!(schema.fields, vec![("Email".into(), 0), ("Opener".into(), 31)]);

        let bad = vec![ProjectionField {
            name: "Email".into(),
            column: "1".into(),
        }];
        assert!(ProjectionSchema::from_labels("custom", "custom", &bad).is_err());
    }

    #[test]
    fn project_pads_short_rows() {
        let schema = ProjectionSchema::new("t", "t", vec![("A".into(), 0), ("C".into(), 2)]);
        let record = csv::StringRecord::from(vec!["a", "b"]);
        assert_eq!(schema.project(&record), vec!["a", ""]);
    }
}
