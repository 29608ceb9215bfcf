// src/process/project.rs

use csv::{ReaderBuilder, WriterBuilder};
use std::{
    fs::{self, File},
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::debug;

use crate::error::Result;
use crate::schema::ProjectionSchema;

/// One file to project, self-contained for a worker.
#[derive(Debug, Clone)]
pub struct ProjectionUnit {
    pub schema: Arc<ProjectionSchema>,
    pub input: PathBuf,
    pub out_dir: PathBuf,
}

/// Projected output path for `input`: `<stem>_<suffix>.csv`.
pub fn output_path(schema: &ProjectionSchema, input: &Path, out_dir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    out_dir.join(format!("{}_{}.csv", stem, schema.suffix))
}

/// Lists the partitioned `.csv` files of `dir`, sorted by name.
pub fn list_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = format!("{}/*.csv", glob::Pattern::escape(&dir.to_string_lossy()));
    let mut files: Vec<PathBuf> = glob::glob(&pattern)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?
        .filter_map(|entry| entry.ok())
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    Ok(files)
}

/// Projects one partitioned file.
///
/// The width is read from the header row; a file narrower than the schema
/// fails with `ProjectionShapeMismatch` before anything is written.
pub fn project_file(unit: ProjectionUnit) -> Result<PathBuf> {
    let ProjectionUnit {
        schema,
        input,
        out_dir,
    } = unit;

    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(File::open(&input)?));
    let width = rdr.headers()?.len();
    schema.validate(&input, width)?;

    let final_path = output_path(&schema, &input, &out_dir);
    let tmp_path = final_path.with_extension("csv.tmp");
    let mut wtr = WriterBuilder::new().from_writer(BufWriter::new(File::create(&tmp_path)?));
    wtr.write_record(schema.header())?;

    let mut rows = 0u64;
    let mut record = csv::StringRecord::new();
    while rdr.read_record(&mut record)? {
        wtr.write_record(schema.project(&record))?;
        rows += 1;
    }
    wtr.flush()?;
    drop(wtr);
    fs::rename(&tmp_path, &final_path)?;

    debug!(
        projection = %schema.name,
        input = %input.display(),
        rows,
        "projected file"
    );
    Ok(final_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use anyhow::Result;
    use std::io::Write;
    use tempfile::tempdir;

    fn schema() -> Arc<ProjectionSchema> {
        Arc::new(ProjectionSchema::new(
            "mini",
            "mini",
            vec![("Email".into(), 0), ("Company".into(), 3), ("Name".into(), 1)],
        ))
    }

    #[test]
    fn projects_columns_by_position() -> Result<()> {
        let dir = tempdir()?;
        let input = dir.path().join("US.csv");
        let mut f = File::create(&input)?;
        write!(f, "Column1,Column2,Column3,Country\na@x.com,Ann,x,Acme\nb@x.com,Bob,y,\"Big, Inc\"\n")?;
        drop(f);

        let out = dir.path().join("out");
        fs::create_dir_all(&out)?;
        let path = project_file(ProjectionUnit {
            schema: schema(),
            input,
            out_dir: out.clone(),
        })?;

        assert_eq!(path, out.join("US_mini.csv"));
        let text = fs::read_to_string(&path)?;
        assert_eq!(
            text,
            "Email,Company,Name\na@x.com,Acme,Ann\nb@x.com,\"Big, Inc\",Bob\n"
        );
        Ok(())
    }

    #[test]
    fn narrow_files_are_rejected_without_output() -> Result<()> {
        let dir = tempdir()?;
        let input = dir.path().join("FR.csv");
        fs::write(&input, "Column1,Column2\na,b\n")?;

        let err = project_file(ProjectionUnit {
            schema: schema(),
            input,
            out_dir: dir.path().to_path_buf(),
        })
        .unwrap_err();

        assert!(matches!(err, PipelineError::ProjectionShapeMismatch { .. }));
        assert!(!dir.path().join("FR_mini.csv").exists());
        Ok(())
    }

    #[test]
    fn lists_only_csv_files() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("b.csv"), "x\n")?;
        fs::write(dir.path().join("a.csv"), "x\n")?;
        fs::write(dir.path().join("notes.txt"), "x\n")?;
        fs::create_dir(dir.path().join("sub.csv"))?;

        let files = list_csv_files(dir.path())?;
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.csv", "b.csv"]);
        Ok(())
    }
}
