// src/process/partition.rs

use csv::WriterBuilder;
use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashSet},
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::debug;

use super::table::{Record, RecordSet};
use crate::error::Result;
use crate::schema::{Field, NamedView};

/// Key for rows whose country cell is blank.
pub const UNKNOWN_COUNTRY: &str = "Unknown";

/// All records sharing one country value, bound for one output file.
#[derive(Debug, Clone)]
pub struct Partition {
    pub country: String,
    pub file_name: String,
    pub rows: Vec<Record>,
}

/// Everything one partition-writing unit needs; owns its rows outright.
#[derive(Debug)]
pub struct PartitionUnit {
    pub partition: Partition,
    pub header: Arc<Vec<String>>,
    pub view: NamedView,
    pub out_dir: PathBuf,
}

/// Groups `records` by country. Groups come back ordered by country key and
/// keep input row order; file names are unique within the result.
pub fn group_by_country(records: RecordSet, view: &NamedView) -> Vec<Partition> {
    let mut groups: BTreeMap<String, Vec<Record>> = BTreeMap::new();
    for row in records.into_rows() {
        let key = country_key(view.value(Field::Country, &row));
        groups.entry(key).or_default().push(row);
    }

    let mut used = HashSet::new();
    groups
        .into_iter()
        .map(|(country, rows)| {
            let base = sanitize_file_stem(&country);
            let mut stem = base.clone();
            let mut n = 2;
            while !used.insert(stem.to_lowercase()) {
                stem = format!("{base}_{n}");
                n += 1;
            }
            Partition {
                country,
                file_name: format!("{stem}.csv"),
                rows,
            }
        })
        .collect()
}

fn country_key(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        UNKNOWN_COUNTRY.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Replaces characters that cannot appear in a file name.
fn sanitize_file_stem(country: &str) -> String {
    let stem: String = country
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let stem = stem.trim_matches('.').to_string();
    if stem.is_empty() {
        "_".to_string()
    } else {
        stem
    }
}

/// Empty sorts after any value.
fn cmp_cell(a: &str, b: &str) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.cmp(b),
    }
}

/// Stable sort by (Language, Occupation, Industry).
pub fn sort_rows(rows: &mut [Record], view: &NamedView) {
    const KEY: [Field; 3] = [Field::Language, Field::Occupation, Field::Industry];
    rows.sort_by(|a, b| {
        KEY.iter()
            .map(|f| cmp_cell(view.value(*f, a), view.value(*f, b)))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    });
}

/// Sorts and writes one partition as `<out_dir>/<file_name>`.
pub fn write_partition(unit: PartitionUnit) -> Result<PathBuf> {
    let PartitionUnit {
        mut partition,
        header,
        view,
        out_dir,
    } = unit;
    sort_rows(&mut partition.rows, &view);

    let final_path = out_dir.join(&partition.file_name);
    let tmp_path = out_dir.join(format!("{}.tmp", partition.file_name));
    write_csv(&tmp_path, &header, &partition.rows)?;
    fs::rename(&tmp_path, &final_path)?;

    debug!(
        country = %partition.country,
        rows = partition.rows.len(),
        path = %final_path.display(),
        "wrote partition"
    );
    Ok(final_path)
}

fn write_csv(path: &Path, header: &[String], rows: &[Record]) -> Result<()> {
    let file = File::create(path)?;
    let mut wtr = WriterBuilder::new().from_writer(BufWriter::new(file));
    wtr.write_record(header)?;
    for row in rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldPositions;
    use anyhow::Result;
    use tempfile::tempdir;

    // country, language, occupation, industry, row id
    fn view() -> NamedView {
        let positions = FieldPositions {
            country: 0,
            language: 1,
            occupation: 2,
            industry: 3,
        };
        NamedView::resolve(&positions, 5).unwrap()
    }

    fn row(cells: [&str; 5]) -> Record {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn sample() -> RecordSet {
        RecordSet::from_rows(vec![
            row(["US", "en", "dev", "tech", "1"]),
            row(["FR", "fr", "ops", "", "2"]),
            row(["US", "", "dev", "tech", "3"]),
            row(["", "de", "dev", "auto", "4"]),
            row(["US", "de", "ceo", "fin", "5"]),
            row(["FR", "fr", "eng", "", "6"]),
            row([" US ", "en", "dev", "", "7"]),
        ])
    }

    #[test]
    fn groups_keep_every_row() {
        let input = sample();
        let parts = group_by_country(input.clone(), &view());

        let names: Vec<&str> = parts.iter().map(|p| p.file_name.as_str()).collect();
        assert_eq!(names, vec!["FR.csv", "US.csv", "Unknown.csv"]);

        let mut ids: Vec<String> = parts
            .iter()
            .flat_map(|p| p.rows.iter().map(|r| r[4].clone()))
            .collect();
        ids.sort();
        let mut expected: Vec<String> = input.rows().iter().map(|r| r[4].clone()).collect();
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[test]
    fn sorts_by_language_occupation_industry_blank_last() {
        let mut parts = group_by_country(sample(), &view());
        let us = parts.iter_mut().find(|p| p.country == "US").unwrap();
        sort_rows(&mut us.rows, &view());
        let ids: Vec<&str> = us.rows.iter().map(|r| r[4].as_str()).collect();
        // de/ceo, en/dev/tech, en/dev/"", ""/dev/tech
        assert_eq!(ids, vec!["5", "1", "7", "3"]);

        for pair in us.rows.windows(2) {
            let v = view();
            let key = |r: &Record| {
                [Field::Language, Field::Occupation, Field::Industry]
                    .map(|f| v.value(f, r).to_string())
            };
            let (a, b) = (key(&pair[0]), key(&pair[1]));
            let ord = a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| cmp_cell(x, y))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal);
            assert_ne!(ord, Ordering::Greater);
        }
    }

    #[test]
    fn sort_is_stable_for_ties() {
        let mut rows = vec![
            row(["FR", "fr", "ops", "", "b"]),
            row(["FR", "fr", "ops", "", "a"]),
        ];
        sort_rows(&mut rows, &view());
        assert_eq!(rows[0][4], "b");
    }

    #[test]
    fn colliding_names_get_suffixes() {
        let input = RecordSet::from_rows(vec![
            row(["A/B", "", "", "", "1"]),
            row(["A_B", "", "", "", "2"]),
            row(["a_b", "", "", "", "3"]),
        ]);
        let parts = group_by_country(input, &view());
        let names: Vec<&str> = parts.iter().map(|p| p.file_name.as_str()).collect();
        assert_eq!(names, vec!["A_B.csv", "A_B_2.csv", "a_b_3.csv"]);
    }

    #[test]
    fn writes_sorted_csv_with_header() -> Result<()> {
        let dir = tempdir()?;
        let v = view();
        let header = Arc::new(v.header(5));
        let parts = group_by_country(sample(), &v);
        let fr = parts.into_iter().find(|p| p.country == "FR").unwrap();

        let path = write_partition(PartitionUnit {
            partition: fr,
            header,
            view: v,
            out_dir: dir.path().to_path_buf(),
        })?;

        assert_eq!(path, dir.path().join("FR.csv"));
        let text = fs::read_to_string(&path)?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Country,Language,Occupation,Industry,Column5");
        assert_eq!(lines[1], "FR,fr,eng,,6");
        assert_eq!(lines[2], "FR,fr,ops,,2");
        assert!(!dir.path().join("FR.csv.tmp").exists());
        Ok(())
    }
}
