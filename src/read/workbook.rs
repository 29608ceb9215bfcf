use calamine::{open_workbook_auto, Data, Range, Reader};
use std::path::Path;
use tracing::debug;

use super::RecordReader;
use crate::error::Result;
use crate::process::table::Record;

/// Reads the first worksheet of an Excel or OpenDocument workbook.
///
/// The whole sheet is decoded on open; rows are then handed out in order.
/// Row 0 is data. Columns left of the sheet's used range are kept as empty
/// cells so positions match the spreadsheet's column letters.
pub struct WorkbookReader {
    rows: std::vec::IntoIter<Record>,
    total: usize,
    read: usize,
}

impl WorkbookReader {
    pub fn open(path: &Path) -> Result<Self> {
        let mut workbook = open_workbook_auto(path)?;
        let rows = match workbook.worksheet_range_at(0) {
            Some(range) => range_rows(&range?),
            None => Vec::new(),
        };
        debug!(file = %path.display(), rows = rows.len(), "decoded worksheet");
        Ok(Self {
            total: rows.len(),
            rows: rows.into_iter(),
            read: 0,
        })
    }

    pub fn is_workbook(path: &Path) -> bool {
        path.extension()
            .and_then(|s| s.to_str())
            .map(str::to_ascii_lowercase)
            .map_or(false, |ext| {
                matches!(ext.as_str(), "xlsx" | "xlsm" | "xlsb" | "xls" | "ods")
            })
    }
}

fn range_rows(range: &Range<Data>) -> Vec<Record> {
    let lead = range.start().map_or(0, |(_, col)| col as usize);
    range
        .rows()
        .map(|row| {
            std::iter::repeat(String::new())
                .take(lead)
                .chain(row.iter().map(cell_text))
                .collect()
        })
        .collect()
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl RecordReader for WorkbookReader {
    fn read_record(&mut self) -> Result<Option<Record>> {
        let next = self.rows.next();
        if next.is_some() {
            self.read += 1;
        }
        Ok(next)
    }

    fn fraction_read(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        Some(self.read as f64 / self.total as f64)
    }
}
