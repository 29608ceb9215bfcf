use csv::{ByteRecord, ReaderBuilder};
use std::{
    fs::File,
    io::BufReader,
    path::Path,
};

use super::RecordReader;
use crate::error::Result;
use crate::process::table::Record;

/// Reads comma- or tab-delimited exports without a header row.
pub struct DelimitedReader {
    inner: csv::Reader<BufReader<File>>,
    total_bytes: u64,
    buf: ByteRecord,
}

impl DelimitedReader {
    pub fn open(path: &Path, delimiter: u8) -> Result<Self> {
        let file = File::open(path)?;
        let total_bytes = file.metadata()?.len();
        let inner = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(BufReader::new(file));
        Ok(Self {
            inner,
            total_bytes,
            buf: ByteRecord::new(),
        })
    }

    /// `.csv` is comma-separated, `.tsv` and `.txt` tab-separated.
    pub fn delimiter_for(path: &Path) -> Option<u8> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(b','),
            "tsv" | "txt" => Some(b'\t'),
            _ => None,
        }
    }
}

impl RecordReader for DelimitedReader {
    fn read_record(&mut self) -> Result<Option<Record>> {
        if !self.inner.read_byte_record(&mut self.buf)? {
            return Ok(None);
        }
        // exports are not always clean UTF-8
        let record = self
            .buf
            .iter()
            .map(|cell| String::from_utf8_lossy(cell).into_owned())
            .collect();
        Ok(Some(record))
    }

    fn fraction_read(&self) -> Option<f64> {
        if self.total_bytes == 0 {
            return None;
        }
        Some(self.inner.position().byte() as f64 / self.total_bytes as f64)
    }
}
