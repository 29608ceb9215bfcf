/// One row of cells, keyed only by position. The empty string is the empty cell.
pub type Record = Vec<String>;

/// Rows sharing one column count.
///
/// Every record holds exactly `width` cells; ragged input is padded with empty
/// cells when the set is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSet {
    width: usize,
    rows: Vec<Record>,
}

impl RecordSet {
    /// Builds a set from possibly ragged rows, padding to the widest row.
    pub fn from_rows(mut rows: Vec<Record>) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        for row in &mut rows {
            row.resize(width, String::new());
        }
        Self { width, rows }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Record> {
        self.rows
    }

    /// Keeps only the columns listed in `kept` (original indices, ascending).
    pub fn select_columns(self, kept: &[usize]) -> Self {
        let rows = self
            .rows
            .into_iter()
            .map(|mut row| kept.iter().map(|&i| std::mem::take(&mut row[i])).collect())
            .collect();
        Self {
            width: kept.len(),
            rows,
        }
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [Record] {
        &mut self.rows
    }
}
