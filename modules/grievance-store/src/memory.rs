use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::sheet::{Row, SheetBackend, SheetError, FIRST_DATA_ROW};

/// In-process sheet. Used when no spreadsheet credentials are configured, and
/// by tests, which can queue failures to exercise retries.
#[derive(Default)]
pub struct MemorySheet {
    /// Every row including the header at index 0 once written.
    rows: Mutex<Vec<Row>>,
    faults: Mutex<VecDeque<SheetError>>,
    calls: AtomicUsize,
}

impl MemorySheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` calls with a transient error carrying `status`.
    pub fn fail_next(&self, n: usize, status: u16) {
        let mut faults = self.faults.lock().unwrap_or_else(|e| e.into_inner());
        for _ in 0..n {
            faults.push_back(SheetError::from_status(status, "injected failure"));
        }
    }

    /// Fail the next call with an arbitrary error.
    pub fn push_fault(&self, error: SheetError) {
        self.faults
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(error);
    }

    /// Backend calls made so far, failed ones included.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The header row, once one has been written.
    pub fn header(&self) -> Option<Row> {
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        rows.first().filter(|r| !r.is_empty()).cloned()
    }

    /// Copy of the data rows, header excluded.
    pub fn data_rows(&self) -> Vec<Row> {
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        rows.iter().skip(FIRST_DATA_ROW - 1).cloned().collect()
    }

    /// Overwrite a cell directly, bypassing the store. Simulates an edit made
    /// by another writer or by hand in the spreadsheet UI.
    pub fn set_cell(&self, row: usize, column: usize, value: &str) {
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(cells) = rows.get_mut(row.wrapping_sub(1)) {
            if cells.len() <= column {
                cells.resize(column + 1, String::new());
            }
            cells[column] = value.to_string();
        }
    }

    fn enter(&self) -> Result<(), SheetError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self
            .faults
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
        {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SheetBackend for MemorySheet {
    async fn ensure_header(&self, header: &[&str]) -> Result<(), SheetError> {
        self.enter()?;
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        if rows.is_empty() {
            rows.push(header.iter().map(|h| h.to_string()).collect());
        }
        Ok(())
    }

    async fn read_rows(&self) -> Result<Vec<Row>, SheetError> {
        self.enter()?;
        Ok(self.data_rows())
    }

    async fn read_row(&self, row: usize) -> Result<Option<Row>, SheetError> {
        self.enter()?;
        if row < FIRST_DATA_ROW {
            return Ok(None);
        }
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        Ok(rows.get(row - 1).cloned())
    }

    async fn append_row(&self, values: Row) -> Result<usize, SheetError> {
        self.enter()?;
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        if rows.is_empty() {
            // Keep data rows aligned with FIRST_DATA_ROW even without a header.
            rows.push(Row::new());
        }
        rows.push(values);
        Ok(rows.len())
    }

    async fn write_row(&self, row: usize, values: Row) -> Result<(), SheetError> {
        self.enter()?;
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        match rows.get_mut(row.wrapping_sub(1)) {
            Some(existing) if row >= FIRST_DATA_ROW => {
                *existing = values;
                Ok(())
            }
            _ => Err(SheetError::Permanent {
                status: 400,
                message: format!("row {row} is outside the data range"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Row {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[tokio::test]
    async fn appended_rows_start_after_header() {
        let sheet = MemorySheet::new();
        sheet.ensure_header(&["A", "B"]).await.unwrap();
        let first = sheet.append_row(row(&["1", "x"])).await.unwrap();
        let second = sheet.append_row(row(&["2", "y"])).await.unwrap();
        assert_eq!((first, second), (2, 3));
        assert_eq!(sheet.read_row(3).await.unwrap(), Some(row(&["2", "y"])));
        assert_eq!(sheet.read_rows().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn header_is_written_once() {
        let sheet = MemorySheet::new();
        sheet.ensure_header(&["A"]).await.unwrap();
        sheet.append_row(row(&["1"])).await.unwrap();
        sheet.ensure_header(&["B"]).await.unwrap();
        assert_eq!(sheet.data_rows(), vec![row(&["1"])]);
        assert_eq!(sheet.header(), Some(row(&["A"])));
    }

    #[tokio::test]
    async fn headerless_append_reports_no_header() {
        let sheet = MemorySheet::new();
        assert_eq!(sheet.header(), None);
        assert_eq!(sheet.append_row(row(&["1"])).await.unwrap(), 2);
        assert_eq!(sheet.header(), None);
    }

    #[tokio::test]
    async fn queued_faults_fire_in_order() {
        let sheet = MemorySheet::new();
        sheet.fail_next(2, 429);
        assert!(sheet.read_rows().await.unwrap_err().is_transient());
        assert!(sheet.read_rows().await.is_err());
        assert!(sheet.read_rows().await.is_ok());
        assert_eq!(sheet.call_count(), 3);
    }

    #[tokio::test]
    async fn writing_outside_data_range_fails() {
        let sheet = MemorySheet::new();
        sheet.ensure_header(&["A"]).await.unwrap();
        assert!(sheet.write_row(1, row(&["x"])).await.is_err());
        assert!(sheet.write_row(5, row(&["x"])).await.is_err());
    }
}
