// Spreadsheet import (xlsx, xls, xlsb, ods)
//
// Only the first worksheet is read and its first row is the header. Cells
// are flattened to text and typed the same way delimited text is, so a
// spreadsheet and its CSV export load into the same table.

use std::io::Cursor;
use arrow::record_batch::RecordBatch;
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::{Duration, NaiveDate};
use tracing::debug;

use crate::config::NullConfig;
use crate::DataError;
use super::build_batch;

/// Spreadsheet reader producing an in-memory table
pub struct ExcelSource {
    null_config: NullConfig,
}

impl ExcelSource {
    pub fn new(null_config: NullConfig) -> Self {
        Self { null_config }
    }

    /// Read the first worksheet of an in-memory workbook
    pub fn read(&self, bytes: Vec<u8>) -> Result<RecordBatch, DataError> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;

        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| DataError::Spreadsheet("workbook contains no sheets".to_string()))??;

        let mut rows = range.rows();
        let headers: Vec<String> = match rows.next() {
            Some(header_row) => header_row
                .iter()
                .map(|cell| self.cell_text(cell).unwrap_or_default())
                .collect(),
            None => return Err(DataError::MissingHeader),
        };

        let mut columns: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
        for row in rows {
            for (col_idx, column) in columns.iter_mut().enumerate() {
                column.push(row.get(col_idx).and_then(|cell| self.cell_text(cell)));
            }
        }

        debug!(columns = headers.len(), rows = columns.first().map(|c| c.len()).unwrap_or(0), "Read worksheet");
        build_batch(headers, columns)
    }

    /// Text form of a cell, `None` for empty, error and null-token cells
    fn cell_text(&self, cell: &Data) -> Option<String> {
        let text = match cell {
            Data::Empty | Data::Error(_) => return None,
            Data::String(s) => s.clone(),
            Data::Int(n) => n.to_string(),
            Data::Float(n) => n.to_string(),
            Data::Bool(b) => b.to_string(),
            Data::DateTime(dt) => serial_to_iso(dt.as_f64())?,
            Data::DateTimeIso(s) => s.clone(),
            Data::DurationIso(s) => s.clone(),
        };

        if self.null_config.is_null(&text) {
            None
        } else {
            Some(text)
        }
    }
}

/// Convert a 1900-system spreadsheet serial date to ISO-8601 text
fn serial_to_iso(serial: f64) -> Option<String> {
    if !serial.is_finite() {
        return None;
    }

    // Serial 0 is 1899-12-30 once the 1900 leap-year bug is accounted for
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    let value = epoch.checked_add_signed(Duration::milliseconds(millis))?;

    if millis % 86_400_000 == 0 {
        Some(value.format("%Y-%m-%d").to_string())
    } else {
        Some(value.format("%Y-%m-%d %H:%M:%S").to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_to_iso() {
        assert_eq!(serial_to_iso(45292.0).as_deref(), Some("2024-01-01"));
        assert_eq!(serial_to_iso(45292.5).as_deref(), Some("2024-01-01 12:00:00"));
        assert_eq!(serial_to_iso(f64::NAN), None);
    }

    #[test]
    fn test_cell_text_null_tokens() {
        let source = ExcelSource::new(NullConfig::default());
        assert_eq!(source.cell_text(&Data::Empty), None);
        assert_eq!(source.cell_text(&Data::String("N/A".to_string())), None);
        assert_eq!(source.cell_text(&Data::Int(7)).as_deref(), Some("7"));
        assert_eq!(source.cell_text(&Data::Float(2.0)).as_deref(), Some("2"));
        assert_eq!(source.cell_text(&Data::Bool(true)).as_deref(), Some("true"));
    }

    #[test]
    fn test_invalid_workbook() {
        let source = ExcelSource::new(NullConfig::default());
        assert!(matches!(source.read(b"not a workbook".to_vec()), Err(DataError::Spreadsheet(_))));
    }
}
