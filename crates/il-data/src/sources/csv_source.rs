use std::io::Read;
use arrow::record_batch::RecordBatch;
use csv::ReaderBuilder;
use tracing::debug;

use crate::config::NullConfig;
use crate::DataError;
use super::build_batch;

/// Delimited-text reader producing an in-memory table
pub struct CsvSource {
    /// Null value handling
    null_config: NullConfig,
    /// Field delimiter
    delimiter: u8,
}

impl CsvSource {
    /// Create a comma-separated reader
    pub fn new(null_config: NullConfig) -> Self {
        Self {
            null_config,
            delimiter: b',',
        }
    }

    /// Use a different field delimiter
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Read the whole input; the first record is the header
    ///
    /// Short records are padded with nulls. A record with more fields than
    /// the header is an error.
    pub fn read<R: Read>(&self, reader: R) -> Result<RecordBatch, DataError> {
        let mut csv_reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .delimiter(self.delimiter)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader.headers()?.iter().map(|s| s.to_string()).collect();
        if headers.is_empty() || (headers.len() == 1 && headers[0].is_empty()) {
            return Err(DataError::MissingHeader);
        }

        let mut columns: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
        for (row_idx, result) in csv_reader.records().enumerate() {
            let record = result?;
            if record.len() > headers.len() {
                return Err(DataError::Csv(format!(
                    "row {} has {} fields, expected {}",
                    row_idx + 1,
                    record.len(),
                    headers.len()
                )));
            }

            for (col_idx, column) in columns.iter_mut().enumerate() {
                let value = record
                    .get(col_idx)
                    .filter(|v| !self.null_config.is_null(v))
                    .map(|v| v.to_string());
                column.push(value);
            }
        }

        debug!(columns = headers.len(), rows = columns[0].len(), "Read delimited text");
        build_batch(headers, columns)
    }
}
