//! Data handling for InsightLoop: loading uploads, classifying columns,
//! filtering rows and exporting the result

pub mod config;
pub mod export;
pub mod filter;
pub mod schema;
pub mod sources;
pub mod stats;

use arrow::error::ArrowError;
use thiserror::Error;

// Re-exports
pub use config::NullConfig;
pub use export::{cleaned_file_name, export_csv, export_csv_head};
pub use filter::{build_mask, apply, FilterError, FilterOptions, FilterPredicate, FilterSelection, ColumnDomain, column_domain};
pub use schema::{classify, coerce_datetime, coerce_table, parse_datetime, ClassifiedColumn, ColumnClass, CoercionError, TableClasses, DEFAULT_CATEGORICAL_THRESHOLD};
pub use sources::{load_upload, load_uploads, CsvSource, ExcelSource};
pub use stats::{numeric_values, pearson, quartiles, CorrelationMatrix, IqrBounds};

/// Errors that can occur in data operations
#[derive(Error, Debug)]
pub enum DataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(ArrowError),

    #[error("CSV parsing error: {0}")]
    Csv(String),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("File has no header row")]
    MissingHeader,

    #[error("Other error: {0}")]
    Other(String),
}

impl From<csv::Error> for DataError {
    fn from(error: csv::Error) -> Self {
        match error.kind() {
            csv::ErrorKind::Io(io_err) => DataError::Io(std::io::Error::new(io_err.kind(), error.to_string())),
            _ => DataError::Csv(error.to_string()),
        }
    }
}

impl From<ArrowError> for DataError {
    fn from(error: ArrowError) -> Self {
        DataError::Arrow(error)
    }
}

impl From<calamine::Error> for DataError {
    fn from(error: calamine::Error) -> Self {
        DataError::Spreadsheet(error.to_string())
    }
}
