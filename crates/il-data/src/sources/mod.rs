//! Upload parsing: delimited text and spreadsheets into Arrow tables

pub mod csv_source;
pub mod excel_source;

pub use csv_source::CsvSource;
pub use excel_source::ExcelSource;

use std::path::Path;
use std::sync::Arc;
use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use tracing::{info, warn};

use crate::config::NullConfig;
use crate::DataError;

/// Spreadsheet extensions handled by [`ExcelSource`]
const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls", "xlsb", "ods"];

/// Parse one uploaded file into a table, choosing the reader by extension
pub fn load_upload(file_name: &str, bytes: Vec<u8>, null_config: &NullConfig) -> Result<RecordBatch, DataError> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let batch = if extension == "csv" {
        CsvSource::new(null_config.clone()).read(bytes.as_slice())?
    } else if SPREADSHEET_EXTENSIONS.contains(&extension.as_str()) {
        ExcelSource::new(null_config.clone()).read(bytes)?
    } else {
        return Err(DataError::UnsupportedFormat(file_name.to_string()));
    };

    info!(
        file = %file_name,
        rows = batch.num_rows(),
        columns = batch.num_columns(),
        "Parsed upload"
    );
    Ok(batch)
}

/// Parse several uploads; each file succeeds or fails on its own
pub fn load_uploads(
    files: Vec<(String, Vec<u8>)>,
    null_config: &NullConfig,
) -> Vec<(String, Result<RecordBatch, DataError>)> {
    files
        .into_iter()
        .map(|(name, bytes)| {
            let result = load_upload(&name, bytes, null_config);
            if let Err(e) = &result {
                warn!(file = %name, error = %e, "Failed to read upload");
            }
            (name, result)
        })
        .collect()
}

/// Make header names non-empty and unique
///
/// Blank headers become `Unnamed: <index>`; repeats get a `.1`, `.2`, ... suffix.
pub(crate) fn normalize_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen = ahash::AHashSet::new();
    let mut result = Vec::with_capacity(headers.len());

    for (idx, header) in headers.into_iter().enumerate() {
        let base = if header.trim().is_empty() {
            format!("Unnamed: {}", idx)
        } else {
            header
        };

        let mut name = base.clone();
        let mut suffix = 1;
        while seen.contains(&name) {
            name = format!("{}.{}", base, suffix);
            suffix += 1;
        }
        seen.insert(name.clone());
        result.push(name);
    }

    result
}

/// Detect the narrowest type every non-null value fits
fn detect_column_type(values: &[Option<String>]) -> DataType {
    let mut is_int = true;
    let mut is_float = true;
    let mut is_bool = true;
    let mut non_null = 0;

    for value in values.iter().flatten() {
        non_null += 1;
        let value = value.trim();

        if is_int && value.parse::<i64>().is_err() {
            is_int = false;
        }
        if is_float && value.parse::<f64>().is_err() {
            is_float = false;
        }
        if is_bool && !(value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false")) {
            is_bool = false;
        }
        if !is_int && !is_float && !is_bool {
            return DataType::Utf8;
        }
    }

    // A column with no values at all is numeric with every cell missing
    if non_null == 0 {
        DataType::Float64
    } else if is_int {
        DataType::Int64
    } else if is_float {
        DataType::Float64
    } else if is_bool {
        DataType::Boolean
    } else {
        DataType::Utf8
    }
}

/// Build a typed table from a grid of cells already resolved against the null config
pub(crate) fn build_batch(headers: Vec<String>, columns: Vec<Vec<Option<String>>>) -> Result<RecordBatch, DataError> {
    if headers.is_empty() {
        return Err(DataError::MissingHeader);
    }

    let headers = normalize_headers(headers);
    let mut fields = Vec::with_capacity(headers.len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(headers.len());

    for (name, values) in headers.iter().zip(columns) {
        let data_type = detect_column_type(&values);
        let array: ArrayRef = match data_type {
            DataType::Int64 => Arc::new(Int64Array::from(
                values.iter().map(|v| v.as_ref().and_then(|s| s.trim().parse::<i64>().ok())).collect::<Vec<_>>(),
            )),
            DataType::Float64 => Arc::new(Float64Array::from(
                values.iter().map(|v| v.as_ref().and_then(|s| s.trim().parse::<f64>().ok())).collect::<Vec<_>>(),
            )),
            DataType::Boolean => Arc::new(BooleanArray::from(
                values
                    .iter()
                    .map(|v| v.as_ref().map(|s| s.trim().eq_ignore_ascii_case("true")))
                    .collect::<Vec<_>>(),
            )),
            _ => Arc::new(StringArray::from(values)),
        };

        fields.push(Field::new(name, array.data_type().clone(), true));
        arrays.push(array);
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).map_err(|e| e.into())
}
