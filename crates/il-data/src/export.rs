//! Export of cleaned tables as delimited text

use std::sync::Arc;
use arrow::array::{Array, ArrayRef, StringArray, TimestampMillisecondArray};
use arrow::compute::cast;
use arrow::csv::WriterBuilder;
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use tracing::debug;

use crate::DataError;

/// Download name for a cleaned dataset
pub fn cleaned_file_name(dataset_name: &str) -> String {
    format!("cleaned_{}.csv", dataset_name)
}

/// Serialize `batch` as CSV with a header row and no index column
pub fn export_csv(batch: &RecordBatch) -> Result<Vec<u8>, DataError> {
    let mut buffer = Vec::new();
    {
        let mut writer = WriterBuilder::new().with_header(true).build(&mut buffer);
        writer.write(&format_timestamps(batch)?)?;
    }
    debug!(rows = batch.num_rows(), bytes = buffer.len(), "Exported CSV");
    Ok(buffer)
}

/// Serialize the first `rows` rows of `batch`
pub fn export_csv_head(batch: &RecordBatch, rows: usize) -> Result<Vec<u8>, DataError> {
    export_csv(&batch.slice(0, rows.min(batch.num_rows())))
}

/// Render timestamp columns as text: `%Y-%m-%d` when every value falls on
/// midnight, otherwise date and time
fn format_timestamps(batch: &RecordBatch) -> Result<RecordBatch, DataError> {
    if !batch.schema().fields().iter().any(|f| matches!(f.data_type(), DataType::Timestamp(_, _))) {
        return Ok(batch.clone());
    }

    let mut fields = Vec::with_capacity(batch.num_columns());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(batch.num_columns());
    for (field, array) in batch.schema().fields().iter().zip(batch.columns()) {
        if !matches!(field.data_type(), DataType::Timestamp(_, _)) {
            fields.push(field.as_ref().clone());
            columns.push(array.clone());
            continue;
        }

        let millis = cast(array.as_ref(), &DataType::Timestamp(TimeUnit::Millisecond, None))?;
        let millis = millis
            .as_any()
            .downcast_ref::<TimestampMillisecondArray>()
            .ok_or_else(|| DataError::Other("unexpected array type after cast".to_string()))?;
        let values: Vec<Option<NaiveDateTime>> = millis
            .iter()
            .map(|v| v.and_then(DateTime::<Utc>::from_timestamp_millis).map(|dt| dt.naive_utc()))
            .collect();

        let date_only = values.iter().flatten().all(|dt| dt.num_seconds_from_midnight() == 0 && dt.nanosecond() == 0);
        let layout = if date_only { "%Y-%m-%d" } else { "%Y-%m-%d %H:%M:%S%.f" };
        let text: StringArray = values
            .iter()
            .map(|v| v.map(|dt| dt.format(layout).to_string()))
            .collect();

        fields.push(Field::new(field.name(), DataType::Utf8, field.is_nullable()));
        columns.push(Arc::new(text));
    }

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int64Array;

    fn sample() -> RecordBatch {
        let schema = Schema::new(vec![
            Field::new("id", DataType::Int64, true),
            Field::new("name", DataType::Utf8, true),
        ]);
        RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(Int64Array::from(vec![Some(1), Some(2), None])) as ArrayRef,
                Arc::new(StringArray::from(vec!["a", "b,c", "d"])) as ArrayRef,
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_cleaned_file_name() {
        assert_eq!(cleaned_file_name("sales.csv"), "cleaned_sales.csv.csv");
    }

    #[test]
    fn test_export_csv() {
        let text = String::from_utf8(export_csv(&sample()).unwrap()).unwrap();
        assert_eq!(text, "id,name\n1,a\n2,\"b,c\"\n,d\n");
    }

    #[test]
    fn test_export_head() {
        let text = String::from_utf8(export_csv_head(&sample(), 1).unwrap()).unwrap();
        assert_eq!(text, "id,name\n1,a\n");

        let all = String::from_utf8(export_csv_head(&sample(), 50).unwrap()).unwrap();
        assert_eq!(all.lines().count(), 4);
    }

    fn stamps(values: Vec<Option<i64>>) -> RecordBatch {
        let schema = Schema::new(vec![Field::new(
            "day",
            DataType::Timestamp(TimeUnit::Millisecond, None),
            true,
        )]);
        RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(TimestampMillisecondArray::from(values)) as ArrayRef],
        )
        .unwrap()
    }

    #[test]
    fn test_midnight_timestamps_export_as_dates() {
        // 2024-01-01 and 2024-01-02
        let batch = stamps(vec![Some(1_704_067_200_000), Some(1_704_153_600_000)]);
        let text = String::from_utf8(export_csv(&batch).unwrap()).unwrap();
        assert_eq!(text, "day\n2024-01-01\n2024-01-02\n");
    }

    #[test]
    fn test_timestamps_with_time_keep_it() {
        // 2024-01-01 10:00:00 and 2024-01-02 00:00:00
        let batch = stamps(vec![Some(1_704_103_200_000), Some(1_704_153_600_000)]);
        let text = String::from_utf8(export_csv(&batch).unwrap()).unwrap();
        assert_eq!(text, "day\n2024-01-01 10:00:00\n2024-01-02 00:00:00\n");
    }
}
