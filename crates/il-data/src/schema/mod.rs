//! Column classification and datetime coercion
//!
//! Every filter control and chart decision is driven by the class of a
//! column, not its storage type. Classes are derived on demand and must be
//! recomputed after [`coerce_table`] because coercion turns text columns into
//! datetime columns.

use std::sync::Arc;
use ahash::AHashSet;
use arrow::array::{Array, ArrayRef, StringArray, TimestampMillisecondArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use thiserror::Error;
use tracing::debug;

use crate::DataError;

/// Text columns with at most this many distinct values are low-cardinality
pub const DEFAULT_CATEGORICAL_THRESHOLD: usize = 50;

/// Derived type tag for a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnClass {
    Numeric,
    Datetime,
    /// Text with few enough distinct values to pick from a list
    CategoricalLow,
    CategoricalHigh,
    Unknown,
}

impl ColumnClass {
    pub fn is_categorical(&self) -> bool {
        matches!(self, ColumnClass::CategoricalLow | ColumnClass::CategoricalHigh)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ColumnClass::Numeric => "numeric",
            ColumnClass::Datetime => "datetime",
            ColumnClass::CategoricalLow => "categorical",
            ColumnClass::CategoricalHigh => "categorical (high cardinality)",
            ColumnClass::Unknown => "unknown",
        }
    }
}

/// Classify a single column
pub fn classify(array: &dyn Array, threshold: usize) -> ColumnClass {
    match array.data_type() {
        dt if dt.is_numeric() => ColumnClass::Numeric,
        DataType::Timestamp(_, _) | DataType::Date32 | DataType::Date64 => ColumnClass::Datetime,
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Boolean | DataType::Dictionary(_, _) => {
            match distinct_count(array, threshold + 1) {
                Some(count) if count <= threshold => ColumnClass::CategoricalLow,
                Some(_) => ColumnClass::CategoricalHigh,
                None => ColumnClass::Unknown,
            }
        }
        _ => ColumnClass::Unknown,
    }
}

/// Count distinct non-null values, stopping once `limit` is reached
///
/// `None` when the column cannot be read as text.
fn distinct_count(array: &dyn Array, limit: usize) -> Option<usize> {
    let text = cast(array, &DataType::Utf8).ok()?;
    let text = text.as_any().downcast_ref::<StringArray>()?;

    let mut seen = AHashSet::new();
    for value in text.iter().flatten() {
        seen.insert(value);
        if seen.len() >= limit {
            break;
        }
    }
    Some(seen.len())
}

/// A column name with its class
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedColumn {
    pub name: String,
    pub class: ColumnClass,
}

/// Classes of every column of a table, in table order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableClasses {
    columns: Vec<ClassifiedColumn>,
}

impl TableClasses {
    /// Classify every column of `batch`
    pub fn from_batch(batch: &RecordBatch, threshold: usize) -> Self {
        let columns = batch
            .schema()
            .fields()
            .iter()
            .zip(batch.columns())
            .map(|(field, array)| ClassifiedColumn {
                name: field.name().clone(),
                class: classify(array.as_ref(), threshold),
            })
            .collect();
        Self { columns }
    }

    /// Build directly from names and classes
    pub fn from_columns(columns: Vec<ClassifiedColumn>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[ClassifiedColumn] {
        &self.columns
    }

    pub fn class_of(&self, name: &str) -> Option<ColumnClass> {
        self.columns.iter().find(|c| c.name == name).map(|c| c.class)
    }

    /// The first column in table order
    pub fn first_column(&self) -> Option<&str> {
        self.columns.first().map(|c| c.name.as_str())
    }

    pub fn numeric(&self) -> Vec<&str> {
        self.names_where(|class| class == ColumnClass::Numeric)
    }

    pub fn datetime(&self) -> Vec<&str> {
        self.names_where(|class| class == ColumnClass::Datetime)
    }

    /// Low- and high-cardinality categorical columns
    pub fn categorical(&self) -> Vec<&str> {
        self.names_where(|class| class.is_categorical())
    }

    fn names_where(&self, predicate: impl Fn(ColumnClass) -> bool) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| predicate(c.class))
            .map(|c| c.name.as_str())
            .collect()
    }
}

/// Why a text column could not become a datetime column
#[derive(Error, Debug, PartialEq)]
pub enum CoercionError {
    #[error("column is not text: {0}")]
    NotText(DataType),

    #[error("column has no values to parse")]
    Empty,

    #[error("value at row {row} is not a date: {value}")]
    Unparseable { row: usize, value: String },

    #[error("values parse as dates but not with one shared format")]
    MixedFormats,
}

/// Accepted date and datetime layouts, tried in order
#[derive(Debug, Clone, Copy)]
enum DateFormat {
    Rfc3339,
    DateTime(&'static str),
    Date(&'static str),
}

const DATE_FORMATS: &[DateFormat] = &[
    DateFormat::Rfc3339,
    DateFormat::DateTime("%Y-%m-%d %H:%M:%S"),
    DateFormat::DateTime("%Y-%m-%d %H:%M:%S%.f"),
    DateFormat::DateTime("%Y-%m-%dT%H:%M:%S"),
    DateFormat::DateTime("%Y-%m-%dT%H:%M:%S%.f"),
    DateFormat::DateTime("%Y-%m-%d %H:%M"),
    DateFormat::DateTime("%m/%d/%Y %H:%M:%S"),
    DateFormat::DateTime("%m/%d/%Y %H:%M"),
    DateFormat::Date("%Y-%m-%d"),
    DateFormat::Date("%m/%d/%Y"),
    DateFormat::Date("%d/%m/%Y"),
    DateFormat::Date("%Y/%m/%d"),
    DateFormat::Date("%d %b %Y"),
    DateFormat::Date("%b %d %Y"),
    DateFormat::Date("%B %d, %Y"),
    DateFormat::Date("%d-%b-%Y"),
];

impl DateFormat {
    fn parse(&self, value: &str) -> Option<NaiveDateTime> {
        match self {
            DateFormat::Rfc3339 => DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.naive_utc()),
            DateFormat::DateTime(fmt) => NaiveDateTime::parse_from_str(value, fmt).ok(),
            DateFormat::Date(fmt) => NaiveDate::parse_from_str(value, fmt)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0)),
        }
    }
}

/// Parse one value with any accepted layout
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    DATE_FORMATS.iter().find_map(|fmt| fmt.parse(value))
}

/// Convert a text column to millisecond timestamps
///
/// Succeeds only when every non-null value parses with one shared layout.
/// Nulls stay null.
pub fn coerce_datetime(array: &dyn Array) -> Result<ArrayRef, CoercionError> {
    if !matches!(array.data_type(), DataType::Utf8 | DataType::LargeUtf8) {
        return Err(CoercionError::NotText(array.data_type().clone()));
    }

    let text = cast(array, &DataType::Utf8).map_err(|_| CoercionError::NotText(array.data_type().clone()))?;
    let text = text
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| CoercionError::NotText(array.data_type().clone()))?;

    let values: Vec<(usize, &str)> = text
        .iter()
        .enumerate()
        .filter_map(|(row, v)| v.map(|v| (row, v.trim())))
        .collect();
    if values.is_empty() {
        return Err(CoercionError::Empty);
    }

    for fmt in DATE_FORMATS {
        let parsed: Option<Vec<(usize, i64)>> = values
            .iter()
            .map(|(row, v)| fmt.parse(v).map(|dt| (*row, dt.and_utc().timestamp_millis())))
            .collect();

        if let Some(parsed) = parsed {
            let mut millis: Vec<Option<i64>> = vec![None; text.len()];
            for (row, ms) in parsed {
                millis[row] = Some(ms);
            }
            return Ok(Arc::new(TimestampMillisecondArray::from(millis)));
        }
    }

    match values.iter().find(|(_, v)| parse_datetime(v).is_none()) {
        Some((row, value)) => Err(CoercionError::Unparseable {
            row: *row,
            value: value.to_string(),
        }),
        None => Err(CoercionError::MixedFormats),
    }
}

/// Offer every text column of `batch` to [`coerce_datetime`]
///
/// Columns that fail to coerce stay text. Non-text columns are untouched,
/// so running this on its own output changes nothing.
pub fn coerce_table(batch: &RecordBatch) -> Result<RecordBatch, DataError> {
    let schema = batch.schema();
    let mut fields = Vec::with_capacity(schema.fields().len());
    let mut columns = Vec::with_capacity(batch.num_columns());

    for (field, array) in schema.fields().iter().zip(batch.columns()) {
        if !matches!(field.data_type(), DataType::Utf8 | DataType::LargeUtf8) {
            fields.push(field.as_ref().clone());
            columns.push(Arc::clone(array));
            continue;
        }

        match coerce_datetime(array.as_ref()) {
            Ok(coerced) => {
                debug!(column = %field.name(), "Coerced text column to datetime");
                fields.push(Field::new(
                    field.name(),
                    DataType::Timestamp(TimeUnit::Millisecond, None),
                    field.is_nullable(),
                ));
                columns.push(coerced);
            }
            Err(e) => {
                debug!(column = %field.name(), reason = %e, "Column stays text");
                fields.push(field.as_ref().clone());
                columns.push(Arc::clone(array));
            }
        }
    }

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{BooleanArray, Float64Array, Int64Array};

    fn text(values: Vec<Option<&str>>) -> ArrayRef {
        Arc::new(StringArray::from(values))
    }

    #[test]
    fn test_classify_storage_types() {
        let ints = Int64Array::from(vec![1, 2]);
        let floats = Float64Array::from(vec![1.5]);
        let flags = BooleanArray::from(vec![true, false]);
        let stamps = TimestampMillisecondArray::from(vec![0i64]);

        assert_eq!(classify(&ints, 50), ColumnClass::Numeric);
        assert_eq!(classify(&floats, 50), ColumnClass::Numeric);
        assert_eq!(classify(&flags, 50), ColumnClass::CategoricalLow);
        assert_eq!(classify(&stamps, 50), ColumnClass::Datetime);
    }

    #[test]
    fn test_classify_cardinality_threshold() {
        let values: Vec<String> = (0..51).map(|i| format!("v{}", i)).collect();
        let high = StringArray::from(values.iter().map(|s| Some(s.as_str())).collect::<Vec<_>>());
        let exactly: Vec<Option<&str>> = values.iter().take(50).map(|s| Some(s.as_str())).chain([None]).collect();
        let low = StringArray::from(exactly);

        assert_eq!(classify(&high, 50), ColumnClass::CategoricalHigh);
        assert_eq!(classify(&low, 50), ColumnClass::CategoricalLow);
        assert_eq!(classify(&low, 10), ColumnClass::CategoricalHigh);
    }

    #[test]
    fn test_coerce_datetime_all_or_nothing() {
        let ok = coerce_datetime(text(vec![Some("2024-01-01"), None, Some("2024-02-15")]).as_ref()).unwrap();
        let ok = ok.as_any().downcast_ref::<TimestampMillisecondArray>().unwrap();
        assert_eq!(ok.value(0), 1_704_067_200_000);
        assert!(ok.is_null(1));

        let err = coerce_datetime(text(vec![Some("2024-01-01"), Some("soon")]).as_ref()).unwrap_err();
        assert_eq!(err, CoercionError::Unparseable { row: 1, value: "soon".to_string() });

        assert_eq!(coerce_datetime(text(vec![None, None]).as_ref()).unwrap_err(), CoercionError::Empty);
    }

    #[test]
    fn test_coerce_datetime_shared_format() {
        let arr = coerce_datetime(text(vec![Some("01/02/2024"), Some("13/02/2024")]).as_ref()).unwrap();
        let arr = arr.as_any().downcast_ref::<TimestampMillisecondArray>().unwrap();
        // 13/02 rules out month-first, so both values are read day-first
        let first = chrono::DateTime::from_timestamp_millis(arr.value(0)).unwrap().naive_utc();
        assert_eq!(first.date(), NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());

        let mixed = coerce_datetime(text(vec![Some("2024-01-01"), Some("Mar 05 2024")]).as_ref());
        assert_eq!(mixed.unwrap_err(), CoercionError::MixedFormats);
    }

    #[test]
    fn test_coerce_table_is_idempotent() {
        let schema = Schema::new(vec![
            Field::new("day", DataType::Utf8, true),
            Field::new("name", DataType::Utf8, true),
            Field::new("value", DataType::Int64, true),
        ]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![
                text(vec![Some("2024-01-01 10:00:00"), Some("2024-01-02 11:30:00")]),
                text(vec![Some("a"), Some("b")]),
                Arc::new(Int64Array::from(vec![1, 2])) as ArrayRef,
            ],
        )
        .unwrap();

        let once = coerce_table(&batch).unwrap();
        let classes = TableClasses::from_batch(&once, DEFAULT_CATEGORICAL_THRESHOLD);
        assert_eq!(classes.class_of("day"), Some(ColumnClass::Datetime));
        assert_eq!(classes.class_of("name"), Some(ColumnClass::CategoricalLow));
        assert_eq!(classes.class_of("value"), Some(ColumnClass::Numeric));

        let twice = coerce_table(&once).unwrap();
        assert_eq!(once, twice);
        assert_eq!(TableClasses::from_batch(&twice, DEFAULT_CATEGORICAL_THRESHOLD), classes);
    }

    #[test]
    fn test_table_class_groups() {
        let classes = TableClasses::from_columns(vec![
            ClassifiedColumn { name: "when".into(), class: ColumnClass::Datetime },
            ClassifiedColumn { name: "city".into(), class: ColumnClass::CategoricalLow },
            ClassifiedColumn { name: "id".into(), class: ColumnClass::CategoricalHigh },
            ClassifiedColumn { name: "sales".into(), class: ColumnClass::Numeric },
        ]);

        assert_eq!(classes.first_column(), Some("when"));
        assert_eq!(classes.categorical(), vec!["city", "id"]);
        assert_eq!(classes.numeric(), vec!["sales"]);
        assert_eq!(classes.datetime(), vec!["when"]);
    }
}
