//! Row filtering: per-column predicates composed with AND
//!
//! Filtering runs in two stages. The pre-passes (null drop, IQR outlier drop)
//! fix the set of candidate rows first; the per-column predicates are then
//! evaluated against the whole table and ANDed with that set. Default bounds
//! of unset range controls are taken from the candidate rows, so an untouched
//! control never removes a row that has a value.

use std::collections::BTreeSet;
use arrow::array::{Array, BooleanArray, StringArray, TimestampMillisecondArray};
use arrow::compute::{cast, filter_record_batch};
use arrow::datatypes::{DataType, TimeUnit};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDateTime};
use indexmap::IndexMap;
use thiserror::Error;
use tracing::debug;

use crate::schema::{ColumnClass, TableClasses};
use crate::stats::{numeric_values, IqrBounds};
use crate::DataError;

/// Errors raised while building a filter
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Column {column} is {class} and has no filter control")]
    NoFilterControl { column: String, class: &'static str },

    #[error("Column {column} is {class}; a {selection} filter does not apply")]
    SelectionMismatch {
        column: String,
        class: &'static str,
        selection: &'static str,
    },

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),
}

/// What the user chose in a column's filter control
#[derive(Debug, Clone, PartialEq)]
pub enum FilterSelection {
    /// Numeric slider; unset ends default to the observed min/max
    Range { min: Option<f64>, max: Option<f64> },
    /// Date picker; unset ends default to the earliest/latest value
    Dates {
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    },
    /// Multi-select; an empty selection filters nothing
    Values(Vec<String>),
}

impl FilterSelection {
    fn kind(&self) -> &'static str {
        match self {
            FilterSelection::Range { .. } => "numeric range",
            FilterSelection::Dates { .. } => "date range",
            FilterSelection::Values(_) => "value selection",
        }
    }
}

/// Pre-pass switches
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterOptions {
    /// Drop rows with a null in any column
    pub drop_nulls: bool,
    /// Drop rows that are an IQR outlier in any numeric column
    pub drop_outliers_iqr: bool,
    /// Fence multiplier for the outlier rule
    pub iqr_factor: f64,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            drop_nulls: false,
            drop_outliers_iqr: false,
            iqr_factor: 1.5,
        }
    }
}

/// A retain-condition over one column
#[derive(Debug, Clone, PartialEq)]
pub enum FilterPredicate {
    /// `min <= value <= max`
    NumericRange { column: String, min: f64, max: f64 },
    /// `start <= value <= end`
    DateRange {
        column: String,
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
    /// `value` is one of `allowed`
    SetMembership { column: String, allowed: BTreeSet<String> },
}

impl FilterPredicate {
    /// Build the predicate for `column` from the user's selection
    ///
    /// Returns `Ok(None)` for an inert control (empty value selection).
    /// `retained` marks the candidate rows used for default bounds.
    pub fn for_column(
        table: &RecordBatch,
        column: &str,
        class: ColumnClass,
        selection: &FilterSelection,
        retained: &[bool],
    ) -> Result<Option<Self>, FilterError> {
        let mismatch = || FilterError::SelectionMismatch {
            column: column.to_string(),
            class: class.label(),
            selection: selection.kind(),
        };

        match (class, selection) {
            (ColumnClass::Numeric, FilterSelection::Range { min, max }) => {
                let (lo, hi) = match (min, max) {
                    (Some(lo), Some(hi)) => (*lo, *hi),
                    _ => {
                        // An empty domain has only nulls left, which never match
                        let observed = numeric_domain(table, column, Some(retained))?
                            .unwrap_or((f64::NEG_INFINITY, f64::INFINITY));
                        (min.unwrap_or(observed.0), max.unwrap_or(observed.1))
                    }
                };
                Ok(Some(FilterPredicate::NumericRange {
                    column: column.to_string(),
                    min: lo,
                    max: hi,
                }))
            }
            (ColumnClass::Datetime, FilterSelection::Dates { start, end }) => {
                let (lo, hi) = match (start, end) {
                    (Some(lo), Some(hi)) => (*lo, *hi),
                    _ => {
                        let observed = date_domain(table, column, Some(retained))?
                            .unwrap_or((NaiveDateTime::MIN, NaiveDateTime::MAX));
                        (start.unwrap_or(observed.0), end.unwrap_or(observed.1))
                    }
                };
                Ok(Some(FilterPredicate::DateRange {
                    column: column.to_string(),
                    start: lo,
                    end: hi,
                }))
            }
            (ColumnClass::CategoricalLow, FilterSelection::Values(values)) => {
                if values.is_empty() {
                    return Ok(None);
                }
                Ok(Some(FilterPredicate::SetMembership {
                    column: column.to_string(),
                    allowed: values.iter().cloned().collect(),
                }))
            }
            (ColumnClass::CategoricalHigh | ColumnClass::Unknown, _) => Err(FilterError::NoFilterControl {
                column: column.to_string(),
                class: class.label(),
            }),
            _ => Err(mismatch()),
        }
    }

    pub fn column(&self) -> &str {
        match self {
            FilterPredicate::NumericRange { column, .. }
            | FilterPredicate::DateRange { column, .. }
            | FilterPredicate::SetMembership { column, .. } => column,
        }
    }

    /// Evaluate against every row; nulls never match
    pub fn matches(&self, table: &RecordBatch) -> Result<Vec<bool>, FilterError> {
        let array = column_array(table, self.column())?;

        match self {
            FilterPredicate::NumericRange { min, max, .. } => Ok(numeric_values(array)?
                .into_iter()
                .map(|v| v.map(|v| v >= *min && v <= *max).unwrap_or(false))
                .collect()),
            FilterPredicate::DateRange { start, end, .. } => {
                let (start, end) = (to_millis(start), to_millis(end));
                Ok(timestamp_values(array)?
                    .into_iter()
                    .map(|v| v.map(|v| v >= start && v <= end).unwrap_or(false))
                    .collect())
            }
            FilterPredicate::SetMembership { allowed, .. } => {
                let text = cast(array, &DataType::Utf8)?;
                let text = downcast::<StringArray>(text.as_ref())?;
                Ok(text
                    .iter()
                    .map(|v| v.map(|v| allowed.contains(v)).unwrap_or(false))
                    .collect())
            }
        }
    }
}

/// Default state of a column's filter control
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnDomain {
    /// Observed min/max; `None` when the column has no values
    Numeric(Option<(f64, f64)>),
    Dates(Option<(NaiveDateTime, NaiveDateTime)>),
    /// Distinct values in order of first appearance
    Values(Vec<String>),
    /// The column offers no filter control
    NoControl,
}

/// Describe the filter control for `column` over the whole table
pub fn column_domain(table: &RecordBatch, column: &str, class: ColumnClass) -> Result<ColumnDomain, FilterError> {
    match class {
        ColumnClass::Numeric => Ok(ColumnDomain::Numeric(numeric_domain(table, column, None)?)),
        ColumnClass::Datetime => Ok(ColumnDomain::Dates(date_domain(table, column, None)?)),
        ColumnClass::CategoricalLow => {
            let array = column_array(table, column)?;
            let text = cast(array, &DataType::Utf8)?;
            let text = downcast::<StringArray>(text.as_ref())?;
            let mut seen = ahash::AHashSet::new();
            let values = text
                .iter()
                .flatten()
                .filter(|v| seen.insert(*v))
                .map(|v| v.to_string())
                .collect();
            Ok(ColumnDomain::Values(values))
        }
        ColumnClass::CategoricalHigh | ColumnClass::Unknown => Ok(ColumnDomain::NoControl),
    }
}

/// Compute the retain mask for `table`
///
/// `classes` must describe `table` as it is now (after coercion).
pub fn build_mask(
    table: &RecordBatch,
    classes: &TableClasses,
    filters: &IndexMap<String, FilterSelection>,
    options: &FilterOptions,
) -> Result<BooleanArray, FilterError> {
    let rows = table.num_rows();
    let mut retained = vec![true; rows];

    if options.drop_nulls {
        for array in table.columns() {
            for (keep, is_null) in retained.iter_mut().zip(null_rows(array.as_ref())?) {
                *keep &= !is_null;
            }
        }
        debug!(kept = retained.iter().filter(|k| **k).count(), "Dropped rows with nulls");
    }

    if options.drop_outliers_iqr {
        // Fences come from the same candidate rows for every column
        let candidates = retained.clone();
        for name in classes.numeric() {
            let values = numeric_values(column_array(table, name)?)?;
            let sample: Vec<f64> = values
                .iter()
                .zip(&candidates)
                .filter_map(|(v, keep)| if *keep { *v } else { None })
                .collect();

            let Some(bounds) = IqrBounds::from_values(&sample, options.iqr_factor) else {
                continue;
            };
            for (keep, value) in retained.iter_mut().zip(&values) {
                if let Some(v) = value {
                    if bounds.is_outlier(*v) {
                        *keep = false;
                    }
                }
            }
        }
        debug!(kept = retained.iter().filter(|k| **k).count(), "Dropped IQR outliers");
    }

    let candidates = retained.clone();
    for (column, selection) in filters {
        let class = classes
            .class_of(column)
            .ok_or_else(|| FilterError::UnknownColumn(column.clone()))?;

        let Some(predicate) = FilterPredicate::for_column(table, column, class, selection, &candidates)? else {
            continue;
        };
        for (keep, matched) in retained.iter_mut().zip(predicate.matches(table)?) {
            *keep &= matched;
        }
    }

    debug!(rows, kept = retained.iter().filter(|k| **k).count(), filters = filters.len(), "Built filter mask");
    Ok(BooleanArray::from(retained))
}

/// Filter a copy of `table` with [`build_mask`]
pub fn apply(
    table: &RecordBatch,
    classes: &TableClasses,
    filters: &IndexMap<String, FilterSelection>,
    options: &FilterOptions,
) -> Result<RecordBatch, FilterError> {
    let mask = build_mask(table, classes, filters, options)?;
    Ok(filter_record_batch(table, &mask)?)
}

fn column_array<'a>(table: &'a RecordBatch, column: &str) -> Result<&'a dyn Array, FilterError> {
    table
        .column_by_name(column)
        .map(|a| a.as_ref())
        .ok_or_else(|| FilterError::UnknownColumn(column.to_string()))
}

fn downcast<T: 'static>(array: &dyn Array) -> Result<&T, FilterError> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| FilterError::Data(DataError::Other("unexpected array type after cast".to_string())))
}

/// Null flags per row; NaN counts as missing in float columns
fn null_rows(array: &dyn Array) -> Result<Vec<bool>, FilterError> {
    if matches!(array.data_type(), DataType::Float16 | DataType::Float32 | DataType::Float64) {
        return Ok(numeric_values(array)?.iter().map(|v| v.is_none()).collect());
    }
    Ok((0..array.len()).map(|i| array.is_null(i)).collect())
}

fn timestamp_values(array: &dyn Array) -> Result<Vec<Option<i64>>, FilterError> {
    let stamps = cast(array, &DataType::Timestamp(TimeUnit::Millisecond, None))?;
    let stamps = downcast::<TimestampMillisecondArray>(stamps.as_ref())?;
    Ok(stamps.iter().collect())
}

fn to_millis(value: &NaiveDateTime) -> i64 {
    value.and_utc().timestamp_millis()
}

fn from_millis(ms: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(ms).map(|dt| dt.naive_utc())
}

fn numeric_domain(table: &RecordBatch, column: &str, retained: Option<&[bool]>) -> Result<Option<(f64, f64)>, FilterError> {
    let values = numeric_values(column_array(table, column)?)?;
    let bounds = values
        .iter()
        .enumerate()
        .filter(|(row, _)| retained.map(|r| r[*row]).unwrap_or(true))
        .filter_map(|(_, v)| *v)
        .fold(None, |acc: Option<(f64, f64)>, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        });
    Ok(bounds)
}

fn date_domain(
    table: &RecordBatch,
    column: &str,
    retained: Option<&[bool]>,
) -> Result<Option<(NaiveDateTime, NaiveDateTime)>, FilterError> {
    let values = timestamp_values(column_array(table, column)?)?;
    let bounds = values
        .iter()
        .enumerate()
        .filter(|(row, _)| retained.map(|r| r[*row]).unwrap_or(true))
        .filter_map(|(_, v)| *v)
        .fold(None, |acc: Option<(i64, i64)>, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        });

    Ok(bounds.and_then(|(lo, hi)| Some((from_millis(lo)?, from_millis(hi)?))))
}
