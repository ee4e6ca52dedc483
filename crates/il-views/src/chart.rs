//! Chart requests: validated descriptions handed to a renderer

use std::fmt;
use std::str::FromStr;
use arrow::record_batch::RecordBatch;
use il_data::{ColumnClass, CorrelationMatrix, DataError, TableClasses};
use thiserror::Error;
use tracing::debug;

/// Supported chart types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChartKind {
    Bar,
    Line,
    Scatter,
    Pie,
    Heatmap,
}

impl ChartKind {
    /// Every chart type, in menu order
    pub const ALL: [ChartKind; 5] = [
        ChartKind::Bar,
        ChartKind::Line,
        ChartKind::Scatter,
        ChartKind::Pie,
        ChartKind::Heatmap,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ChartKind::Bar => "Bar",
            ChartKind::Line => "Line",
            ChartKind::Scatter => "Scatter",
            ChartKind::Pie => "Pie",
            ChartKind::Heatmap => "Heatmap",
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChartKind {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChartKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ChartError::UnknownKind(s.to_string()))
    }
}

/// Why a chart request was rejected
#[derive(Error, Debug)]
pub enum ChartError {
    #[error("{chart} chart requires {requirement}")]
    InvalidAxisCombination {
        chart: ChartKind,
        x: Option<String>,
        y: Option<String>,
        requirement: &'static str,
    },

    #[error("{chart} chart needs {required}+ numeric columns, found {found}")]
    InsufficientColumns {
        chart: ChartKind,
        required: usize,
        found: usize,
    },

    #[error("Unknown chart type: {0}")]
    UnknownKind(String),

    #[error(transparent)]
    Data(#[from] DataError),
}

/// The data a chart draws
#[derive(Debug, Clone, PartialEq)]
pub enum ChartData {
    /// Rows plotted directly, or aggregated by `x` for a pie
    Table(RecordBatch),
    /// Pairwise correlation of every numeric column
    Correlation(CorrelationMatrix),
}

/// A validated chart request
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub x: Option<String>,
    pub y: Option<String>,
    pub data: ChartData,
}

/// Minimum numeric columns for a correlation heatmap
pub const HEATMAP_MIN_NUMERIC: usize = 2;

/// Validate a chart request against the table's column classes
///
/// `classes` must describe `table` as it is now.
pub fn build(
    kind: ChartKind,
    x: Option<&str>,
    y: Option<&str>,
    table: &RecordBatch,
    classes: &TableClasses,
) -> Result<ChartSpec, ChartError> {
    let invalid = |requirement: &'static str| ChartError::InvalidAxisCombination {
        chart: kind,
        x: x.map(str::to_string),
        y: y.map(str::to_string),
        requirement,
    };
    let x_class = x.and_then(|name| classes.class_of(name));
    let y_is_numeric = y.and_then(|name| classes.class_of(name)) == Some(ColumnClass::Numeric);

    let spec = match kind {
        ChartKind::Bar | ChartKind::Line | ChartKind::Scatter => {
            if x_class.is_none() {
                return Err(invalid("an x column present in the table"));
            }
            if !y_is_numeric {
                return Err(invalid("a numeric y column"));
            }
            ChartSpec {
                kind,
                x: x.map(str::to_string),
                y: y.map(str::to_string),
                data: ChartData::Table(table.clone()),
            }
        }
        ChartKind::Pie => {
            if !x_class.map(|c| c.is_categorical()).unwrap_or(false) || !y_is_numeric {
                return Err(invalid("categorical x and numeric y"));
            }
            ChartSpec {
                kind,
                x: x.map(str::to_string),
                y: y.map(str::to_string),
                data: ChartData::Table(table.clone()),
            }
        }
        ChartKind::Heatmap => {
            let numeric: Vec<String> = classes.numeric().into_iter().map(str::to_string).collect();
            if numeric.len() < HEATMAP_MIN_NUMERIC {
                return Err(ChartError::InsufficientColumns {
                    chart: kind,
                    required: HEATMAP_MIN_NUMERIC,
                    found: numeric.len(),
                });
            }
            ChartSpec {
                kind,
                x: None,
                y: None,
                data: ChartData::Correlation(CorrelationMatrix::from_batch(table, &numeric)?),
            }
        }
    };

    debug!(chart = %kind, x = ?spec.x, y = ?spec.y, "Built chart request");
    Ok(spec)
}
