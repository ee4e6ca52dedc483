//! Statistical helpers shared by filtering and charting

use arrow::array::{Array, Float64Array};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;

use crate::DataError;

/// Calculate quartiles using linear interpolation
///
/// Returns `None` for an empty slice. NaN values must be removed first.
pub fn quartiles(values: &[f64]) -> Option<(f64, f64, f64)> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = sorted.len();
    let q1 = interpolate(&sorted, (n - 1) as f64 * 0.25);
    let q2 = interpolate(&sorted, (n - 1) as f64 * 0.5);
    let q3 = interpolate(&sorted, (n - 1) as f64 * 0.75);

    Some((q1, q2, q3))
}

fn interpolate(sorted: &[f64], idx: f64) -> f64 {
    let lower = idx.floor() as usize;
    let upper = idx.ceil() as usize;

    if lower == upper || upper >= sorted.len() {
        sorted[lower]
    } else {
        let fraction = idx - lower as f64;
        sorted[lower] * (1.0 - fraction) + sorted[upper] * fraction
    }
}

/// Fences of the interquartile-range outlier rule
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IqrBounds {
    pub q1: f64,
    pub q3: f64,
    pub lower: f64,
    pub upper: f64,
}

impl IqrBounds {
    /// Compute `[q1 - factor * iqr, q3 + factor * iqr]`
    pub fn from_values(values: &[f64], factor: f64) -> Option<Self> {
        let (q1, _, q3) = quartiles(values)?;
        let iqr = q3 - q1;
        Some(Self {
            q1,
            q3,
            lower: q1 - factor * iqr,
            upper: q3 + factor * iqr,
        })
    }

    /// Whether `value` lies outside the fences
    pub fn is_outlier(&self, value: f64) -> bool {
        value < self.lower || value > self.upper
    }
}

/// Pearson correlation over the positions where both inputs are present
///
/// NaN when fewer than two pairs remain or either side has no variance.
pub fn pearson(x: &[Option<f64>], y: &[Option<f64>]) -> f64 {
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y)
        .filter_map(|(a, b)| match (a, b) {
            (Some(a), Some(b)) if a.is_finite() && b.is_finite() => Some((*a, *b)),
            _ => None,
        })
        .collect();

    if pairs.len() < 2 {
        return f64::NAN;
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;

    for (a, b) in &pairs {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        f64::NAN
    } else {
        cov / (var_x.sqrt() * var_y.sqrt())
    }
}

/// Read any numeric array as optional floats
pub fn numeric_values(array: &dyn Array) -> Result<Vec<Option<f64>>, DataError> {
    let floats = cast(array, &DataType::Float64)?;
    let floats = floats
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| DataError::Other("cast to Float64 did not produce a Float64Array".to_string()))?;

    Ok(floats
        .iter()
        .map(|v| v.filter(|v| !v.is_nan()))
        .collect())
}

/// Pairwise Pearson correlation of a set of numeric columns
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    /// Column names, in table order; rows and columns of `values` follow it
    pub columns: Vec<String>,
    /// Row-major `columns.len()` x `columns.len()` coefficients
    pub values: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    /// Correlate the named columns of `batch`
    pub fn from_batch(batch: &RecordBatch, columns: &[String]) -> Result<Self, DataError> {
        let data = columns
            .iter()
            .map(|name| {
                let array = batch
                    .column_by_name(name)
                    .ok_or_else(|| DataError::Other(format!("column not found: {}", name)))?;
                numeric_values(array.as_ref())
            })
            .collect::<Result<Vec<_>, DataError>>()?;

        let n = columns.len();
        let mut values = vec![vec![f64::NAN; n]; n];
        for i in 0..n {
            for j in i..n {
                let r = pearson(&data[i], &data[j]);
                values[i][j] = r;
                values[j][i] = r;
            }
        }

        Ok(Self {
            columns: columns.to_vec(),
            values,
        })
    }

    pub fn get(&self, row: &str, column: &str) -> Option<f64> {
        let i = self.columns.iter().position(|c| c == row)?;
        let j = self.columns.iter().position(|c| c == column)?;
        Some(self.values[i][j])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use arrow::array::{ArrayRef, Int64Array};
    use arrow::datatypes::{Field, Schema};

    #[test]
    fn test_quartiles_linear() {
        let (q1, q2, q3) = quartiles(&[1.0, 2.0, 3.0, 100.0]).unwrap();
        assert!((q1 - 1.75).abs() < 1e-9);
        assert!((q2 - 2.5).abs() < 1e-9);
        assert!((q3 - 27.25).abs() < 1e-9);
        assert!(quartiles(&[]).is_none());
    }

    #[test]
    fn test_iqr_bounds_ordered() {
        for values in [vec![5.0], vec![1.0, 1.0, 1.0], vec![-3.0, 10.0, 2.0, 8.5, 4.0]] {
            let bounds = IqrBounds::from_values(&values, 1.5).unwrap();
            assert!(bounds.lower <= bounds.upper);
        }
    }

    #[test]
    fn test_pearson() {
        let x = vec![Some(1.0), Some(2.0), Some(3.0), None];
        let y = vec![Some(2.0), Some(4.0), Some(6.0), Some(100.0)];
        assert!((pearson(&x, &y) - 1.0).abs() < 1e-9);

        let flat = vec![Some(1.0), Some(1.0), Some(1.0)];
        assert!(pearson(&flat, &flat).is_nan());
    }

    #[test]
    fn test_correlation_matrix() {
        let schema = Schema::new(vec![
            Field::new("a", DataType::Int64, true),
            Field::new("b", DataType::Float64, true),
        ]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3])) as ArrayRef,
                Arc::new(Float64Array::from(vec![3.0, 2.0, 1.0])) as ArrayRef,
            ],
        )
        .unwrap();

        let matrix = CorrelationMatrix::from_batch(&batch, &["a".to_string(), "b".to_string()]).unwrap();
        assert!((matrix.get("a", "a").unwrap() - 1.0).abs() < 1e-9);
        assert!((matrix.get("a", "b").unwrap() + 1.0).abs() < 1e-9);
        assert_eq!(matrix.get("a", "b"), matrix.get("b", "a"));
    }
}
