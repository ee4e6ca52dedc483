//! Chart image export
//!
//! Rasterizes a [`ChartSpec`] to PNG. This is a convenience download, not the
//! interactive chart. The drawing backend is built without a font engine, so
//! images carry marks and axis lines only, never text.

use std::f64::consts::PI;
use std::panic::{catch_unwind, AssertUnwindSafe};
use arrow::array::{Array, StringArray, TimestampMillisecondArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, TimeUnit};
use arrow::record_batch::RecordBatch;
use image::{codecs::png::PngEncoder, ColorType, ImageEncoder};
use indexmap::IndexMap;
use plotters::coord::Shift;
use plotters::prelude::*;
use thiserror::Error;
use tracing::debug;

use il_data::{numeric_values, CorrelationMatrix, DataError};
use crate::chart::{ChartData, ChartKind, ChartSpec};
use crate::colors::{categorical_color, correlation_color};

/// Export options for chart images
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartImageOptions {
    /// Width of the exported image
    pub width: u32,
    /// Height of the exported image
    pub height: u32,
}

impl Default for ChartImageOptions {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 768,
        }
    }
}

/// Why a chart image could not be produced
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Chart has nothing to draw")]
    NoData,

    #[error("Drawing failed: {0}")]
    Backend(String),

    #[error("PNG encoding failed: {0}")]
    Encode(String),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

fn backend<E: std::fmt::Display>(error: E) -> RenderError {
    RenderError::Backend(error.to_string())
}

/// Render `spec` to PNG bytes
pub fn render_png(spec: &ChartSpec, options: &ChartImageOptions) -> Result<Vec<u8>, RenderError> {
    let (width, height) = (options.width, options.height);
    if width == 0 || height == 0 {
        return Err(RenderError::Backend("image dimensions must be non-zero".to_string()));
    }

    let mut pixels = vec![255u8; width as usize * height as usize * 3];

    // A panic inside the drawing backend becomes an error, never a crash
    catch_unwind(AssertUnwindSafe(|| draw(spec, &mut pixels, (width, height))))
        .map_err(|_| RenderError::Backend("drawing backend panicked".to_string()))??;

    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(&pixels, width, height, ColorType::Rgb8)
        .map_err(|e| RenderError::Encode(e.to_string()))?;

    debug!(chart = %spec.kind, bytes = png.len(), "Rendered chart image");
    Ok(png)
}

fn draw(spec: &ChartSpec, pixels: &mut [u8], size: (u32, u32)) -> Result<(), RenderError> {
    let root = BitMapBackend::with_buffer(pixels, size).into_drawing_area();
    root.fill(&WHITE).map_err(backend)?;

    match (&spec.data, spec.kind) {
        (ChartData::Correlation(matrix), _) => draw_heatmap(&root, matrix)?,
        (ChartData::Table(table), ChartKind::Pie) => draw_pie(&root, spec, table)?,
        (ChartData::Table(table), _) => draw_xy(&root, spec, table)?,
    }

    root.present().map_err(backend)
}

/// X positions for a column: numbers as-is, datetimes as epoch milliseconds,
/// anything else as the index of its first appearance
fn x_positions(array: &dyn Array) -> Result<Vec<Option<f64>>, RenderError> {
    match array.data_type() {
        dt if dt.is_numeric() => Ok(numeric_values(array)?),
        DataType::Timestamp(_, _) | DataType::Date32 | DataType::Date64 => {
            let stamps = cast(array, &DataType::Timestamp(TimeUnit::Millisecond, None))?;
            let stamps = stamps
                .as_any()
                .downcast_ref::<TimestampMillisecondArray>()
                .ok_or(RenderError::NoData)?;
            Ok(stamps.iter().map(|v| v.map(|ms| ms as f64)).collect())
        }
        _ => {
            let text = cast(array, &DataType::Utf8)?;
            let text = text.as_any().downcast_ref::<StringArray>().ok_or(RenderError::NoData)?;
            let mut seen: IndexMap<&str, usize> = IndexMap::new();
            Ok(text
                .iter()
                .map(|v| {
                    v.map(|v| {
                        let next = seen.len();
                        *seen.entry(v).or_insert(next) as f64
                    })
                })
                .collect())
        }
    }
}

fn column<'a>(table: &'a RecordBatch, name: Option<&str>) -> Result<&'a dyn Array, RenderError> {
    name.and_then(|n| table.column_by_name(n))
        .map(|a| a.as_ref())
        .ok_or(RenderError::NoData)
}

fn padded_range(values: impl Iterator<Item = f64>, include_zero: bool) -> Option<std::ops::Range<f64>> {
    let (mut lo, mut hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() || !hi.is_finite() {
        return None;
    }
    if include_zero {
        lo = lo.min(0.0);
        hi = hi.max(0.0);
    }
    let pad = if hi > lo { (hi - lo) * 0.05 } else { 1.0 };
    Some((lo - pad)..(hi + pad))
}

fn draw_xy<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    spec: &ChartSpec,
    table: &RecordBatch,
) -> Result<(), RenderError> {
    let xs = x_positions(column(table, spec.x.as_deref())?)?;
    let ys = numeric_values(column(table, spec.y.as_deref())?)?;

    let mut points: Vec<(f64, f64)> = xs
        .iter()
        .zip(&ys)
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .collect();

    // Bars stack per x value
    if spec.kind == ChartKind::Bar {
        let mut totals: IndexMap<u64, (f64, f64)> = IndexMap::new();
        for (x, y) in points {
            totals.entry(x.to_bits()).or_insert((x, 0.0)).1 += y;
        }
        points = totals.into_values().collect();
    }
    if points.is_empty() {
        return Err(RenderError::NoData);
    }

    let is_bar = spec.kind == ChartKind::Bar;
    let x_range = padded_range(points.iter().map(|p| p.0), false).ok_or(RenderError::NoData)?;
    let y_range = padded_range(points.iter().map(|p| p.1), is_bar).ok_or(RenderError::NoData)?;
    let (x0, x1) = (x_range.start, x_range.end);
    let (y0, y1) = (y_range.start, y_range.end);

    // No caption or mesh labels: both would need a font engine
    let mut chart = ChartBuilder::on(root)
        .margin(30)
        .build_cartesian_2d(x_range, y_range)
        .map_err(backend)?;

    let baseline = if y0 <= 0.0 && 0.0 <= y1 { 0.0 } else { y0 };
    chart
        .draw_series([
            PathElement::new(vec![(x0, baseline), (x1, baseline)], BLACK),
            PathElement::new(vec![(x0, y0), (x0, y1)], BLACK),
        ])
        .map_err(backend)?;

    let color = categorical_color(0);
    match spec.kind {
        ChartKind::Line => {
            chart
                .draw_series(LineSeries::new(points.iter().copied(), &color))
                .map_err(backend)?;
        }
        ChartKind::Scatter => {
            chart
                .draw_series(points.iter().map(|&(x, y)| Circle::new((x, y), 3, color.filled())))
                .map_err(backend)?;
        }
        _ => {
            // Bar width follows the tightest spacing between x positions
            let mut sorted: Vec<f64> = points.iter().map(|p| p.0).collect();
            sorted.sort_by(|a, b| a.total_cmp(b));
            let gap = sorted
                .windows(2)
                .map(|w| w[1] - w[0])
                .filter(|d| *d > 0.0)
                .fold(f64::INFINITY, f64::min);
            let half = if gap.is_finite() { gap * 0.4 } else { 0.4 };

            chart
                .draw_series(
                    points
                        .iter()
                        .map(|&(x, y)| Rectangle::new([(x - half, 0.0), (x + half, y)], color.filled())),
                )
                .map_err(backend)?;
        }
    }

    Ok(())
}

/// Pie slices sum the y values of each x category; non-positive totals are skipped
fn draw_pie<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    spec: &ChartSpec,
    table: &RecordBatch,
) -> Result<(), RenderError> {
    let names = cast(column(table, spec.x.as_deref())?, &DataType::Utf8)?;
    let names = names.as_any().downcast_ref::<StringArray>().ok_or(RenderError::NoData)?;
    let values = numeric_values(column(table, spec.y.as_deref())?)?;

    let mut totals: IndexMap<&str, f64> = IndexMap::new();
    for (name, value) in names.iter().zip(&values) {
        if let (Some(name), Some(value)) = (name, value) {
            *totals.entry(name).or_insert(0.0) += value;
        }
    }
    totals.retain(|_, v| *v > 0.0);

    let total: f64 = totals.values().sum();
    if total <= 0.0 {
        return Err(RenderError::NoData);
    }

    let (w, h) = root.dim_in_pixel();
    let center = (w as f64 / 2.0, h as f64 / 2.0);
    let radius = w.min(h) as f64 * 0.4;

    let mut start = -PI / 2.0;
    for (idx, value) in totals.values().enumerate() {
        let sweep = value / total * 2.0 * PI;
        let steps = ((sweep / (2.0 * PI)) * 360.0).ceil().max(1.0) as usize;

        let mut outline = vec![(center.0 as i32, center.1 as i32)];
        for step in 0..=steps {
            let angle = start + sweep * step as f64 / steps as f64;
            outline.push((
                (center.0 + radius * angle.cos()) as i32,
                (center.1 + radius * angle.sin()) as i32,
            ));
        }

        root.draw(&Polygon::new(outline, categorical_color(idx).filled()))
            .map_err(backend)?;
        start += sweep;
    }

    Ok(())
}

fn draw_heatmap<DB: DrawingBackend>(root: &DrawingArea<DB, Shift>, matrix: &CorrelationMatrix) -> Result<(), RenderError> {
    let n = matrix.columns.len();
    if n == 0 {
        return Err(RenderError::NoData);
    }

    let (w, h) = root.dim_in_pixel();
    let margin = 40i32;
    let cell_w = ((w as i32 - 2 * margin) / n as i32).max(1);
    let cell_h = ((h as i32 - 2 * margin) / n as i32).max(1);

    for (i, row) in matrix.values.iter().enumerate() {
        for (j, r) in row.iter().enumerate() {
            let x0 = margin + j as i32 * cell_w;
            let y0 = margin + i as i32 * cell_h;
            root.draw(&Rectangle::new([(x0, y0), (x0 + cell_w, y0 + cell_h)], correlation_color(*r).filled()))
                .map_err(backend)?;
        }
    }

    Ok(())
}
