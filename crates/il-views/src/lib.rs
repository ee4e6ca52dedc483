//! Chart requests, chart suggestions and chart image export

pub mod advisor;
pub mod chart;
pub mod colors;
pub mod export;

// Re-exports
pub use advisor::{default_axes, suggest, suggest_chart, suggest_for_counts, AxisSelection, ClassCounts};
pub use chart::{build, ChartData, ChartError, ChartKind, ChartSpec, HEATMAP_MIN_NUMERIC};
pub use colors::{categorical_color, correlation_color, viridis_color};
pub use export::{render_png, ChartImageOptions, RenderError};
