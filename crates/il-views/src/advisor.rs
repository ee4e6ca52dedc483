//! Automatic chart selection
//!
//! The chart type comes from a fixed, ordered decision table over the number
//! of columns in each class; the first rule that applies wins.

use arrow::record_batch::RecordBatch;
use il_data::TableClasses;
use tracing::{debug, info};

use crate::chart::{build, ChartKind, ChartSpec};

/// Column counts per class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClassCounts {
    pub numeric: usize,
    pub datetime: usize,
    pub categorical: usize,
}

impl ClassCounts {
    pub fn from_classes(classes: &TableClasses) -> Self {
        Self {
            numeric: classes.numeric().len(),
            datetime: classes.datetime().len(),
            categorical: classes.categorical().len(),
        }
    }
}

struct Rule {
    kind: ChartKind,
    applies: fn(&ClassCounts) -> bool,
}

fn time_series(c: &ClassCounts) -> bool {
    c.datetime >= 1 && c.numeric >= 1
}

fn single_measure_by_category(c: &ClassCounts) -> bool {
    c.categorical >= 1 && c.numeric == 1
}

fn numeric_pair(c: &ClassCounts) -> bool {
    c.numeric >= 2
}

fn wide_numeric(c: &ClassCounts) -> bool {
    c.numeric >= 5
}

/// Ordered decision table
///
/// The heatmap rule can never fire: any table it matches has already matched
/// `numeric_pair`. Its position is deliberate and covered by a test.
const RULES: &[Rule] = &[
    Rule { kind: ChartKind::Line, applies: time_series },
    Rule { kind: ChartKind::Bar, applies: single_measure_by_category },
    Rule { kind: ChartKind::Scatter, applies: numeric_pair },
    Rule { kind: ChartKind::Heatmap, applies: wide_numeric },
];

/// Chart used when no rule applies
const FALLBACK: ChartKind = ChartKind::Bar;

/// Pick a chart type for counts of classified columns
pub fn suggest_for_counts(counts: &ClassCounts) -> ChartKind {
    RULES
        .iter()
        .find(|rule| (rule.applies)(counts))
        .map(|rule| rule.kind)
        .unwrap_or(FALLBACK)
}

/// Pick a chart type for a classified table
pub fn suggest(classes: &TableClasses) -> ChartKind {
    let counts = ClassCounts::from_classes(classes);
    let kind = suggest_for_counts(&counts);
    debug!(?counts, chart = %kind, "Suggested chart");
    kind
}

/// Default axis columns
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AxisSelection {
    pub x: Option<String>,
    pub y: Option<String>,
}

/// First column as x, first numeric column as y
pub fn default_axes(classes: &TableClasses) -> AxisSelection {
    AxisSelection {
        x: classes.first_column().map(str::to_string),
        y: classes.numeric().first().map(|s| s.to_string()),
    }
}

/// Suggest a chart and build it with default axes
///
/// A scatter plots the first two numeric columns against each other. Returns
/// `None` when the defaults do not make a valid chart, e.g. a table without
/// numeric columns.
pub fn suggest_chart(table: &RecordBatch, classes: &TableClasses) -> Option<ChartSpec> {
    let kind = suggest(classes);
    let numeric = classes.numeric();

    let axes = match kind {
        ChartKind::Scatter | ChartKind::Heatmap => {
            if numeric.len() < 2 {
                return None;
            }
            AxisSelection {
                x: Some(numeric[0].to_string()),
                y: Some(numeric[1].to_string()),
            }
        }
        _ => default_axes(classes),
    };

    match build(kind, axes.x.as_deref(), axes.y.as_deref(), table, classes) {
        Ok(spec) => {
            info!(chart = %kind, x = ?spec.x, y = ?spec.y, "Built suggested chart");
            Some(spec)
        }
        Err(e) => {
            debug!(chart = %kind, error = %e, "No chart for suggestion");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
    use arrow::datatypes::{Field, Schema};
    use il_data::{ClassifiedColumn, ColumnClass, DEFAULT_CATEGORICAL_THRESHOLD};

    fn classes(spec: &[(&str, ColumnClass)]) -> TableClasses {
        TableClasses::from_columns(
            spec.iter()
                .map(|(name, class)| ClassifiedColumn { name: name.to_string(), class: *class })
                .collect(),
        )
    }

    fn counts(numeric: usize, datetime: usize, categorical: usize) -> ClassCounts {
        ClassCounts { numeric, datetime, categorical }
    }

    #[test]
    fn test_time_series_beats_category() {
        let table = classes(&[
            ("day", ColumnClass::Datetime),
            ("sales", ColumnClass::Numeric),
            ("city", ColumnClass::CategoricalLow),
            ("store", ColumnClass::CategoricalLow),
            ("sku", ColumnClass::CategoricalHigh),
        ]);
        assert_eq!(suggest(&table), ChartKind::Line);
    }

    #[test]
    fn test_category_with_single_measure() {
        assert_eq!(suggest_for_counts(&counts(1, 0, 1)), ChartKind::Bar);
        assert_eq!(suggest_for_counts(&counts(1, 0, 0)), ChartKind::Bar);
        assert_eq!(suggest_for_counts(&counts(2, 0, 1)), ChartKind::Scatter);
    }

    #[test]
    fn test_two_numeric_is_scatter() {
        let table = classes(&[("a", ColumnClass::Numeric), ("b", ColumnClass::Numeric)]);
        assert_eq!(suggest(&table), ChartKind::Scatter);
    }

    #[test]
    fn test_heatmap_rule_is_shadowed() {
        // The wide-numeric rule exists in the table but scatter always wins first
        for numeric in 5..12 {
            assert_eq!(suggest_for_counts(&counts(numeric, 0, 0)), ChartKind::Scatter);
        }
        assert!(RULES.iter().any(|rule| rule.kind == ChartKind::Heatmap));
    }

    #[test]
    fn test_fallback_is_bar() {
        assert_eq!(suggest_for_counts(&counts(0, 0, 0)), ChartKind::Bar);
        assert_eq!(suggest_for_counts(&counts(0, 2, 3)), ChartKind::Bar);
    }

    #[test]
    fn test_default_axes() {
        let mixed = classes(&[
            ("city", ColumnClass::CategoricalLow),
            ("units", ColumnClass::Numeric),
            ("price", ColumnClass::Numeric),
        ]);
        assert_eq!(
            default_axes(&mixed),
            AxisSelection { x: Some("city".to_string()), y: Some("units".to_string()) }
        );

        let text_only = classes(&[("city", ColumnClass::CategoricalLow)]);
        assert_eq!(default_axes(&text_only).y, None);
    }

    fn batch(columns: Vec<(&str, ArrayRef)>) -> RecordBatch {
        let fields: Vec<Field> = columns
            .iter()
            .map(|(name, array)| Field::new(*name, array.data_type().clone(), true))
            .collect();
        let arrays = columns.into_iter().map(|(_, a)| a).collect();
        RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).unwrap()
    }

    #[test]
    fn test_suggest_chart_scatter_axes() {
        let table = batch(vec![
            ("label", Arc::new(StringArray::from(vec!["p", "q"])) as ArrayRef),
            ("a", Arc::new(Int64Array::from(vec![1, 2])) as ArrayRef),
            ("b", Arc::new(Float64Array::from(vec![0.5, 0.7])) as ArrayRef),
        ]);
        let classes = TableClasses::from_batch(&table, DEFAULT_CATEGORICAL_THRESHOLD);

        let spec = suggest_chart(&table, &classes).unwrap();
        assert_eq!(spec.kind, ChartKind::Scatter);
        assert_eq!(spec.x.as_deref(), Some("a"));
        assert_eq!(spec.y.as_deref(), Some("b"));
    }

    #[test]
    fn test_suggest_chart_without_numeric_is_empty() {
        let table = batch(vec![("label", Arc::new(StringArray::from(vec!["p", "q"])) as ArrayRef)]);
        let classes = TableClasses::from_batch(&table, DEFAULT_CATEGORICAL_THRESHOLD);

        assert_eq!(suggest(&classes), ChartKind::Bar);
        assert!(suggest_chart(&table, &classes).is_none());
    }
}
