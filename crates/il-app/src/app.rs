//! Interactive session driver
//!
//! Each command runs one full pass over the selected dataset: coerce a
//! working copy, classify it, then filter or chart it. Nothing is cached
//! between commands except the filter choices.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use indexmap::IndexMap;
use tokio::runtime::Runtime;
use tracing::{info, warn};

use il_ask::{ask, OllamaClient};
use il_core::{Session, Settings};
use il_data::{
    apply, cleaned_file_name, coerce_table, column_domain, export_csv, load_uploads, ColumnDomain, FilterOptions,
    FilterSelection, NullConfig, TableClasses,
};
use il_views::{build, render_png, suggest, suggest_chart, ChartData, ChartImageOptions, ChartSpec};

use crate::commands::{Command, FilterCommand, HELP};

/// File name of exported chart images
pub const CHART_FILE_NAME: &str = "chart.png";

const NO_DATASET: &str = "No dataset selected. Upload one with `load FILE`.";

pub struct App {
    session: Session,
    runtime: Runtime,
    client: OllamaClient,
    null_config: NullConfig,
    filters: IndexMap<String, FilterSelection>,
    options: FilterOptions,
    output_dir: PathBuf,
}

impl App {
    /// Create a driver whose saved files land in `output_dir`
    pub fn new(settings: Settings, output_dir: impl Into<PathBuf>) -> Result<Self> {
        let runtime = Runtime::new().context("Failed to start async runtime")?;
        let client = OllamaClient::new(
            settings.llm.base_url.clone(),
            settings.llm.timeout_secs.map(Duration::from_secs),
        )
        .context("Failed to create language model client")?;
        let options = FilterOptions {
            iqr_factor: settings.outlier_iqr_factor,
            ..FilterOptions::default()
        };

        let null_config = NullConfig::default().with_tokens(settings.extra_null_tokens.iter().cloned());

        Ok(Self {
            session: Session::new(settings),
            runtime,
            client,
            null_config,
            filters: IndexMap::new(),
            options,
            output_dir: output_dir.into(),
        })
    }

    /// Read files from disk and upload them
    pub fn load_paths(&mut self, paths: &[String], out: &mut dyn Write) -> Result<()> {
        let mut files = Vec::new();
        for path in paths {
            let path = Path::new(path);
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            match std::fs::read(path) {
                Ok(bytes) => files.push((name, bytes)),
                Err(e) => writeln!(out, "Failed to read {}: {}", name, e)?,
            }
        }
        self.upload(files, out)
    }

    /// Register uploaded files; a file that fails to parse is reported and skipped
    pub fn upload(&mut self, files: Vec<(String, Vec<u8>)>, out: &mut dyn Write) -> Result<()> {
        let selected = self.session.selected().map(|(name, _)| name.to_string());

        for (name, result) in load_uploads(files, &self.null_config) {
            match result {
                Ok(table) => {
                    writeln!(out, "Loaded {}: {} rows x {} columns", name, table.num_rows(), table.num_columns())?;
                    // Filters belong to the table they were chosen for
                    if selected.as_deref() == Some(name.as_str()) {
                        self.filters.clear();
                    }
                    self.session.insert(name, table);
                }
                Err(e) => writeln!(out, "Failed to read {}: {}", name, e)?,
            }
        }
        Ok(())
    }

    /// Run one command; returns `false` when the session should end
    pub fn execute(&mut self, command: Command, out: &mut dyn Write) -> Result<bool> {
        match command {
            Command::Load(paths) => self.load_paths(&paths, out)?,
            Command::Datasets => self.list_datasets(out)?,
            Command::Use(name) => match self.session.select(&name) {
                Ok(()) => {
                    self.filters.clear();
                    writeln!(out, "Selected {}", name)?;
                }
                Err(e) => writeln!(out, "{}", e)?,
            },
            Command::Preview => self.preview(out)?,
            Command::Columns => self.columns(out)?,
            Command::Filter(filter) => self.filter(filter, out)?,
            Command::Show => self.show(out)?,
            Command::Save => self.save(out)?,
            Command::Ask(question) => self.ask(&question, out)?,
            Command::Chart { kind, x, y } => {
                let Some((table, classes)) = self.working()? else {
                    writeln!(out, "{}", NO_DATASET)?;
                    return Ok(true);
                };
                match build(kind, x.as_deref(), y.as_deref(), &table, &classes) {
                    Ok(spec) => self.emit_chart(&spec, out)?,
                    Err(e) => writeln!(out, "Warning: {}", e)?,
                }
            }
            Command::Suggest => self.suggest(out)?,
            Command::Help => writeln!(out, "{}", HELP)?,
            Command::Quit => return Ok(false),
        }
        Ok(true)
    }

    /// The selected dataset with text dates coerced, and its column classes
    fn working(&self) -> Result<Option<(RecordBatch, TableClasses)>> {
        let Some(copy) = self.session.working_copy() else {
            return Ok(None);
        };
        let table = coerce_table(&copy)?;
        let classes = TableClasses::from_batch(&table, self.session.settings().categorical_threshold);
        Ok(Some((table, classes)))
    }

    /// The working table after the pre-passes and column filters
    fn cleaned(&self) -> Result<Option<RecordBatch>> {
        let Some((table, classes)) = self.working()? else {
            return Ok(None);
        };
        Ok(Some(apply(&table, &classes, &self.filters, &self.options)?))
    }

    fn list_datasets(&self, out: &mut dyn Write) -> Result<()> {
        if self.session.is_empty() {
            writeln!(out, "No datasets uploaded")?;
            return Ok(());
        }
        let selected = self.session.selected().map(|(name, _)| name);
        for name in self.session.names() {
            let marker = if Some(name) == selected { "*" } else { " " };
            writeln!(out, "{} {}", marker, name)?;
        }
        Ok(())
    }

    fn print_head(&self, table: &RecordBatch, rows: usize, out: &mut dyn Write) -> Result<()> {
        let head = table.slice(0, rows.min(table.num_rows()));
        writeln!(out, "{}", pretty_format_batches(&[head])?)?;
        if table.num_rows() > rows {
            writeln!(out, "({} of {} rows shown)", rows, table.num_rows())?;
        }
        Ok(())
    }

    fn preview(&self, out: &mut dyn Write) -> Result<()> {
        match self.session.selected() {
            Some((_, table)) => self.print_head(table, self.session.settings().max_preview_rows, out),
            None => Ok(writeln!(out, "{}", NO_DATASET)?),
        }
    }

    fn columns(&self, out: &mut dyn Write) -> Result<()> {
        let Some((table, classes)) = self.working()? else {
            writeln!(out, "{}", NO_DATASET)?;
            return Ok(());
        };

        for column in classes.columns() {
            let control = match column_domain(&table, &column.name, column.class)? {
                ColumnDomain::Numeric(Some((lo, hi))) => format!("range {}..{}", lo, hi),
                ColumnDomain::Dates(Some((start, end))) => format!("dates {}..{}", start, end),
                ColumnDomain::Numeric(None) | ColumnDomain::Dates(None) => "no values".to_string(),
                ColumnDomain::Values(values) => format!("values {}", values.join("|")),
                ColumnDomain::NoControl => "no filter".to_string(),
            };
            writeln!(out, "{:<20} {:<16} {}", column.name, column.class.label(), control)?;
        }
        Ok(())
    }

    fn filter(&mut self, command: FilterCommand, out: &mut dyn Write) -> Result<()> {
        match command {
            FilterCommand::Nulls(on) => self.options.drop_nulls = on,
            FilterCommand::Outliers(on) => self.options.drop_outliers_iqr = on,
            FilterCommand::Clear(None) => self.filters.clear(),
            FilterCommand::Clear(Some(column)) => {
                self.filters.shift_remove(&column);
            }
            FilterCommand::Set { column, selection } => {
                let previous = self.filters.insert(column.clone(), selection);
                if let Err(e) = self.cleaned() {
                    warn!(column = %column, error = %e, "Rejected filter");
                    match previous {
                        Some(previous) => self.filters.insert(column, previous),
                        None => self.filters.shift_remove(&column),
                    };
                    writeln!(out, "Warning: {}", e)?;
                    return Ok(());
                }
            }
        }

        match (self.working()?, self.cleaned()?) {
            (Some((table, _)), Some(cleaned)) => {
                writeln!(out, "{} of {} rows kept", cleaned.num_rows(), table.num_rows())?
            }
            _ => writeln!(out, "{}", NO_DATASET)?,
        }
        Ok(())
    }

    fn show(&self, out: &mut dyn Write) -> Result<()> {
        match self.cleaned()? {
            Some(cleaned) => self.print_head(&cleaned, self.session.settings().max_preview_rows, out),
            None => Ok(writeln!(out, "{}", NO_DATASET)?),
        }
    }

    fn save(&self, out: &mut dyn Write) -> Result<()> {
        let (Some((name, _)), Some(cleaned)) = (self.session.selected(), self.cleaned()?) else {
            writeln!(out, "{}", NO_DATASET)?;
            return Ok(());
        };

        let path = self.output_dir.join(cleaned_file_name(name));
        std::fs::write(&path, export_csv(&cleaned)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), rows = cleaned.num_rows(), "Saved cleaned dataset");
        writeln!(out, "Saved {} rows to {}", cleaned.num_rows(), path.display())?;
        Ok(())
    }

    fn ask(&self, question: &str, out: &mut dyn Write) -> Result<()> {
        let Some((_, table)) = self.session.selected() else {
            writeln!(out, "{}", NO_DATASET)?;
            return Ok(());
        };
        let settings = self.session.settings();
        self.print_head(table, settings.preview_rows, out)?;

        let result = self.runtime.block_on(ask(
            &self.client,
            &settings.llm.model,
            question,
            table,
            settings.prompt_rows,
        ));
        match result {
            Ok(Some(answer)) => writeln!(out, "AI Response:\n{}", answer)?,
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Language model request failed");
                writeln!(out, "Warning: could not get an answer: {}", e)?;
            }
        }
        Ok(())
    }

    fn suggest(&self, out: &mut dyn Write) -> Result<()> {
        let Some((table, classes)) = self.working()? else {
            writeln!(out, "{}", NO_DATASET)?;
            return Ok(());
        };

        writeln!(out, "Suggested Chart Type: {} Plot", suggest(&classes))?;
        self.print_head(&table, self.session.settings().preview_rows, out)?;

        match suggest_chart(&table, &classes) {
            Some(spec) => self.emit_chart(&spec, out),
            None => Ok(writeln!(out, "No chart for the default axes")?),
        }
    }

    /// Describe a chart and write its image; a failed image is only a hint
    fn emit_chart(&self, spec: &ChartSpec, out: &mut dyn Write) -> Result<()> {
        match &spec.data {
            ChartData::Table(table) => writeln!(
                out,
                "{} chart: x = {}, y = {} ({} rows)",
                spec.kind,
                spec.x.as_deref().unwrap_or("-"),
                spec.y.as_deref().unwrap_or("-"),
                table.num_rows()
            )?,
            ChartData::Correlation(matrix) => {
                writeln!(out, "{} chart: correlation of {}", spec.kind, matrix.columns.join(", "))?;
                for (name, row) in matrix.columns.iter().zip(&matrix.values) {
                    let cells: Vec<String> = row.iter().map(|r| format!("{:>6.2}", r)).collect();
                    writeln!(out, "{:<16} {}", name, cells.join(" "))?;
                }
            }
        }

        let chart = &self.session.settings().chart;
        let options = ChartImageOptions {
            width: chart.width,
            height: chart.height,
        };
        match render_png(spec, &options) {
            Ok(png) => {
                let path = self.output_dir.join(CHART_FILE_NAME);
                match std::fs::write(&path, png) {
                    Ok(()) => writeln!(out, "Chart image written to {}", path.display())?,
                    Err(e) => writeln!(out, "Chart image unavailable: {}", e)?,
                }
            }
            Err(e) => {
                warn!(error = %e, "Chart image export failed");
                writeln!(out, "Chart image unavailable: {}", e)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SALES: &str = "day,city,units,price
2024-01-01,a,3,1.5
2024-01-02,b,5,2.0
2024-01-03,a,,0.5
2024-01-04,c,8,3.5
2024-01-05,a,4,2.5
";

    fn app(dir: &Path) -> App {
        let mut settings = Settings::default();
        settings.chart.width = 160;
        settings.chart.height = 120;
        let mut app = App::new(settings, dir).unwrap();
        let mut sink = Vec::new();
        app.upload(vec![("sales.csv".to_string(), SALES.as_bytes().to_vec())], &mut sink)
            .unwrap();
        app
    }

    fn run(app: &mut App, line: &str) -> String {
        let mut out = Vec::new();
        let command: Command = line.parse().unwrap();
        assert!(app.execute(command, &mut out).unwrap());
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_upload_reports_each_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = App::new(Settings::default(), dir.path()).unwrap();
        let mut out = Vec::new();
        app.upload(
            vec![
                ("notes.txt".to_string(), b"hello".to_vec()),
                ("sales.csv".to_string(), SALES.as_bytes().to_vec()),
            ],
            &mut out,
        )
        .unwrap();

        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("Failed to read notes.txt"));
        assert!(out.contains("Loaded sales.csv: 5 rows x 4 columns"));
        assert_eq!(run(&mut app, "datasets"), "* sales.csv\n");
    }

    #[test]
    fn test_empty_session_renders_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = App::new(Settings::default(), dir.path()).unwrap();
        assert!(run(&mut app, "suggest").contains("No dataset selected"));
        assert!(run(&mut app, "chart bar a b").contains("No dataset selected"));
        assert!(run(&mut app, "use other.csv").contains("Unknown dataset"));
    }

    #[test]
    fn test_columns_lists_classes_and_controls() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        let out = run(&mut app, "columns");
        let day: Vec<&str> = out
            .lines()
            .find(|line| line.starts_with("day "))
            .unwrap()
            .split_whitespace()
            .collect();
        assert_eq!(day[..3], ["day", "datetime", "dates"]);
        assert_eq!(day[3], "2024-01-01");
        assert!(out.contains("values a|b|c"));
        assert!(out.contains("range 3..8"));
    }

    #[test]
    fn test_filter_then_save() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());

        assert_eq!(run(&mut app, "filter nulls on"), "4 of 5 rows kept\n");
        assert_eq!(run(&mut app, "filter values city a"), "2 of 5 rows kept\n");
        assert!(run(&mut app, "save").contains("Saved 2 rows"));

        let saved = std::fs::read_to_string(dir.path().join("cleaned_sales.csv.csv")).unwrap();
        let mut lines = saved.lines();
        assert_eq!(lines.next(), Some("day,city,units,price"));
        assert_eq!(lines.count(), 2);
    }

    #[test]
    fn test_rejected_filter_is_not_kept() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());

        assert!(run(&mut app, "filter range city 1..2").starts_with("Warning:"));
        assert!(run(&mut app, "filter range missing 1..2").starts_with("Warning:"));
        assert_eq!(run(&mut app, "filter clear"), "5 of 5 rows kept\n");
        assert!(app.filters.is_empty());
    }

    #[test]
    fn test_invalid_chart_is_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());

        let out = run(&mut app, "chart pie units price");
        assert!(out.starts_with("Warning: Pie chart requires categorical x and numeric y"));
        assert!(!dir.path().join(CHART_FILE_NAME).exists());
    }

    #[test]
    fn test_chart_writes_image() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());

        let out = run(&mut app, "chart heatmap");
        assert!(out.contains("correlation of units, price"));
        assert!(dir.path().join(CHART_FILE_NAME).exists());
    }

    #[test]
    fn test_chart_image_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());

        for line in ["chart bar city units", "chart line day units", "chart scatter units price"] {
            let mut out = Vec::new();
            let command: Command = line.parse().unwrap();
            assert!(app.execute(command, &mut out).unwrap(), "{} ended the session", line);

            let out = String::from_utf8(out).unwrap();
            assert!(
                out.contains(CHART_FILE_NAME) || out.contains("Chart image unavailable"),
                "{} printed {:?}",
                line,
                out
            );
        }
    }

    #[test]
    fn test_suggest_prefers_line_for_dates() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());

        let out = run(&mut app, "suggest");
        assert!(out.starts_with("Suggested Chart Type: Line Plot"));
        assert!(out.contains("Line chart: x = day, y = units"));
    }

    #[test]
    fn test_blank_question_only_previews() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());

        let out = run(&mut app, "ask");
        assert!(out.contains("2024-01-01"));
        assert!(!out.contains("AI Response"));
    }

    #[test]
    fn test_quit() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        assert!(!app.execute(Command::Quit, &mut Vec::new()).unwrap());
    }
}
