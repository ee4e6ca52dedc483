//! Command-line parsing for the interactive driver

use std::str::FromStr;
use chrono::NaiveDateTime;
use il_data::{parse_datetime, FilterSelection};
use il_views::{ChartError, ChartKind};
use thiserror::Error;

/// Why a command line could not be parsed
#[derive(Error, Debug, PartialEq)]
pub enum CommandError {
    #[error("Unknown command: {0} (try `help`)")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Not a number: {0}")]
    InvalidNumber(String),

    #[error("Not a date: {0}")]
    InvalidDate(String),

    #[error("Unknown chart type: {0}")]
    InvalidChart(String),
}

/// Filter page actions
#[derive(Debug, Clone, PartialEq)]
pub enum FilterCommand {
    /// Toggle the drop-nulls pre-pass
    Nulls(bool),
    /// Toggle the IQR outlier pre-pass
    Outliers(bool),
    /// Set the selection for one column
    Set { column: String, selection: FilterSelection },
    /// Clear one column's selection, or every selection
    Clear(Option<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Load(Vec<String>),
    Datasets,
    Use(String),
    Preview,
    Columns,
    Filter(FilterCommand),
    Show,
    Save,
    Ask(String),
    Chart {
        kind: ChartKind,
        x: Option<String>,
        y: Option<String>,
    },
    Suggest,
    Help,
    Quit,
}

pub const HELP: &str = "\
Commands:
  load FILE...                 upload CSV or spreadsheet files
  datasets                     list uploaded datasets
  use NAME                     select a dataset
  preview                      show the selected dataset
  columns                      show column classes
  filter nulls on|off          drop rows with any null
  filter outliers on|off       drop IQR outliers in any numeric column
  filter range COL [MIN]..[MAX]
  filter dates COL [START]..[END]
  filter values COL A|B|...    keep rows whose value is listed (empty = no filter)
  filter clear [COL]           remove column filters
  show                         show the cleaned dataset
  save                         write cleaned_<name>.csv
  ask QUESTION                 ask the language model about the data
  chart TYPE [X] [Y]           Bar, Line, Scatter, Pie or Heatmap; writes chart.png
  suggest                      suggest and build a chart
  help                         show this help
  quit                         exit";

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (head, rest) = match line.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (line, ""),
        };
        let args: Vec<&str> = rest.split_whitespace().collect();

        match head.to_ascii_lowercase().as_str() {
            "load" if !args.is_empty() => Ok(Command::Load(args.iter().map(|s| s.to_string()).collect())),
            "load" => Err(CommandError::Usage("load FILE...")),
            "datasets" | "ls" => Ok(Command::Datasets),
            "use" if !rest.is_empty() => Ok(Command::Use(rest.to_string())),
            "use" => Err(CommandError::Usage("use NAME")),
            "preview" => Ok(Command::Preview),
            "columns" => Ok(Command::Columns),
            "filter" => parse_filter(rest).map(Command::Filter),
            "show" => Ok(Command::Show),
            "save" => Ok(Command::Save),
            "ask" => Ok(Command::Ask(rest.to_string())),
            "chart" => {
                let kind = args.first().ok_or(CommandError::Usage("chart TYPE [X] [Y]"))?;
                let kind = kind
                    .parse::<ChartKind>()
                    .map_err(|e: ChartError| CommandError::InvalidChart(match e {
                        ChartError::UnknownKind(s) => s,
                        other => other.to_string(),
                    }))?;
                Ok(Command::Chart {
                    kind,
                    x: args.get(1).map(|s| s.to_string()),
                    y: args.get(2).map(|s| s.to_string()),
                })
            }
            "suggest" => Ok(Command::Suggest),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

fn parse_switch(value: Option<&str>, usage: &'static str) -> Result<bool, CommandError> {
    match value.map(|v| v.to_ascii_lowercase()).as_deref() {
        Some("on") | Some("true") | Some("yes") => Ok(true),
        Some("off") | Some("false") | Some("no") => Ok(false),
        _ => Err(CommandError::Usage(usage)),
    }
}

fn parse_filter(rest: &str) -> Result<FilterCommand, CommandError> {
    let mut parts = rest.splitn(3, char::is_whitespace);
    let action = parts.next().unwrap_or_default().to_ascii_lowercase();
    let column = parts.next().map(str::trim).filter(|c| !c.is_empty());
    let value = parts.next().map(str::trim).unwrap_or_default();

    match action.as_str() {
        "nulls" => parse_switch(column, "filter nulls on|off").map(FilterCommand::Nulls),
        "outliers" => parse_switch(column, "filter outliers on|off").map(FilterCommand::Outliers),
        "clear" => Ok(FilterCommand::Clear(column.map(str::to_string))),
        "range" => {
            let column = column.ok_or(CommandError::Usage("filter range COL [MIN]..[MAX]"))?;
            let (min, max) = split_bounds(value, "filter range COL [MIN]..[MAX]")?;
            Ok(FilterCommand::Set {
                column: column.to_string(),
                selection: FilterSelection::Range {
                    min: min.map(parse_number).transpose()?,
                    max: max.map(parse_number).transpose()?,
                },
            })
        }
        "dates" => {
            let column = column.ok_or(CommandError::Usage("filter dates COL [START]..[END]"))?;
            let (start, end) = split_bounds(value, "filter dates COL [START]..[END]")?;
            Ok(FilterCommand::Set {
                column: column.to_string(),
                selection: FilterSelection::Dates {
                    start: start.map(parse_date).transpose()?,
                    end: end.map(parse_date).transpose()?,
                },
            })
        }
        "values" => {
            let column = column.ok_or(CommandError::Usage("filter values COL A|B|..."))?;
            let values = value
                .split('|')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect();
            Ok(FilterCommand::Set {
                column: column.to_string(),
                selection: FilterSelection::Values(values),
            })
        }
        _ => Err(CommandError::Usage(
            "filter nulls|outliers on|off, filter range|dates|values COL ..., filter clear [COL]",
        )),
    }
}

/// Split `lo..hi`; either side may be empty
fn split_bounds<'a>(value: &'a str, usage: &'static str) -> Result<(Option<&'a str>, Option<&'a str>), CommandError> {
    let (lo, hi) = value.split_once("..").ok_or(CommandError::Usage(usage))?;
    let side = |s: &'a str| Some(s.trim()).filter(|s| !s.is_empty());
    Ok((side(lo), side(hi)))
}

fn parse_number(value: &str) -> Result<f64, CommandError> {
    value
        .parse::<f64>()
        .map_err(|_| CommandError::InvalidNumber(value.to_string()))
}

fn parse_date(value: &str) -> Result<NaiveDateTime, CommandError> {
    parse_datetime(value).ok_or_else(|| CommandError::InvalidDate(value.to_string()))
}
