//! Per-session dataset registry

use arrow::record_batch::RecordBatch;
use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::settings::Settings;

/// Errors raised by session operations
#[derive(Error, Debug, PartialEq)]
pub enum SessionError {
    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),
}

/// Per-session application state
///
/// Holds every uploaded table keyed by its file name, in upload order, plus
/// the name of the dataset the user is currently working on. A session is
/// created when the user starts working and dropped when they finish; tables
/// are never filtered in place.
#[derive(Debug, Default)]
pub struct Session {
    /// Uploaded datasets by name
    datasets: IndexMap<String, RecordBatch>,

    /// The currently selected dataset
    selected: Option<String>,

    /// Application settings
    settings: Settings,
}

impl Session {
    /// Create a new empty session
    pub fn new(settings: Settings) -> Self {
        Self {
            datasets: IndexMap::new(),
            selected: None,
            settings,
        }
    }

    /// Application settings for this session
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Register an uploaded table, replacing any dataset with the same name
    ///
    /// The first dataset registered becomes the selection.
    pub fn insert(&mut self, name: impl Into<String>, table: RecordBatch) {
        let name = name.into();
        info!(
            dataset = %name,
            rows = table.num_rows(),
            columns = table.num_columns(),
            "Registered dataset"
        );

        self.datasets.insert(name.clone(), table);
        if self.selected.is_none() {
            self.selected = Some(name);
        }
    }

    /// Select the dataset every page works on
    pub fn select(&mut self, name: &str) -> Result<(), SessionError> {
        if !self.datasets.contains_key(name) {
            return Err(SessionError::UnknownDataset(name.to_string()));
        }
        debug!(dataset = %name, "Selected dataset");
        self.selected = Some(name.to_string());
        Ok(())
    }

    /// Names of all registered datasets in upload order
    pub fn names(&self) -> Vec<&str> {
        self.datasets.keys().map(|k| k.as_str()).collect()
    }

    /// Look up a dataset by name
    pub fn get(&self, name: &str) -> Option<&RecordBatch> {
        self.datasets.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    /// The selected dataset, if any
    pub fn selected(&self) -> Option<(&str, &RecordBatch)> {
        let name = self.selected.as_deref()?;
        self.datasets.get(name).map(|table| (name, table))
    }

    /// A copy of the selected dataset for destructive work
    ///
    /// Arrow arrays are immutable, so the copy shares buffers with the
    /// registered original but nothing done to it is visible there.
    pub fn working_copy(&self) -> Option<RecordBatch> {
        self.selected().map(|(_, table)| table.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use arrow::array::Int64Array;
    use arrow::datatypes::{DataType, Field, Schema};

    fn table(values: Vec<i64>) -> RecordBatch {
        let schema = Schema::new(vec![Field::new("a", DataType::Int64, true)]);
        RecordBatch::try_new(Arc::new(schema), vec![Arc::new(Int64Array::from(values))]).unwrap()
    }

    #[test]
    fn test_first_insert_becomes_selection() {
        let mut session = Session::new(Settings::default());
        assert!(session.selected().is_none());

        session.insert("one.csv", table(vec![1, 2]));
        session.insert("two.csv", table(vec![3]));

        let (name, selected) = session.selected().unwrap();
        assert_eq!(name, "one.csv");
        assert_eq!(selected.num_rows(), 2);
        assert_eq!(session.names(), vec!["one.csv", "two.csv"]);
    }

    #[test]
    fn test_select_unknown_dataset() {
        let mut session = Session::new(Settings::default());
        session.insert("one.csv", table(vec![1]));

        assert_eq!(
            session.select("missing.csv"),
            Err(SessionError::UnknownDataset("missing.csv".to_string()))
        );
        assert_eq!(session.selected().unwrap().0, "one.csv");
    }

    #[test]
    fn test_reupload_replaces_in_place() {
        let mut session = Session::new(Settings::default());
        session.insert("one.csv", table(vec![1]));
        session.insert("two.csv", table(vec![2]));
        session.insert("one.csv", table(vec![1, 2, 3]));

        assert_eq!(session.names(), vec!["one.csv", "two.csv"]);
        assert_eq!(session.get("one.csv").unwrap().num_rows(), 3);
    }

    #[test]
    fn test_working_copy_leaves_original() {
        let mut session = Session::new(Settings::default());
        session.insert("one.csv", table(vec![1, 2, 3]));

        let copy = session.working_copy().unwrap();
        let sliced = copy.slice(0, 1);
        assert_eq!(sliced.num_rows(), 1);
        assert_eq!(session.selected().unwrap().1.num_rows(), 3);
    }
}
