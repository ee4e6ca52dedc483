//! Core session state for InsightLoop
//!
//! This crate owns the per-session dataset registry and the application
//! settings. Every other crate receives these explicitly; nothing here is
//! a process-wide singleton.

pub mod settings;
pub mod state;

// Re-export commonly used types
pub use settings::{ChartSettings, LlmSettings, Settings, SettingsError};
pub use state::{Session, SessionError};

/// The in-memory table every component operates on
pub type Table = arrow::record_batch::RecordBatch;
