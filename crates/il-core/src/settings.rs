//! Application settings

use std::path::Path;
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::{debug, info};

/// Name of the optional settings file looked up in the working directory
pub const SETTINGS_FILE_NAME: &str = "insightloop.json";

/// Errors raised while loading settings
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Text columns with at most this many distinct values get a value filter
    pub categorical_threshold: usize,

    /// Multiplier applied to the interquartile range when dropping outliers
    pub outlier_iqr_factor: f64,

    /// Rows shown when previewing a dataset before asking a question
    pub preview_rows: usize,

    /// Upper bound on rows printed for a full table preview
    pub max_preview_rows: usize,

    /// Rows of the table embedded in a language-model prompt
    pub prompt_rows: usize,

    /// Cell texts read as null in addition to the standard NA tokens
    pub extra_null_tokens: Vec<String>,

    /// Language model settings
    pub llm: LlmSettings,

    /// Chart image settings
    pub chart: ChartSettings,
}

/// Language model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Base URL of the model server
    pub base_url: String,

    /// Model name sent with every request
    pub model: String,

    /// Optional request timeout; `None` waits for the server indefinitely
    pub timeout_secs: Option<u64>,
}

/// Chart image settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartSettings {
    /// Width of exported chart images in pixels
    pub width: u32,

    /// Height of exported chart images in pixels
    pub height: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            categorical_threshold: 50,
            outlier_iqr_factor: 1.5,
            preview_rows: 5,
            max_preview_rows: 200,
            prompt_rows: 20,
            extra_null_tokens: Vec::new(),
            llm: LlmSettings::default(),
            chart: ChartSettings::default(),
        }
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "mistral".to_string(),
            timeout_secs: None,
        }
    }
}

impl Default for ChartSettings {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 768,
        }
    }
}

impl Settings {
    /// Parse settings from a JSON document
    pub fn from_json(text: &str) -> Result<Self, SettingsError> {
        let settings: Settings = serde_json::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from `path`, falling back to defaults when it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            debug!(path = %path.display(), "No settings file, using defaults");
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)?;
        let settings = Self::from_json(&text)?;
        info!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    /// Reject values the rest of the application cannot work with
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !self.outlier_iqr_factor.is_finite() || self.outlier_iqr_factor < 0.0 {
            return Err(SettingsError::Invalid {
                field: "outlier_iqr_factor",
                reason: format!("must be a non-negative number, got {}", self.outlier_iqr_factor),
            });
        }
        if self.chart.width == 0 || self.chart.height == 0 {
            return Err(SettingsError::Invalid {
                field: "chart",
                reason: "image dimensions must be non-zero".to_string(),
            });
        }
        if self.llm.model.trim().is_empty() {
            return Err(SettingsError::Invalid {
                field: "llm.model",
                reason: "model name is empty".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.categorical_threshold, 50);
        assert_eq!(settings.prompt_rows, 20);
        assert!(settings.extra_null_tokens.is_empty());
        assert_eq!(settings.llm.model, "mistral");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let settings = Settings::from_json(r#"{"categorical_threshold": 10, "llm": {"model": "llama3"}}"#).unwrap();
        assert_eq!(settings.categorical_threshold, 10);
        assert_eq!(settings.llm.model, "llama3");
        assert_eq!(settings.llm.base_url, "http://localhost:11434");
        assert_eq!(settings.chart.width, 1024);
    }

    #[test]
    fn test_rejects_negative_iqr_factor() {
        let result = Settings::from_json(r#"{"outlier_iqr_factor": -1.0}"#);
        assert!(matches!(result, Err(SettingsError::Invalid { field: "outlier_iqr_factor", .. })));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_or_default(&dir.path().join(SETTINGS_FILE_NAME)).unwrap();
        assert_eq!(settings.outlier_iqr_factor, 1.5);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, r#"{{"prompt_rows": 5}}"#).unwrap();

        let settings = Settings::load_or_default(&path).unwrap();
        assert_eq!(settings.prompt_rows, 5);
    }
}
