//! Tokens read as missing values when parsing uploads

use serde::{Serialize, Deserialize};

/// Cell texts that load as null, matching pandas' default NA tokens
const DEFAULT_TOKENS: &[&str] = &["", "NA", "N/A", "n/a", "NaN", "nan", "null", "NULL", "None", "none"];

/// Null token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NullConfig {
    /// Cell texts that mean "no value"
    pub tokens: Vec<String>,

    /// Ignore surrounding whitespace
    pub trim: bool,

    /// Compare tokens case-sensitively
    pub case_sensitive: bool,
}

impl Default for NullConfig {
    fn default() -> Self {
        Self {
            tokens: DEFAULT_TOKENS.iter().map(|t| t.to_string()).collect(),
            trim: true,
            case_sensitive: false,
        }
    }
}

impl NullConfig {
    /// Add tokens on top of the current set
    pub fn with_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for token in tokens {
            let token = token.into();
            if !self.tokens.contains(&token) {
                self.tokens.push(token);
            }
        }
        self
    }

    /// Whether a raw cell should load as null
    pub fn is_null(&self, cell: &str) -> bool {
        let cell = if self.trim { cell.trim() } else { cell };
        let same = |token: &String| {
            if self.case_sensitive {
                cell == token
            } else {
                cell.eq_ignore_ascii_case(token)
            }
        };
        self.tokens.iter().any(same)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tokens() {
        let config = NullConfig::default();
        assert!(config.is_null(""));
        assert!(config.is_null("  "));
        assert!(config.is_null("NaN"));
        assert!(config.is_null("Null"));
        assert!(!config.is_null("0"));
        assert!(!config.is_null("-"));
    }

    #[test]
    fn test_extra_tokens() {
        let config = NullConfig::default().with_tokens(["-", "missing", "-"]);
        assert!(config.is_null("-"));
        assert!(config.is_null(" MISSING "));
        assert_eq!(config.tokens.iter().filter(|t| *t == "-").count(), 1);
    }

    #[test]
    fn test_case_sensitive() {
        let config = NullConfig {
            tokens: vec!["NULL".to_string()],
            trim: false,
            case_sensitive: true,
        };
        assert!(config.is_null("NULL"));
        assert!(!config.is_null("null"));
        assert!(!config.is_null(" NULL"));
    }
}
