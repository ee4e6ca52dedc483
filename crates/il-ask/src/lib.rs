//! Questions about a dataset, answered by a local language model

pub mod ollama;
pub mod prompt;

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use il_data::DataError;
use thiserror::Error;
use tracing::{debug, info};

pub use ollama::{parse_response, OllamaClient};
pub use prompt::build_prompt;

/// Errors from asking a question
#[derive(Error, Debug)]
pub enum AskError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Model server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Data(#[from] DataError),
}

/// A chat-style language model
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Send a single user message and return the reply text
    async fn chat(&self, model: &str, prompt: &str) -> Result<String, AskError>;
}

/// Ask `question` about the first `rows` rows of `table`
///
/// A blank question asks nothing and returns `Ok(None)`.
pub async fn ask<M: LanguageModel + ?Sized>(
    client: &M,
    model: &str,
    question: &str,
    table: &RecordBatch,
    rows: usize,
) -> Result<Option<String>, AskError> {
    if question.trim().is_empty() {
        debug!("Empty question, nothing to ask");
        return Ok(None);
    }

    let prompt = build_prompt(question, table, rows)?;
    info!(model, rows = rows.min(table.num_rows()), "Asking language model");
    let answer = client.chat(model, &prompt).await?;
    Ok(Some(answer))
}
