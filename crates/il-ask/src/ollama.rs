//! Ollama chat client

use std::time::Duration;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::{AskError, LanguageModel};

/// Client for an Ollama server's `/api/chat` endpoint
///
/// One request per question: no retry and no streaming.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    /// `timeout` of `None` waits for the server indefinitely
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, AskError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn payload(model: &str, prompt: &str) -> Value {
        json!({
            "model": model,
            "messages": [
                { "role": "user", "content": prompt }
            ],
            "stream": false
        })
    }
}

/// Extract the reply text from a non-streaming chat response
pub fn parse_response(response: &Value) -> Result<String, AskError> {
    response["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| AskError::InvalidResponse("missing message.content".to_string()))
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn chat(&self, model: &str, prompt: &str) -> Result<String, AskError> {
        let url = format!("{}/api/chat", self.base_url);
        debug!(%url, model, "Sending chat request");

        let response = self
            .client
            .post(&url)
            .json(&Self::payload(model, prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Model server rejected request");
            return Err(AskError::Status { status: status.as_u16(), body });
        }

        let body: Value = serde_json::from_str(&response.text().await?)?;
        let answer = parse_response(&body)?;
        debug!(chars = answer.len(), "Received chat response");
        Ok(answer)
    }
}
