//! LLM service client
//!
//! The synthesizer only needs "prompt in, text out". [`TextGenerator`] is
//! that seam; [`OllamaClient`] talks to an Ollama-compatible
//! `/api/generate` endpoint with a single non-streaming request.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::LlmConfig;
use crate::extract::Strategy;
use crate::log_debug;

/// Reasons a generation attempt did not produce a JSON value
///
/// Every variant ends in the fallback path. They differ only in what gets
/// logged.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("LLM request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("LLM service returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("LLM service returned an unexpected body: {0}")]
    MalformedBody(String),
    #[error("no JSON found in LLM response")]
    NoJsonFound,
    #[error("JSON located by {strategy} strategy did not parse: {source}")]
    Parse {
        strategy: Strategy,
        #[source]
        source: serde_json::Error,
    },
}

/// Anything that turns a prompt into free-form text
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_text(&self, prompt: &str) -> Result<String, GenerationError>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Client for an Ollama-compatible generation endpoint
pub struct OllamaClient {
    client: Client,
    url: String,
    model: String,
}

impl OllamaClient {
    /// Build a client from configuration
    pub fn new(config: &LlmConfig) -> Result<Self, GenerationError> {
        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            client: builder.build()?,
            url: generate_url(&config.host),
            model: config.model.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl TextGenerator for OllamaClient {
    async fn generate_text(&self, prompt: &str) -> Result<String, GenerationError> {
        log_debug!(
            "Sending generation request to {} (model {}, {} chars)",
            self.url,
            self.model,
            prompt.len()
        );

        let response = self
            .client
            .post(&self.url)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status { status, body });
        }

        let body = response.text().await?;
        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| GenerationError::MalformedBody(format!("{e}: {}", preview(&body))))?;

        log_debug!("Received {} chars from LLM", parsed.response.len());
        Ok(parsed.response)
    }
}

/// `{host}/api/generate`, tolerating a trailing slash on the host
pub fn generate_url(host: &str) -> String {
    format!("{}/api/generate", host.trim_end_matches('/'))
}

fn preview(text: &str) -> String {
    text.chars().take(200).collect()
}
