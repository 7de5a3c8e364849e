//! Client for an Ollama-compatible `/api/generate` endpoint.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model endpoint returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("model returned an empty response")]
    Empty,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f64,
    top_p: f64,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Cheap to clone; the inner [`reqwest::Client`] is shared.
#[derive(Debug, Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl LlmClient {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self, LlmError> {
        Self::new(&cfg.ollama_url, &cfg.ollama_model, cfg.llm_timeout)
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }

    pub async fn generate(&self, prompt: &str, system: &str) -> Result<String, LlmError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            system,
            stream: false,
            options: GenerateOptions {
                temperature: 0.3,
                top_p: 0.9,
                num_predict: 1000,
            },
        };

        let resp = self
            .client
            .post(self.generate_url())
            .json(&request)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(LlmError::Status(resp.status()));
        }

        let body: GenerateResponse = resp.json().await?;
        let text = body.response.trim();
        if text.is_empty() {
            return Err(LlmError::Empty);
        }
        Ok(text.to_string())
    }
}
