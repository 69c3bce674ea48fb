//! Embedding backend for OpenAI-compatible `/embeddings` endpoints.

use std::env;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use labpilot_core::config::SearchConfig;
use labpilot_core::error::LabpilotError;

use crate::embedding::EmbeddingService;

/// Remote embedding model over HTTP.
#[derive(Clone)]
pub struct RemoteEmbedding {
    client: Client,
    url: String,
    api_key: String,
    model: String,
    dimensions: usize,
}

impl std::fmt::Debug for RemoteEmbedding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteEmbedding")
            .field("url", &self.url)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl RemoteEmbedding {
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
        timeout: Duration,
    ) -> Result<Self, LabpilotError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LabpilotError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
            api_key: api_key.into(),
            model: model.into(),
            dimensions: dimensions.max(1),
        })
    }

    /// Reads the key from the environment variable named in `config`.
    pub fn from_config(config: &SearchConfig) -> Result<Self, LabpilotError> {
        let api_key = env::var(&config.embedding_api_key_env).map_err(|_| {
            LabpilotError::Config(format!(
                "{} is not set; export it or use embedding_provider = \"lexical\"",
                config.embedding_api_key_env
            ))
        })?;
        Self::new(
            &config.embedding_url,
            api_key,
            &config.embedding_model,
            config.embedding_dim,
            Duration::from_secs(config.embedding_timeout_secs),
        )
    }
}

impl EmbeddingService for RemoteEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LabpilotError> {
        if text.trim().is_empty() {
            return Err(LabpilotError::Validation(
                "Cannot embed empty text".to_string(),
            ));
        }

        let body = EmbeddingRequest {
            model: &self.model,
            input: [text],
        };
        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    LabpilotError::Collaborator("embedding request timed out".to_string())
                } else {
                    LabpilotError::Collaborator(format!("embedding request failed: {}", err))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(map_http_error(status, &body_text));
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|err| {
            LabpilotError::Collaborator(format!("Failed to parse embedding response: {}", err))
        })?;
        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| LabpilotError::Collaborator("embedding response was empty".into()))?;

        if vector.len() != self.dimensions {
            return Err(LabpilotError::Collaborator(format!(
                "embedding model returned {} dimensions, expected {}",
                vector.len(),
                self.dimensions
            )));
        }
        debug!(model = %self.model, chars = text.len(), "Embedded text remotely");
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

fn map_http_error(status: StatusCode, body: &str) -> LabpilotError {
    let detail: String = body.chars().take(200).collect();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LabpilotError::Collaborator(format!(
            "embedding provider rejected the API key ({})",
            status
        )),
        StatusCode::TOO_MANY_REQUESTS => {
            LabpilotError::Collaborator("embedding provider rate limit exceeded".to_string())
        }
        _ => LabpilotError::Collaborator(format!(
            "embedding provider returned {}: {}",
            status, detail
        )),
    }
}
