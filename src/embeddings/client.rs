//! OpenAI-compatible embeddings client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::error::EmbeddingError;

/// Default OpenAI-compatible endpoint.
pub const DEFAULT_EMBEDDING_API_BASE: &str = "https://api.openai.com/v1";

/// Default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-large";

/// Default embedding dimensionality.
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1536;

const REQUEST_TIMEOUT_SECS: u64 = 120;

/// A provider that turns texts into fixed-length vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds every text, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, EmbeddingError>;

    /// Model identifier, part of every cache key.
    fn model(&self) -> &str;

    /// Dimensionality of the returned vectors.
    fn dimensions(&self) -> usize;
}

/// Client for `/embeddings` on an OpenAI-compatible API.
pub struct OpenAiEmbeddingClient {
    api_base: String,
    api_key: String,
    model: String,
    dimensions: usize,
    http_client: Client,
}

impl std::fmt::Debug for OpenAiEmbeddingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbeddingClient")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}

impl OpenAiEmbeddingClient {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Result<Self, EmbeddingError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| EmbeddingError::ClientBuild(e.to_string()))?;

        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            dimensions,
            http_client,
        })
    }

    /// Builds a client from `OPENAI_API_KEY` and `OPENAI_API_BASE`.
    ///
    /// # Errors
    ///
    /// Returns `EmbeddingError::MissingApiKey` if `OPENAI_API_KEY` is not set.
    pub fn from_env(model: impl Into<String>, dimensions: usize) -> Result<Self, EmbeddingError> {
        let api_key = env::var("OPENAI_API_KEY").map_err(|_| EmbeddingError::MissingApiKey)?;
        let api_base =
            env::var("OPENAI_API_BASE").unwrap_or_else(|_| DEFAULT_EMBEDDING_API_BASE.to_string());
        Self::new(api_base, api_key, model, dimensions)
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }
}

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    input: &'a [String],
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    data: Vec<ApiEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ApiEmbedding {
    index: usize,
    embedding: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Restores input order from the `index` field of each returned item.
fn into_ordered(mut data: Vec<ApiEmbedding>) -> Vec<Vec<f64>> {
    data.sort_by_key(|item| item.index);
    data.into_iter().map(|item| item.embedding).collect()
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.api_base);
        let http_response = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&ApiRequest {
                model: &self.model,
                input: texts,
                dimensions: self.dimensions,
            })
            .send()
            .await
            .map_err(|e| EmbeddingError::RequestFailed(e.to_string()))?;

        let status = http_response.status();
        if !status.is_success() {
            let error_text = http_response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            let message = serde_json::from_str::<ApiErrorResponse>(&error_text)
                .map(|e| e.error.message)
                .unwrap_or(error_text);
            return Err(EmbeddingError::ApiError {
                code: status.as_u16(),
                message,
            });
        }

        let api_response: ApiResponse = http_response
            .json()
            .await
            .map_err(|e| EmbeddingError::ParseError(e.to_string()))?;

        Ok(into_ordered(api_response.data))
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
