//! Error types for dedup-forge operations.
//!
//! Defines error types for each subsystem:
//! - LLM API interactions and structured output parsing
//! - Embedding API interactions
//! - The persistent result cache
//! - Configuration loading
//! - The deduplication pipeline itself

use thiserror::Error;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API base URL: LITELLM_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("LLM output does not match the '{schema}' schema: {message}")]
    SchemaViolation { schema: String, message: String },

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Errors that can occur while requesting embeddings.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Missing API key: OPENAI_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse embedding response: {0}")]
    ParseError(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Expected {expected} embeddings, provider returned {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("Embedding for '{text}' has {actual} dimensions, expected {expected}")]
    DimensionMismatch {
        text: String,
        expected: usize,
        actual: usize,
    },

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Errors raised by the persistent result cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value could not be decoded. This is never silently skipped.
    #[error("Corrupt cache entry '{key}': {message}")]
    Corrupt { key: String, message: String },

    #[error("Failed to encode cache value: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Errors that abort a deduplication run.
#[derive(Debug, Error)]
pub enum DedupError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias for pipeline operations.
pub type DedupResult<T> = Result<T, DedupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_error_display() {
        let err = LlmError::ApiError {
            code: 500,
            message: "upstream exploded".to_string(),
        };
        assert_eq!(err.to_string(), "API error (500): upstream exploded");

        let err = LlmError::SchemaViolation {
            schema: "policy_clusters".to_string(),
            message: "missing field".to_string(),
        };
        assert!(err.to_string().contains("policy_clusters"));
    }

    #[test]
    fn test_cache_error_converts_into_pipeline_error() {
        let err: DedupError = CacheError::Corrupt {
            key: "abc".to_string(),
            message: "expected value".to_string(),
        }
        .into();
        assert!(matches!(err, DedupError::Cache(CacheError::Corrupt { .. })));
        assert!(err.to_string().contains("Corrupt cache entry 'abc'"));
    }

    #[test]
    fn test_embedding_dimension_mismatch_display() {
        let err = EmbeddingError::DimensionMismatch {
            text: "a gift".to_string(),
            expected: 1536,
            actual: 3,
        };
        assert_eq!(
            err.to_string(),
            "Embedding for 'a gift' has 3 dimensions, expected 1536"
        );
    }
}
