//! Configuration for the deduplication pipeline.

use std::path::PathBuf;

use super::cluster::{NoiseStrategy, DEFAULT_EPSILON, DEFAULT_MIN_POINTS};
use crate::embeddings::{DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_EMBEDDING_MODEL};
use crate::error::ConfigError;
use crate::llm::DEFAULT_CHAT_MODEL;

/// Default path of the SQLite result cache.
pub const DEFAULT_CACHE_PATH: &str = "cache.sqlite";

/// Default completion budget for one structured reply.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Configuration for [`DedupPipeline`](super::DedupPipeline).
#[derive(Debug, Clone, PartialEq)]
pub struct DedupConfig {
    // Clustering
    /// DBSCAN neighbourhood radius in cosine distance.
    pub epsilon: f64,
    /// DBSCAN minimum neighbourhood size, the point itself included.
    pub min_points: usize,
    /// Handling of points DBSCAN leaves unclustered.
    pub noise_strategy: NoiseStrategy,

    // Generation
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,

    // Embeddings
    pub embedding_model: String,
    pub embedding_dimensions: usize,

    // Storage
    pub cache_path: PathBuf,

    /// Clusters and choice types processed at once. Output order does not
    /// depend on it.
    pub concurrency: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
            min_points: DEFAULT_MIN_POINTS,
            noise_strategy: NoiseStrategy::default(),

            model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: 0.0,
            max_tokens: DEFAULT_MAX_TOKENS,

            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimensions: DEFAULT_EMBEDDING_DIMENSIONS,

            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),

            concurrency: 1,
        }
    }
}

impl DedupConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `DEDUP_EPSILON`: DBSCAN radius (default: 0.3)
    /// - `DEDUP_MIN_POINTS`: DBSCAN minimum neighbourhood (default: 5)
    /// - `DEDUP_NOISE_STRATEGY`: `pooled` or `singletons` (default: pooled)
    /// - `DEDUP_MODEL`: generation model (default: anthropic/claude-3.5-sonnet)
    /// - `DEDUP_TEMPERATURE`: sampling temperature (default: 0.0)
    /// - `DEDUP_MAX_TOKENS`: completion budget (default: 4096)
    /// - `DEDUP_EMBEDDING_MODEL`: embedding model (default: text-embedding-3-large)
    /// - `DEDUP_EMBEDDING_DIMENSIONS`: embedding size (default: 1536)
    /// - `DEDUP_CACHE_PATH`: SQLite cache file (default: cache.sqlite)
    /// - `DEDUP_CONCURRENCY`: parallel model calls (default: 1)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable cannot be parsed or the result
    /// fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(val) = lookup("DEDUP_EPSILON") {
            config.epsilon = parse_env_value(&val, "DEDUP_EPSILON")?;
        }
        if let Some(val) = lookup("DEDUP_MIN_POINTS") {
            config.min_points = parse_env_value(&val, "DEDUP_MIN_POINTS")?;
        }
        if let Some(val) = lookup("DEDUP_NOISE_STRATEGY") {
            config.noise_strategy = val.parse::<NoiseStrategy>().map_err(|message| ConfigError::InvalidValue {
                key: "DEDUP_NOISE_STRATEGY".to_string(),
                message,
            })?;
        }

        if let Some(val) = lookup("DEDUP_MODEL") {
            config.model = val;
        }
        if let Some(val) = lookup("DEDUP_TEMPERATURE") {
            config.temperature = parse_env_value(&val, "DEDUP_TEMPERATURE")?;
        }
        if let Some(val) = lookup("DEDUP_MAX_TOKENS") {
            config.max_tokens = parse_env_value(&val, "DEDUP_MAX_TOKENS")?;
        }

        if let Some(val) = lookup("DEDUP_EMBEDDING_MODEL") {
            config.embedding_model = val;
        }
        if let Some(val) = lookup("DEDUP_EMBEDDING_DIMENSIONS") {
            config.embedding_dimensions = parse_env_value(&val, "DEDUP_EMBEDDING_DIMENSIONS")?;
        }

        if let Some(val) = lookup("DEDUP_CACHE_PATH") {
            config.cache_path = PathBuf::from(val);
        }
        if let Some(val) = lookup("DEDUP_CONCURRENCY") {
            config.concurrency = parse_env_value(&val, "DEDUP_CONCURRENCY")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.epsilon > 0.0 && self.epsilon <= 2.0) {
            return Err(ConfigError::ValidationFailed(
                "epsilon must be in (0.0, 2.0]".to_string(),
            ));
        }

        if self.min_points == 0 {
            return Err(ConfigError::ValidationFailed(
                "min_points must be greater than 0".to_string(),
            ));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "model cannot be empty".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationFailed(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if self.max_tokens == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_tokens must be greater than 0".to_string(),
            ));
        }

        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "embedding_model cannot be empty".to_string(),
            ));
        }

        if self.embedding_dimensions == 0 {
            return Err(ConfigError::ValidationFailed(
                "embedding_dimensions must be greater than 0".to_string(),
            ));
        }

        if self.cache_path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "cache_path cannot be empty".to_string(),
            ));
        }

        if self.concurrency == 0 {
            return Err(ConfigError::ValidationFailed(
                "concurrency must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_min_points(mut self, min_points: usize) -> Self {
        self.min_points = min_points;
        self
    }

    pub fn with_noise_strategy(mut self, strategy: NoiseStrategy) -> Self {
        self.noise_strategy = strategy;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temp: f64) -> Self {
        self.temperature = temp;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    pub fn with_embedding_dimensions(mut self, dimensions: usize) -> Self {
        self.embedding_dimensions = dimensions;
        self
    }

    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = path.into();
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}
