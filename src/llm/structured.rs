//! Cache-aware generation adapter.
//!
//! [`CachedGenerator`] derives a content key for every request, answers from
//! the [`CacheStore`] on a hit, and otherwise calls the provider, validates
//! the reply and stores it. Structured replies are validated against the
//! requested Rust type before they are cached, so a malformed reply is
//! never memoized.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::litellm::{GenerationRequest, LlmProvider, Message};
use super::prompt::PromptData;
use crate::cache::{cache_key, CacheStore, SingleFlight};
use crate::error::{CacheError, LlmError};
use crate::utils::extract_json_object;

/// A typed structured reply.
pub trait StructuredOutput: DeserializeOwned + Serialize + Send {
    /// Schema name sent to the provider and used in error messages.
    const NAME: &'static str;
}

/// Hit/miss counters for one adapter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdapterStats {
    pub hits: u64,
    pub misses: u64,
}

impl AdapterStats {
    /// Hit rate between 0.0 and 1.0, or 0.0 if there were no lookups.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl StatCounters {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> AdapterStats {
        AdapterStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Everything that determines a generation result.
#[derive(Debug, Serialize)]
struct GenerationKey<'a> {
    kind: &'static str,
    prompt: &'a str,
    data: &'a str,
    schema: Option<&'a Value>,
    model: &'a str,
    temperature: f64,
    max_tokens: Option<u32>,
}

fn json_only_instruction(schema: &Value) -> String {
    let schema_text = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
    format!(
        "You MUST respond with ONLY a JSON object that conforms to this JSON schema:\n{}\n\nDo not include any text outside the JSON object.",
        schema_text
    )
}

/// Generation provider wrapper that memoizes every call.
pub struct CachedGenerator {
    provider: Arc<dyn LlmProvider>,
    cache: Arc<dyn CacheStore>,
    flights: SingleFlight,
    stats: StatCounters,
    model: String,
    temperature: f64,
    max_tokens: Option<u32>,
}

impl std::fmt::Debug for CachedGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedGenerator")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

impl CachedGenerator {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        cache: Arc<dyn CacheStore>,
        model: impl Into<String>,
        temperature: f64,
    ) -> Self {
        Self {
            provider,
            cache,
            flights: SingleFlight::new(),
            stats: StatCounters::default(),
            model: model.into(),
            temperature,
            max_tokens: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn stats(&self) -> AdapterStats {
        self.stats.snapshot()
    }

    fn request(&self, system: String, user: String) -> GenerationRequest {
        let request = GenerationRequest::new(
            self.model.clone(),
            vec![Message::system(system), Message::user(user)],
        )
        .with_temperature(self.temperature);
        match self.max_tokens {
            Some(max_tokens) => request.with_max_tokens(max_tokens),
            None => request,
        }
    }

    /// Requests a structured reply of type `T`.
    ///
    /// # Errors
    ///
    /// Provider failures propagate unchanged. A reply that carries no JSON
    /// object or does not deserialize into `T` is `LlmError::SchemaViolation`.
    /// A cached value that does not deserialize into `T` is a corrupt entry.
    pub async fn generate_object<T: StructuredOutput>(
        &self,
        prompt: &str,
        data: &PromptData,
        schema: &Value,
    ) -> Result<T, LlmError> {
        let rendered = data.render();
        let key = cache_key(&GenerationKey {
            kind: "object",
            prompt,
            data: &rendered,
            schema: Some(schema),
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        })?;

        let _flight = self.flights.acquire(&key).await;

        if let Some(cached) = self.cache.get(&key).await? {
            self.stats.hit();
            tracing::debug!(key = %key, schema = T::NAME, "Cache hit");
            return serde_json::from_value(cached).map_err(|e| {
                CacheError::Corrupt {
                    key: key.clone(),
                    message: format!("not a valid {}: {}", T::NAME, e),
                }
                .into()
            });
        }
        self.stats.miss();
        tracing::debug!(key = %key, schema = T::NAME, model = %self.model, "Cache miss, calling provider");

        let system = format!("{}\n\n{}", prompt.trim_end(), json_only_instruction(schema));
        let request = self
            .request(system, rendered)
            .with_json_schema(T::NAME, schema.clone());

        let response = self.provider.generate(request).await?;
        let content = response
            .first_content()
            .ok_or_else(|| LlmError::ParseError("Empty LLM response".to_string()))?;

        let violation = |message: String| LlmError::SchemaViolation {
            schema: T::NAME.to_string(),
            message,
        };
        let json = extract_json_object(content).map_err(|e| violation(e.to_string()))?;
        let object: T = serde_json::from_str(&json).map_err(|e| violation(e.to_string()))?;

        let normalized = serde_json::to_value(&object).map_err(CacheError::from)?;
        self.cache.set(&key, &normalized).await?;
        Ok(object)
    }

    /// Requests a free-text reply.
    pub async fn generate_text(&self, prompt: &str, user_message: &str) -> Result<String, LlmError> {
        let key = cache_key(&GenerationKey {
            kind: "text",
            prompt,
            data: user_message,
            schema: None,
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        })?;

        let _flight = self.flights.acquire(&key).await;

        if let Some(cached) = self.cache.get(&key).await? {
            self.stats.hit();
            tracing::debug!(key = %key, "Cache hit");
            return match cached {
                Value::String(text) => Ok(text),
                other => Err(CacheError::Corrupt {
                    key,
                    message: format!("expected a string, found {}", other),
                }
                .into()),
            };
        }
        self.stats.miss();

        let response = self
            .provider
            .generate(self.request(prompt.to_string(), user_message.to_string()))
            .await?;
        let text = response
            .first_content()
            .ok_or_else(|| LlmError::ParseError("Empty LLM response".to_string()))?
            .to_string();

        self.cache.set(&key, &Value::String(text.clone())).await?;
        Ok(text)
    }
}
