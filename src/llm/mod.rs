//! LLM integration for dedup-forge.
//!
//! Provides an OpenAI-compatible chat client, rendering of named input
//! sections into prompts, and the cache-aware [`CachedGenerator`] that every
//! pipeline stage uses to talk to the model.
//!
//! ```ignore
//! use dedup_forge::llm::{CachedGenerator, LiteLlmClient, PromptData};
//! use dedup_forge::cache::SqliteCacheStore;
//! use std::sync::Arc;
//!
//! let client = Arc::new(LiteLlmClient::from_env()?);
//! let cache = Arc::new(SqliteCacheStore::open("cache.sqlite").await?);
//! let generator = CachedGenerator::new(client, cache, "anthropic/claude-3.5-sonnet", 0.0);
//!
//! let data = PromptData::new().with("terms", serde_json::json!(["a gift", "a present"]));
//! let groups: SynonymGroupsReply = generator.generate_object(PROMPT, &data, &schema).await?;
//! ```

pub mod litellm;
pub mod prompt;
pub mod structured;

pub use litellm::{
    Choice, GenerationRequest, GenerationResponse, LiteLlmClient, LlmProvider, Message, Usage,
    DEFAULT_CHAT_MODEL,
};
pub use prompt::PromptData;
pub use structured::{AdapterStats, CachedGenerator, StructuredOutput};
