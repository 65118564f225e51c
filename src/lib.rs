//! dedup-forge: choice-type and policy deduplication for synthetic
//! dialogue training data.
//!
//! Near-duplicate labels are grouped by embedding density, merged into
//! synonym groups by a language model, and the policy lists under each
//! group are clustered the same way. All provider calls go through a
//! content-addressed result cache.

pub mod cache;
pub mod cli;
pub mod dedup;
pub mod embeddings;
pub mod error;
pub mod llm;
pub mod utils;

pub use error::{CacheError, ConfigError, DedupError, DedupResult, EmbeddingError, LlmError};
