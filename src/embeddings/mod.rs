//! Embedding provider integration.
//!
//! [`OpenAiEmbeddingClient`] talks to an OpenAI-compatible `/embeddings`
//! endpoint; [`CachedEmbedder`] sits in front of any [`EmbeddingProvider`]
//! and memoizes each text's vector in the result cache.

pub mod cached;
pub mod client;

pub use cached::CachedEmbedder;
pub use client::{
    EmbeddingProvider, OpenAiEmbeddingClient, DEFAULT_EMBEDDING_API_BASE,
    DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_EMBEDDING_MODEL,
};
