//! Content-addressed result cache for provider calls.
//!
//! Every generation and embedding request is reduced to a canonical form,
//! hashed into a fixed-length key, and looked up here before the remote
//! provider is contacted. Entries live as long as the backing store; the
//! SQLite store persists across runs.
//!
//! Requests sampled at a nonzero temperature are cached like any other:
//! the first sampled output is pinned and replayed for identical requests.
//!
//! # Usage
//!
//! ```ignore
//! use dedup_forge::cache::{cache_key, CacheStore, SqliteCacheStore};
//!
//! let store = SqliteCacheStore::open("cache.sqlite").await?;
//! let key = cache_key(&serde_json::json!({"prompt": "p", "model": "m"}))?;
//! if store.get(&key).await?.is_none() {
//!     store.set(&key, &serde_json::json!("result")).await?;
//! }
//! ```

pub mod key;
pub mod single_flight;
pub mod store;

pub use key::{cache_key, canonicalize, digest, to_canonical_string, KEY_LEN};
pub use single_flight::{FlightGuard, SingleFlight};
pub use store::{CacheStore, MemoryCacheStore, SqliteCacheStore};
