//! Persistent key/value store for memoized provider results.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::RwLock;

use crate::error::CacheError;

const SCHEMA_SQL: &str = "CREATE TABLE IF NOT EXISTS cache (key TEXT PRIMARY KEY, value TEXT)";

/// Storage backend for provider results, keyed by content digest.
///
/// Values are JSON. Entries are never invalidated; a `set` on an existing
/// key replaces it. There is no check-then-set atomicity across callers,
/// see [`super::SingleFlight`] for that.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the stored value, or `None` on a miss.
    ///
    /// A value that cannot be decoded is reported as [`CacheError::Corrupt`].
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    /// Stores a value under `key`.
    async fn set(&self, key: &str, value: &Value) -> Result<(), CacheError>;

    /// Number of stored entries.
    async fn len(&self) -> Result<u64, CacheError>;
}

fn decode(key: &str, raw: &str) -> Result<Value, CacheError> {
    serde_json::from_str(raw).map_err(|e| CacheError::Corrupt {
        key: key.to_string(),
        message: e.to_string(),
    })
}

/// SQLite-backed cache, one `cache(key, value)` table.
#[derive(Clone)]
pub struct SqliteCacheStore {
    pool: SqlitePool,
}

impl std::fmt::Debug for SqliteCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCacheStore").finish_non_exhaustive()
    }
}

impl SqliteCacheStore {
    /// Opens (creating if absent) the cache database at `path`.
    pub async fn open(path: &str) -> Result<Self, CacheError> {
        let opts = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await?;

        sqlx::query(SCHEMA_SQL).execute(&pool).await?;

        tracing::info!(path = path, "Result cache opened");
        Ok(Self { pool })
    }

    /// Writes a raw, undecoded value. Only useful for repair tooling and tests.
    pub async fn set_raw(&self, key: &str, raw: &str) -> Result<(), CacheError> {
        sqlx::query("INSERT OR REPLACE INTO cache (key, value) VALUES (?1, ?2)")
            .bind(key)
            .bind(raw)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let row = sqlx::query("SELECT value FROM cache WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let raw: Option<String> = row.get("value");
                match raw {
                    Some(raw) => decode(key, &raw).map(Some),
                    None => Err(CacheError::Corrupt {
                        key: key.to_string(),
                        message: "stored value is NULL".to_string(),
                    }),
                }
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &Value) -> Result<(), CacheError> {
        let raw = serde_json::to_string(value)?;
        self.set_raw(key, &raw).await
    }

    async fn len(&self) -> Result<u64, CacheError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM cache")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("total") as u64)
    }
}

/// In-process cache with the same JSON text encoding as the SQLite store.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a raw, undecoded value.
    pub fn set_raw(&self, key: &str, raw: &str) {
        self.entries
            .write()
            .expect("cache write lock poisoned")
            .insert(key.to_string(), raw.to_string());
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let raw = self
            .entries
            .read()
            .expect("cache read lock poisoned")
            .get(key)
            .cloned();
        raw.map(|raw| decode(key, &raw)).transpose()
    }

    async fn set(&self, key: &str, value: &Value) -> Result<(), CacheError> {
        let raw = serde_json::to_string(value)?;
        self.set_raw(key, &raw);
        Ok(())
    }

    async fn len(&self) -> Result<u64, CacheError> {
        Ok(self.entries.read().expect("cache read lock poisoned").len() as u64)
    }
}
