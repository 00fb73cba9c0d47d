//! Key/value store with list operations.
//!
//! Values are JSON documents. A list is a JSON array of strings stored
//! under its own key; [`KvStore::rpush`] and [`KvStore::lpop`] are atomic
//! with respect to every other caller of the same store, so concurrent
//! workers popping one queue never receive the same item.

use async_trait::async_trait;
use serde_json::Value;

mod memory;
mod pg;

pub use memory::MemoryStore;
pub use pg::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Value under {key} is not a list")]
    NotAList { key: String },

    #[error("Malformed value under {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Could not encode value for {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Insert or overwrite `key`.
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Append `item` to the list at `key`, creating it if needed. Returns
    /// the new length.
    async fn rpush(&self, key: &str, item: &str) -> Result<usize, StoreError>;

    /// Remove and return the head of the list at `key` in one step.
    async fn lpop(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Length of the list at `key`; zero when the key is absent.
    async fn llen(&self, key: &str) -> Result<usize, StoreError>;

    /// Cheap reachability check.
    async fn ping(&self) -> Result<(), StoreError>;
}
