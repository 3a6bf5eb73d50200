//! Key/value cache collaborator.
//!
//! # Responsibilities
//! - `Cache` trait: the narrow interface services depend on
//! - `MemoryCache`: in-process implementation with per-entry TTL
//!
//! # Design Decisions
//! - Values are strings; callers serialize (JSON) themselves
//! - Expired entries are invisible to reads and removed lazily or by `purge_expired`
//! - `incr` keeps the TTL of an existing key

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("value at '{0}' is not an integer")]
    NotInteger(String),

    #[error("increment of '{0}' overflows")]
    Overflow(String),

    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value`. `ttl = None` keeps the entry until deleted.
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Returns true if a live entry was removed.
    async fn del(&self, key: &str) -> Result<bool, CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Set a TTL on a live entry. Returns false if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError>;

    /// Increment an integer value, creating it at 0 first. Returns the new value.
    async fn incr(&self, key: &str) -> Result<i64, CacheError>;

    /// Drop expired entries. Returns how many were removed.
    async fn purge_expired(&self) -> Result<usize, CacheError>;
}
