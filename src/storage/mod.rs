//! Persistence subsystem.
//!
//! # Responsibilities
//! - `UserStore` trait: the narrow interface the user service depends on
//! - `MemoryUserStore`: in-process implementation used by the binary and tests
//!
//! # Design Decisions
//! - Unique username/email is enforced by the store inside `create`/`update`,
//!   so a check-then-insert race cannot produce duplicates
//! - Deletes are soft: rows get `deleted_at` and drop out of all queries
//! - Rows are listed in id order

pub mod memory;
pub mod model;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryUserStore;
pub use model::{NewUser, UniqueField, User, UserChanges, UserLookup, UserQuery};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("duplicate value for unique field '{0}'")]
    Duplicate(UniqueField),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_one(&self, lookup: &UserLookup) -> Result<User, StoreError>;

    async fn create(&self, user: NewUser) -> Result<User, StoreError>;

    async fn update(&self, id: u64, changes: UserChanges) -> Result<User, StoreError>;

    /// Soft delete.
    async fn delete(&self, id: u64) -> Result<(), StoreError>;

    async fn count(&self, query: &UserQuery) -> Result<u64, StoreError>;

    async fn list(&self, query: &UserQuery, offset: u64, limit: u64) -> Result<Vec<User>, StoreError>;

    async fn exists_by(&self, field: UniqueField, value: &str) -> Result<bool, StoreError>;
}
