//! In-memory user table.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use super::model::{NewUser, UniqueField, User, UserChanges, UserLookup, UserQuery};
use super::{StoreError, UserStore};

#[derive(Default)]
struct Table {
    next_id: u64,
    rows: BTreeMap<u64, User>,
}

impl Table {
    fn live(&self) -> impl Iterator<Item = &User> {
        self.rows.values().filter(|u| !u.is_deleted())
    }

    fn taken(&self, field: UniqueField, value: &str, except: Option<u64>) -> bool {
        self.live().any(|u| {
            Some(u.id) != except
                && match field {
                    UniqueField::Username => u.username == value,
                    UniqueField::Email => u.email == value,
                }
        })
    }
}

/// `UserStore` backed by a locked `BTreeMap`. Cloning shares the table.
#[derive(Clone, Default)]
pub struct MemoryUserStore {
    table: Arc<RwLock<Table>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Row count including soft-deleted rows.
    pub fn raw_len(&self) -> usize {
        self.table.read().rows.len()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_one(&self, lookup: &UserLookup) -> Result<User, StoreError> {
        let table = self.table.read();
        let found = match lookup {
            UserLookup::Id(id) => table.rows.get(id).filter(|u| !u.is_deleted()),
            UserLookup::Username(name) => table.live().find(|u| &u.username == name),
            UserLookup::Email(email) => table.live().find(|u| &u.email == email),
        };
        found.cloned().ok_or(StoreError::NotFound)
    }

    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let mut table = self.table.write();
        if table.taken(UniqueField::Username, &user.username, None) {
            return Err(StoreError::Duplicate(UniqueField::Username));
        }
        if table.taken(UniqueField::Email, &user.email, None) {
            return Err(StoreError::Duplicate(UniqueField::Email));
        }

        table.next_id += 1;
        let now = Utc::now();
        let row = User {
            id: table.next_id,
            username: user.username,
            password_hash: user.password_hash,
            email: user.email,
            role: user.role,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        table.rows.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update(&self, id: u64, changes: UserChanges) -> Result<User, StoreError> {
        let mut table = self.table.write();
        if !table.rows.get(&id).is_some_and(|u| !u.is_deleted()) {
            return Err(StoreError::NotFound);
        }
        if let Some(name) = &changes.username {
            if table.taken(UniqueField::Username, name, Some(id)) {
                return Err(StoreError::Duplicate(UniqueField::Username));
            }
        }
        if let Some(email) = &changes.email {
            if table.taken(UniqueField::Email, email, Some(id)) {
                return Err(StoreError::Duplicate(UniqueField::Email));
            }
        }

        let row = table.rows.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(name) = changes.username {
            row.username = name;
        }
        if let Some(email) = changes.email {
            row.email = email;
        }
        if let Some(hash) = changes.password_hash {
            row.password_hash = hash;
        }
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn delete(&self, id: u64) -> Result<(), StoreError> {
        let mut table = self.table.write();
        match table.rows.get_mut(&id) {
            Some(row) if !row.is_deleted() => {
                let now = Utc::now();
                row.deleted_at = Some(now);
                row.updated_at = now;
                Ok(())
            }
            _ => Err(StoreError::NotFound),
        }
    }

    async fn count(&self, query: &UserQuery) -> Result<u64, StoreError> {
        let table = self.table.read();
        Ok(table.live().filter(|u| query.matches(u)).count() as u64)
    }

    async fn list(&self, query: &UserQuery, offset: u64, limit: u64) -> Result<Vec<User>, StoreError> {
        let table = self.table.read();
        Ok(table
            .live()
            .filter(|u| query.matches(u))
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn exists_by(&self, field: UniqueField, value: &str) -> Result<bool, StoreError> {
        Ok(self.table.read().taken(field, value, None))
    }
}
