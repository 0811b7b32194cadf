//! User store seam.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use super::StoreError;
use crate::models::auth::UserRecord;

/// Durable lookup of user accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Load a user by id. Returns `None` if absent or deactivated.
    async fn find_active(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError>;

    /// Refresh the user's "last seen" marker.
    async fn touch_last_seen(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;
}

/// In-process user store for tests and local development.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: DashMap<Uuid, UserRecord>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user.
    pub fn insert(&self, user: UserRecord) {
        self.users.insert(user.id, user);
    }

    /// Snapshot a user regardless of active state.
    pub fn get(&self, id: Uuid) -> Option<UserRecord> {
        self.users.get(&id).map(|u| u.clone())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_active(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.get(id).filter(|u| u.is_active))
    }

    async fn touch_last_seen(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(mut user) = self.users.get_mut(&id) {
            user.last_active_at = Some(at);
        }
        Ok(())
    }
}
