//! PostgreSQL-backed user store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::StoreError;
use super::store::UserStore;
use crate::models::auth::UserRecord;

type UserRow = (Uuid, String, String, bool, Option<DateTime<Utc>>);

/// `UserStore` over the `users` table.
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_active(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, privacy_level, is_active, last_active_at \
             FROM users \
             WHERE id = $1 AND is_active = true AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(id, email, privacy_level, is_active, last_active_at)| {
            Ok(UserRecord {
                id,
                email,
                privacy_level: privacy_level.parse().map_err(StoreError::Decode)?,
                is_active,
                last_active_at,
            })
        })
        .transpose()
    }

    async fn touch_last_seen(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET last_active_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
