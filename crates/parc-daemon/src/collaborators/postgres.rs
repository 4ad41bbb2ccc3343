//! PostgreSQL-backed fast and tribe lookups
//!
//! Reads tables owned by the fasting and tribe services. PARC never writes
//! to them.

use super::traits::*;
use crate::error::CollaboratorError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parc_types::{FastId, TribeId, UserId};
use sqlx::{PgPool, Row};

/// Directory adapter over the shared database
#[derive(Debug, Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn lookup_err(e: sqlx::Error) -> CollaboratorError {
    CollaboratorError::Transport(e.to_string())
}

#[async_trait]
impl ActiveFastLookup for PgDirectory {
    async fn find_active_by_user(&self, user_id: &UserId) -> CollaboratorResult<Option<ActiveFast>> {
        let row = sqlx::query(
            r#"
            SELECT id::TEXT AS id, start_time
            FROM fasts
            WHERE user_id = $1 AND end_time IS NULL
            ORDER BY start_time DESC
            LIMIT 1
            "#,
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(lookup_err)?;

        match row {
            Some(row) => {
                let id: String = row.try_get("id").map_err(lookup_err)?;
                let start_time: DateTime<Utc> = row.try_get("start_time").map_err(lookup_err)?;
                Ok(Some(ActiveFast {
                    id: FastId::new(id),
                    start_time,
                }))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl TribeDirectory for PgDirectory {
    async fn members_of(&self, tribe_id: &TribeId) -> CollaboratorResult<Vec<UserId>> {
        let rows = sqlx::query(
            "SELECT user_id FROM tribe_members WHERE tribe_id = $1 ORDER BY joined_at, user_id",
        )
        .bind(tribe_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(lookup_err)?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("user_id")
                    .map(UserId::new)
                    .map_err(lookup_err)
            })
            .collect()
    }

    async fn size_of(&self, tribe_id: &TribeId) -> CollaboratorResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tribe_members WHERE tribe_id = $1")
            .bind(tribe_id.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(lookup_err)?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn tribe_of(&self, user_id: &UserId) -> CollaboratorResult<Option<TribeId>> {
        let tribe: Option<String> = sqlx::query_scalar(
            "SELECT tribe_id FROM tribe_members WHERE user_id = $1 ORDER BY joined_at, tribe_id LIMIT 1",
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(lookup_err)?;

        Ok(tribe.map(TribeId::new))
    }
}
