//! PostgreSQL storage implementation

use super::traits::*;
use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parc_types::{
    FastId, Flare, FlareId, FlareStatus, HypeId, HypeResponse, PreferencesPatch, SosPreferences,
    TribeId, UserId,
};
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, PgPool, Row};
use std::time::Duration;
use uuid::Uuid;

const FLARE_COLUMNS: &str = "id, owner_id, fast_id, tribe_id, description, hours_fasted, status, \
     hype_count, anonymous, ai_fallback_fired, created_at, resolved_at";

const HYPE_COLUMNS: &str =
    "id, flare_id, from_user_id, from_display_name, message, emoji, created_at";

/// PostgreSQL-backed SOS store
#[derive(Debug, Clone)]
pub struct PostgresSosStore {
    pool: PgPool,
}

impl PostgresSosStore {
    /// Connect to PostgreSQL and initialize schema
    pub async fn new(
        url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(connect_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let storage = Self { pool };
        storage.initialize_schema().await?;
        Ok(storage)
    }

    /// Shared pool, also used by the PostgreSQL directory adapter
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn initialize_schema(&self) -> Result<(), StorageError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS sos_flares (
                id UUID PRIMARY KEY,
                owner_id TEXT NOT NULL,
                fast_id TEXT NOT NULL,
                tribe_id TEXT,
                description TEXT NOT NULL,
                hours_fasted DOUBLE PRECISION NOT NULL,
                status TEXT NOT NULL,
                hype_count BIGINT NOT NULL DEFAULT 0,
                anonymous BOOLEAN NOT NULL,
                ai_fallback_fired BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMPTZ NOT NULL,
                resolved_at TIMESTAMPTZ
            );
            "#,
            r#"CREATE UNIQUE INDEX IF NOT EXISTS sos_flares_one_active_per_owner ON sos_flares(owner_id) WHERE status = 'ACTIVE';"#,
            r#"CREATE INDEX IF NOT EXISTS sos_flares_active_created ON sos_flares(created_at) WHERE status = 'ACTIVE';"#,
            r#"
            CREATE TABLE IF NOT EXISTS sos_hypes (
                seq BIGSERIAL PRIMARY KEY,
                id UUID NOT NULL UNIQUE,
                flare_id UUID NOT NULL REFERENCES sos_flares(id),
                from_user_id TEXT NOT NULL,
                from_display_name TEXT NOT NULL,
                message TEXT,
                emoji TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS sos_hypes_flare ON sos_hypes(flare_id, created_at, seq);"#,
            r#"CREATE INDEX IF NOT EXISTS sos_hypes_sender ON sos_hypes(from_user_id, created_at);"#,
            r#"
            CREATE TABLE IF NOT EXISTS sos_preferences (
                user_id TEXT PRIMARY KEY,
                notify_tribe_on_flare BOOLEAN NOT NULL,
                anonymous_by_default BOOLEAN NOT NULL,
                last_flare_at TIMESTAMPTZ
            );
            "#,
        ];

        for stmt in statements {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Query(e.to_string()))?;
        }

        Ok(())
    }

    fn flare_from_row(row: &PgRow) -> Result<Flare, StorageError> {
        let status: String = row.try_get("status").map_err(query_err)?;
        let hype_count: i64 = row.try_get("hype_count").map_err(query_err)?;
        let tribe_id: Option<String> = row.try_get("tribe_id").map_err(query_err)?;

        Ok(Flare {
            id: FlareId::from_uuid(row.try_get::<Uuid, _>("id").map_err(query_err)?),
            owner_id: UserId::new(row.try_get::<String, _>("owner_id").map_err(query_err)?),
            fast_id: FastId::new(row.try_get::<String, _>("fast_id").map_err(query_err)?),
            tribe_id: tribe_id.map(TribeId::new),
            description: row.try_get("description").map_err(query_err)?,
            hours_fasted: row.try_get("hours_fasted").map_err(query_err)?,
            status: status.parse().map_err(StorageError::InvalidData)?,
            hype_count: u64::try_from(hype_count)
                .map_err(|_| StorageError::InvalidData(format!("negative hype_count {}", hype_count)))?,
            anonymous: row.try_get("anonymous").map_err(query_err)?,
            ai_fallback_fired: row.try_get("ai_fallback_fired").map_err(query_err)?,
            created_at: row.try_get("created_at").map_err(query_err)?,
            resolved_at: row.try_get("resolved_at").map_err(query_err)?,
        })
    }

    fn hype_from_row(row: &PgRow) -> Result<HypeResponse, StorageError> {
        Ok(HypeResponse {
            id: HypeId::from_uuid(row.try_get::<Uuid, _>("id").map_err(query_err)?),
            flare_id: FlareId::from_uuid(row.try_get::<Uuid, _>("flare_id").map_err(query_err)?),
            from_user_id: UserId::new(
                row.try_get::<String, _>("from_user_id").map_err(query_err)?,
            ),
            from_display_name: row.try_get("from_display_name").map_err(query_err)?,
            message: row.try_get("message").map_err(query_err)?,
            emoji: row.try_get("emoji").map_err(query_err)?,
            created_at: row.try_get("created_at").map_err(query_err)?,
        })
    }

    /// Explain why a guarded update touched no rows
    async fn explain_missed_update(&self, id: &FlareId) -> StorageError {
        match self.find_flare(id).await {
            Ok(Some(flare)) if flare.ai_fallback_fired && flare.is_active() => {
                StorageError::AlreadySet(format!("flare {} ai_fallback_fired", id))
            }
            Ok(Some(flare)) => {
                StorageError::Conflict(format!("flare {} is already {}", id, flare.status))
            }
            Ok(None) => StorageError::NotFound(format!("flare {}", id)),
            Err(e) => e,
        }
    }
}

fn query_err(e: sqlx::Error) -> StorageError {
    StorageError::Query(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "23505")
}

impl SosStore for PostgresSosStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }
}

#[async_trait]
impl FlareStorage for PostgresSosStore {
    async fn save_flare(&self, flare: Flare) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sos_flares (
                id, owner_id, fast_id, tribe_id, description, hours_fasted, status,
                hype_count, anonymous, ai_fallback_fired, created_at, resolved_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(flare.id.as_uuid())
        .bind(flare.owner_id.as_str())
        .bind(flare.fast_id.as_str())
        .bind(flare.tribe_id.as_ref().map(|t| t.as_str()))
        .bind(&flare.description)
        .bind(flare.hours_fasted)
        .bind(flare.status.as_str())
        .bind(flare.hype_count as i64)
        .bind(flare.anonymous)
        .bind(flare.ai_fallback_fired)
        .bind(flare.created_at)
        .bind(flare.resolved_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::Conflict(format!(
                    "user {} already has an active flare",
                    flare.owner_id
                ))
            } else {
                query_err(e)
            }
        })?;

        Ok(())
    }

    async fn find_flare(&self, id: &FlareId) -> StorageResult<Option<Flare>> {
        let row = sqlx::query(&format!("SELECT {} FROM sos_flares WHERE id = $1", FLARE_COLUMNS))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_err)?;

        row.as_ref().map(Self::flare_from_row).transpose()
    }

    async fn find_active_by_owner(&self, owner_id: &UserId) -> StorageResult<Option<Flare>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM sos_flares WHERE owner_id = $1 AND status = 'ACTIVE' LIMIT 1",
            FLARE_COLUMNS
        ))
        .bind(owner_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_err)?;

        row.as_ref().map(Self::flare_from_row).transpose()
    }

    async fn find_all_active(&self) -> StorageResult<Vec<Flare>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM sos_flares WHERE status = 'ACTIVE' ORDER BY created_at ASC",
            FLARE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(query_err)?;

        rows.iter().map(Self::flare_from_row).collect()
    }

    async fn update_status(
        &self,
        id: &FlareId,
        status: FlareStatus,
        resolved_at: DateTime<Utc>,
    ) -> StorageResult<Flare> {
        if status.is_active() {
            return Err(StorageError::InvalidData(
                "cannot transition a flare back to ACTIVE".to_string(),
            ));
        }

        let row = sqlx::query(&format!(
            r#"
            UPDATE sos_flares
            SET status = $2, resolved_at = GREATEST($3, created_at)
            WHERE id = $1 AND status = 'ACTIVE'
            RETURNING {}
            "#,
            FLARE_COLUMNS
        ))
        .bind(id.as_uuid())
        .bind(status.as_str())
        .bind(resolved_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_err)?;

        match row {
            Some(row) => Self::flare_from_row(&row),
            None => Err(match self.find_flare(id).await? {
                Some(flare) => {
                    StorageError::Conflict(format!("flare {} is already {}", id, flare.status))
                }
                None => StorageError::NotFound(format!("flare {}", id)),
            }),
        }
    }

    async fn set_ai_fallback_fired(&self, id: &FlareId) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sos_flares
            SET ai_fallback_fired = TRUE
            WHERE id = $1 AND status = 'ACTIVE' AND ai_fallback_fired = FALSE
            "#,
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(query_err)?;

        if result.rows_affected() > 0 {
            Ok(())
        } else {
            Err(self.explain_missed_update(id).await)
        }
    }
}

#[async_trait]
impl HypeStorage for PostgresSosStore {
    async fn append_hype(&self, hype: HypeResponse) -> StorageResult<u64> {
        let mut tx = self.pool.begin().await.map_err(query_err)?;

        // Row lock on the flare serializes concurrent appends and resolves
        let row = sqlx::query(
            r#"
            UPDATE sos_flares
            SET hype_count = hype_count + 1
            WHERE id = $1 AND status = 'ACTIVE'
            RETURNING hype_count
            "#,
        )
        .bind(hype.flare_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(query_err)?;

        let Some(row) = row else {
            tx.rollback().await.map_err(query_err)?;
            return Err(match self.find_flare(&hype.flare_id).await? {
                Some(flare) => StorageError::Conflict(format!(
                    "flare {} is already {}",
                    hype.flare_id, flare.status
                )),
                None => StorageError::NotFound(format!("flare {}", hype.flare_id)),
            });
        };
        let hype_count: i64 = row.try_get("hype_count").map_err(query_err)?;

        sqlx::query(
            r#"
            INSERT INTO sos_hypes (id, flare_id, from_user_id, from_display_name, message, emoji, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(hype.id.as_uuid())
        .bind(hype.flare_id.as_uuid())
        .bind(hype.from_user_id.as_str())
        .bind(&hype.from_display_name)
        .bind(hype.message.as_deref())
        .bind(&hype.emoji)
        .bind(hype.created_at)
        .execute(&mut *tx)
        .await
        .map_err(query_err)?;

        tx.commit().await.map_err(query_err)?;

        u64::try_from(hype_count)
            .map_err(|_| StorageError::InvalidData(format!("negative hype_count {}", hype_count)))
    }

    async fn list_hypes(&self, flare_id: &FlareId) -> StorageResult<Vec<HypeResponse>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM sos_hypes WHERE flare_id = $1 ORDER BY created_at ASC, seq ASC",
            HYPE_COLUMNS
        ))
        .bind(flare_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(query_err)?;

        rows.iter().map(Self::hype_from_row).collect()
    }

    async fn count_hypes_by_sender_since(
        &self,
        user_id: &UserId,
        since: DateTime<Utc>,
    ) -> StorageResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sos_hypes WHERE from_user_id = $1 AND created_at >= $2",
        )
        .bind(user_id.as_str())
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(query_err)?;

        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl PreferencesStorage for PostgresSosStore {
    async fn get_preferences(&self, user_id: &UserId) -> StorageResult<SosPreferences> {
        let defaults = SosPreferences::defaults_for(user_id.clone());

        // Insert defaults on first read, then read back whatever is stored
        sqlx::query(
            r#"
            INSERT INTO sos_preferences (user_id, notify_tribe_on_flare, anonymous_by_default, last_flare_at)
            VALUES ($1, $2, $3, NULL)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id.as_str())
        .bind(defaults.notify_tribe_on_flare)
        .bind(defaults.anonymous_by_default)
        .execute(&self.pool)
        .await
        .map_err(query_err)?;

        let row = sqlx::query(
            "SELECT notify_tribe_on_flare, anonymous_by_default, last_flare_at FROM sos_preferences WHERE user_id = $1",
        )
        .bind(user_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(query_err)?;

        Ok(SosPreferences {
            user_id: user_id.clone(),
            notify_tribe_on_flare: row.try_get("notify_tribe_on_flare").map_err(query_err)?,
            anonymous_by_default: row.try_get("anonymous_by_default").map_err(query_err)?,
            last_flare_at: row.try_get("last_flare_at").map_err(query_err)?,
        })
    }

    async fn update_preference_flags(
        &self,
        user_id: &UserId,
        patch: PreferencesPatch,
    ) -> StorageResult<SosPreferences> {
        let defaults = SosPreferences::defaults_for(user_id.clone());

        // Unset fields keep the stored value; last_flare_at is never written
        let row = sqlx::query(
            r#"
            INSERT INTO sos_preferences (user_id, notify_tribe_on_flare, anonymous_by_default, last_flare_at)
            VALUES ($1, COALESCE($2, $4), COALESCE($3, $5), NULL)
            ON CONFLICT (user_id)
            DO UPDATE SET
                notify_tribe_on_flare = COALESCE($2, sos_preferences.notify_tribe_on_flare),
                anonymous_by_default = COALESCE($3, sos_preferences.anonymous_by_default)
            RETURNING notify_tribe_on_flare, anonymous_by_default, last_flare_at
            "#,
        )
        .bind(user_id.as_str())
        .bind(patch.notify_tribe_on_flare)
        .bind(patch.anonymous_by_default)
        .bind(defaults.notify_tribe_on_flare)
        .bind(defaults.anonymous_by_default)
        .fetch_one(&self.pool)
        .await
        .map_err(query_err)?;

        Ok(SosPreferences {
            user_id: user_id.clone(),
            notify_tribe_on_flare: row.try_get("notify_tribe_on_flare").map_err(query_err)?,
            anonymous_by_default: row.try_get("anonymous_by_default").map_err(query_err)?,
            last_flare_at: row.try_get("last_flare_at").map_err(query_err)?,
        })
    }

    async fn record_last_flare_at(&self, user_id: &UserId, at: DateTime<Utc>) -> StorageResult<()> {
        let defaults = SosPreferences::defaults_for(user_id.clone());

        // GREATEST ignores NULL, so a first write takes `at`
        sqlx::query(
            r#"
            INSERT INTO sos_preferences (user_id, notify_tribe_on_flare, anonymous_by_default, last_flare_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id)
            DO UPDATE SET last_flare_at = GREATEST(sos_preferences.last_flare_at, EXCLUDED.last_flare_at)
            "#,
        )
        .bind(user_id.as_str())
        .bind(defaults.notify_tribe_on_flare)
        .bind(defaults.anonymous_by_default)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(query_err)?;

        Ok(())
    }
}
