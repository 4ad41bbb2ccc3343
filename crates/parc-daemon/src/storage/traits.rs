//! Storage trait definitions

use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parc_types::{
    Flare, FlareId, FlareStatus, HypeResponse, PreferencesPatch, SosPreferences, UserId,
};

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Combined SOS store
///
/// Callers bound each call with their own deadline; dropping the future
/// cancels the operation.
#[async_trait]
pub trait SosStore: FlareStorage + HypeStorage + PreferencesStorage + Send + Sync {
    /// Backend label for logs and health output
    fn backend(&self) -> &'static str;
}

/// Storage for flares
#[async_trait]
pub trait FlareStorage: Send + Sync {
    /// Persist a new flare.
    ///
    /// Fails with `Conflict` if the owner already has an ACTIVE flare.
    async fn save_flare(&self, flare: Flare) -> StorageResult<()>;

    /// Get a flare by ID
    async fn find_flare(&self, id: &FlareId) -> StorageResult<Option<Flare>>;

    /// Get the owner's ACTIVE flare, if any
    async fn find_active_by_owner(&self, owner_id: &UserId) -> StorageResult<Option<Flare>>;

    /// List ACTIVE flares ordered by `created_at` ascending
    async fn find_all_active(&self) -> StorageResult<Vec<Flare>>;

    /// Move an ACTIVE flare to a terminal status and return the updated flare.
    ///
    /// Fails with `NotFound` for unknown flares and `Conflict` if the flare is
    /// already terminal.
    async fn update_status(
        &self,
        id: &FlareId,
        status: FlareStatus,
        resolved_at: DateTime<Utc>,
    ) -> StorageResult<Flare>;

    /// Set the write-once AI fallback flag on an ACTIVE flare.
    ///
    /// Fails with `NotFound`, `AlreadySet`, or `Conflict` (flare not ACTIVE).
    async fn set_ai_fallback_fired(&self, id: &FlareId) -> StorageResult<()>;
}

/// Storage for hype responses
#[async_trait]
pub trait HypeStorage: Send + Sync {
    /// Append a hype and increment the flare's `hype_count` atomically.
    ///
    /// Returns the post-increment count. Fails with `NotFound` for unknown
    /// flares and `Conflict` if the flare is no longer ACTIVE.
    async fn append_hype(&self, hype: HypeResponse) -> StorageResult<u64>;

    /// List hypes for a flare ordered by `created_at`, ties in insertion order
    async fn list_hypes(&self, flare_id: &FlareId) -> StorageResult<Vec<HypeResponse>>;

    /// Count hypes sent by `user_id` at or after `since`
    async fn count_hypes_by_sender_since(
        &self,
        user_id: &UserId,
        since: DateTime<Utc>,
    ) -> StorageResult<u64>;
}

/// Storage for per-user SOS preferences
#[async_trait]
pub trait PreferencesStorage: Send + Sync {
    /// Get preferences, creating and persisting defaults on first read
    async fn get_preferences(&self, user_id: &UserId) -> StorageResult<SosPreferences>;

    /// Apply the user-editable flags in `patch` and return the stored row.
    ///
    /// Never touches `last_flare_at`.
    async fn update_preference_flags(
        &self,
        user_id: &UserId,
        patch: PreferencesPatch,
    ) -> StorageResult<SosPreferences>;

    /// Advance the cooldown anchor to `at`.
    ///
    /// The stored value only moves forward; an older `at` is a no-op.
    async fn record_last_flare_at(&self, user_id: &UserId, at: DateTime<Utc>) -> StorageResult<()>;
}
