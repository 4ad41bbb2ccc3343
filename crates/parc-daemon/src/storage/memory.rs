//! In-memory storage implementation

use super::traits::*;
use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parc_types::{
    Flare, FlareId, FlareStatus, HypeResponse, PreferencesPatch, SosPreferences, UserId,
};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// All entity sets live behind one lock so that a hype append and the
/// matching `hype_count` increment happen in a single critical section.
#[derive(Debug, Default)]
struct SosState {
    flares: HashMap<FlareId, Flare>,
    /// Hypes in insertion order
    hypes: Vec<HypeResponse>,
    preferences: HashMap<UserId, SosPreferences>,
}

/// In-memory SOS store for development and testing
#[derive(Debug, Default)]
pub struct InMemorySosStore {
    state: RwLock<SosState>,
}

impl InMemorySosStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }
}

impl SosStore for InMemorySosStore {
    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl FlareStorage for InMemorySosStore {
    async fn save_flare(&self, flare: Flare) -> StorageResult<()> {
        let mut state = self.state.write().await;

        if flare.is_active() {
            let duplicate = state.flares.values().any(|existing| {
                existing.id != flare.id && existing.is_active() && existing.owner_id == flare.owner_id
            });
            if duplicate {
                return Err(StorageError::Conflict(format!(
                    "user {} already has an active flare",
                    flare.owner_id
                )));
            }
        }

        state.flares.insert(flare.id, flare);
        Ok(())
    }

    async fn find_flare(&self, id: &FlareId) -> StorageResult<Option<Flare>> {
        let state = self.state.read().await;
        Ok(state.flares.get(id).cloned())
    }

    async fn find_active_by_owner(&self, owner_id: &UserId) -> StorageResult<Option<Flare>> {
        let state = self.state.read().await;
        Ok(state
            .flares
            .values()
            .find(|f| f.is_active() && &f.owner_id == owner_id)
            .cloned())
    }

    async fn find_all_active(&self) -> StorageResult<Vec<Flare>> {
        let state = self.state.read().await;
        let mut active: Vec<Flare> = state
            .flares
            .values()
            .filter(|f| f.is_active())
            .cloned()
            .collect();
        active.sort_by_key(|f| f.created_at);
        Ok(active)
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

        let mut state = self.state.write().await;
        let flare = state
            .flares
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(format!("flare {}", id)))?;

        if !flare.is_active() {
            return Err(StorageError::Conflict(format!(
                "flare {} is already {}",
                id, flare.status
            )));
        }

        flare.status = status;
        flare.resolved_at = Some(resolved_at.max(flare.created_at));
        Ok(flare.clone())
    }

    async fn set_ai_fallback_fired(&self, id: &FlareId) -> StorageResult<()> {
        let mut state = self.state.write().await;
        let flare = state
            .flares
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(format!("flare {}", id)))?;

        if flare.ai_fallback_fired {
            return Err(StorageError::AlreadySet(format!("flare {} ai_fallback_fired", id)));
        }
        if !flare.is_active() {
            return Err(StorageError::Conflict(format!(
                "flare {} is already {}",
                id, flare.status
            )));
        }

        flare.ai_fallback_fired = true;
        Ok(())
    }
}

#[async_trait]
impl HypeStorage for InMemorySosStore {
    async fn append_hype(&self, hype: HypeResponse) -> StorageResult<u64> {
        let mut state = self.state.write().await;
        let flare = state
            .flares
            .get_mut(&hype.flare_id)
            .ok_or_else(|| StorageError::NotFound(format!("flare {}", hype.flare_id)))?;

        if !flare.is_active() {
            return Err(StorageError::Conflict(format!(
                "flare {} is already {}",
                hype.flare_id, flare.status
            )));
        }

        flare.hype_count += 1;
        let count = flare.hype_count;
        state.hypes.push(hype);
        Ok(count)
    }

    async fn list_hypes(&self, flare_id: &FlareId) -> StorageResult<Vec<HypeResponse>> {
        let state = self.state.read().await;
        let mut hypes: Vec<HypeResponse> = state
            .hypes
            .iter()
            .filter(|h| &h.flare_id == flare_id)
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps
        hypes.sort_by_key(|h| h.created_at);
        Ok(hypes)
    }

    async fn count_hypes_by_sender_since(
        &self,
        user_id: &UserId,
        since: DateTime<Utc>,
    ) -> StorageResult<u64> {
        let state = self.state.read().await;
        Ok(state
            .hypes
            .iter()
            .filter(|h| &h.from_user_id == user_id && h.created_at >= since)
            .count() as u64)
    }
}

#[async_trait]
impl PreferencesStorage for InMemorySosStore {
    async fn get_preferences(&self, user_id: &UserId) -> StorageResult<SosPreferences> {
        {
            let state = self.state.read().await;
            if let Some(prefs) = state.preferences.get(user_id) {
                return Ok(prefs.clone());
            }
        }

        let mut state = self.state.write().await;
        Ok(state
            .preferences
            .entry(user_id.clone())
            .or_insert_with(|| SosPreferences::defaults_for(user_id.clone()))
            .clone())
    }

    async fn update_preference_flags(
        &self,
        user_id: &UserId,
        patch: PreferencesPatch,
    ) -> StorageResult<SosPreferences> {
        let mut state = self.state.write().await;
        let prefs = state
            .preferences
            .entry(user_id.clone())
            .or_insert_with(|| SosPreferences::defaults_for(user_id.clone()));

        *prefs = patch.apply(prefs.clone());
        Ok(prefs.clone())
    }

    async fn record_last_flare_at(&self, user_id: &UserId, at: DateTime<Utc>) -> StorageResult<()> {
        let mut state = self.state.write().await;
        let prefs = state
            .preferences
            .entry(user_id.clone())
            .or_insert_with(|| SosPreferences::defaults_for(user_id.clone()));

        prefs.last_flare_at = Some(prefs.last_flare_at.map_or(at, |last| last.max(at)));
        Ok(())
    }
}
