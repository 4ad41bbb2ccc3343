//! In-process collaborator adapters for development and testing

use super::traits::*;
use crate::config::DirectorySeed;
use crate::error::CollaboratorError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parc_types::{FastId, Notification, TribeId, UserId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// In-memory fasts and tribe membership
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    fasts: RwLock<HashMap<UserId, ActiveFast>>,
    tribes: RwLock<HashMap<TribeId, Vec<UserId>>>,
    primary_tribe: RwLock<HashMap<UserId, TribeId>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory preloaded from the `directory` config section
    pub async fn from_seed(seed: &DirectorySeed) -> Self {
        let directory = Self::new();
        for tribe in &seed.tribes {
            let tribe_id = TribeId::new(tribe.id.clone());
            for member in &tribe.members {
                directory.add_member(&tribe_id, &UserId::new(member.clone())).await;
            }
        }
        for fast in &seed.fasts {
            directory
                .start_fast(
                    &UserId::new(fast.user_id.clone()),
                    FastId::new(fast.fast_id.clone()),
                    fast.started_at,
                )
                .await;
        }

        tracing::info!(
            tribes = seed.tribes.len(),
            fasts = seed.fasts.len(),
            "Loaded in-memory directory"
        );
        directory
    }

    /// Mark a fast as running for `user_id`
    pub async fn start_fast(&self, user_id: &UserId, fast_id: FastId, start_time: DateTime<Utc>) {
        let mut fasts = self.fasts.write().await;
        fasts.insert(
            user_id.clone(),
            ActiveFast {
                id: fast_id,
                start_time,
            },
        );
    }

    pub async fn end_fast(&self, user_id: &UserId) {
        let mut fasts = self.fasts.write().await;
        fasts.remove(user_id);
    }

    /// Add a member; the first tribe a user joins becomes their flare scope
    pub async fn add_member(&self, tribe_id: &TribeId, user_id: &UserId) {
        {
            let mut tribes = self.tribes.write().await;
            let members = tribes.entry(tribe_id.clone()).or_default();
            if !members.contains(user_id) {
                members.push(user_id.clone());
            }
        }

        let mut primary = self.primary_tribe.write().await;
        primary
            .entry(user_id.clone())
            .or_insert_with(|| tribe_id.clone());
    }
}

#[async_trait]
impl ActiveFastLookup for InMemoryDirectory {
    async fn find_active_by_user(&self, user_id: &UserId) -> CollaboratorResult<Option<ActiveFast>> {
        let fasts = self.fasts.read().await;
        Ok(fasts.get(user_id).cloned())
    }
}

#[async_trait]
impl TribeDirectory for InMemoryDirectory {
    async fn members_of(&self, tribe_id: &TribeId) -> CollaboratorResult<Vec<UserId>> {
        let tribes = self.tribes.read().await;
        Ok(tribes.get(tribe_id).cloned().unwrap_or_default())
    }

    async fn size_of(&self, tribe_id: &TribeId) -> CollaboratorResult<u64> {
        let tribes = self.tribes.read().await;
        Ok(tribes.get(tribe_id).map_or(0, |m| m.len() as u64))
    }

    async fn tribe_of(&self, user_id: &UserId) -> CollaboratorResult<Option<TribeId>> {
        let primary = self.primary_tribe.read().await;
        Ok(primary.get(user_id).cloned())
    }
}

/// Push sink that only logs
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPush;

#[async_trait]
impl PushDelivery for LogPush {
    async fn send(&self, user_id: &UserId, notification: &Notification) -> CollaboratorResult<()> {
        tracing::info!(
            user_id = %user_id,
            kind = notification.kind.as_str(),
            title = %notification.title,
            "Push notification"
        );
        Ok(())
    }

    async fn send_batch(
        &self,
        user_ids: &[UserId],
        notification: &Notification,
    ) -> CollaboratorResult<()> {
        tracing::info!(
            recipients = user_ids.len(),
            kind = notification.kind.as_str(),
            title = %notification.title,
            "Push notification batch"
        );
        Ok(())
    }
}

/// One accepted (or attempted) push
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub recipients: Vec<UserId>,
    pub notification: Notification,
}

/// Push sink that records every call; can be switched to reject
#[derive(Debug, Default)]
pub struct RecordingPush {
    deliveries: RwLock<Vec<Delivery>>,
    failing: AtomicBool,
}

impl RecordingPush {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail (the attempt is still recorded)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.read().await.clone()
    }

    /// Notifications received by `user_id`
    pub async fn received_by(&self, user_id: &UserId) -> Vec<Notification> {
        self.deliveries
            .read()
            .await
            .iter()
            .filter(|d| d.recipients.contains(user_id))
            .map(|d| d.notification.clone())
            .collect()
    }

    async fn record(&self, recipients: Vec<UserId>, notification: &Notification) -> CollaboratorResult<()> {
        self.deliveries.write().await.push(Delivery {
            recipients,
            notification: notification.clone(),
        });

        if self.failing.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Rejected {
                status: 503,
                message: "push provider unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PushDelivery for RecordingPush {
    async fn send(&self, user_id: &UserId, notification: &Notification) -> CollaboratorResult<()> {
        self.record(vec![user_id.clone()], notification).await
    }

    async fn send_batch(
        &self,
        user_ids: &[UserId],
        notification: &Notification,
    ) -> CollaboratorResult<()> {
        self.record(user_ids.to_vec(), notification).await
    }
}

/// Coach returning a fixed reply, or failing when no reply is set
#[derive(Debug, Clone, Default)]
pub struct CannedCoach {
    reply: Option<String>,
}

impl CannedCoach {
    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            reply: Some(reply.into()),
        }
    }

    pub fn failing() -> Self {
        Self { reply: None }
    }
}

#[async_trait]
impl CravingCoach for CannedCoach {
    async fn craving_help(&self, _user_id: &UserId, _description: &str) -> CollaboratorResult<String> {
        self.reply
            .clone()
            .ok_or_else(|| CollaboratorError::Transport("coach backend unreachable".to_string()))
    }
}
