//! Collaborator trait definitions

use crate::error::CollaboratorError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parc_types::{FastId, Notification, TribeId, UserId};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Result type for collaborator calls
pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// A fast that is currently running
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveFast {
    pub id: FastId,
    pub start_time: DateTime<Utc>,
}

/// Lookup of the user's currently running fast
#[async_trait]
pub trait ActiveFastLookup: Send + Sync {
    async fn find_active_by_user(&self, user_id: &UserId) -> CollaboratorResult<Option<ActiveFast>>;
}

/// Tribe membership graph
#[async_trait]
pub trait TribeDirectory: Send + Sync {
    /// Members of a tribe in a stable order
    async fn members_of(&self, tribe_id: &TribeId) -> CollaboratorResult<Vec<UserId>>;

    /// Current member count of a tribe
    async fn size_of(&self, tribe_id: &TribeId) -> CollaboratorResult<u64>;

    /// Tribe a user's flares are scoped to, if the user belongs to one
    async fn tribe_of(&self, user_id: &UserId) -> CollaboratorResult<Option<TribeId>>;
}

/// Push notification delivery
#[async_trait]
pub trait PushDelivery: Send + Sync {
    /// Unicast send; `Ok` means the provider accepted the notification
    async fn send(&self, user_id: &UserId, notification: &Notification) -> CollaboratorResult<()>;

    /// Multicast send to a batch of users
    async fn send_batch(
        &self,
        user_ids: &[UserId],
        notification: &Notification,
    ) -> CollaboratorResult<()>;
}

/// LLM chat service producing craving help
#[async_trait]
pub trait CravingCoach: Send + Sync {
    async fn craving_help(&self, user_id: &UserId, description: &str) -> CollaboratorResult<String>;
}

/// Coach used when no LLM backend is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledCoach;

#[async_trait]
impl CravingCoach for DisabledCoach {
    async fn craving_help(&self, _user_id: &UserId, _description: &str) -> CollaboratorResult<String> {
        Err(CollaboratorError::Unavailable(
            "craving coach is disabled".to_string(),
        ))
    }
}

/// Bundle of collaborator handles shared by the engine and the sweeper
#[derive(Clone)]
pub struct Collaborators {
    pub fasts: Arc<dyn ActiveFastLookup>,
    pub tribes: Arc<dyn TribeDirectory>,
    pub push: Arc<dyn PushDelivery>,
    pub coach: Arc<dyn CravingCoach>,
}

/// Run a collaborator call under a per-operation deadline.
pub async fn with_deadline<T, F>(deadline: Duration, call: F) -> CollaboratorResult<T>
where
    F: Future<Output = CollaboratorResult<T>>,
{
    tokio::time::timeout(deadline, call)
        .await
        .map_err(|_| CollaboratorError::Timeout(deadline))?
}
