//! Rescue engine: the public PARC operations

use super::background::BackgroundTasks;
use super::compose::MessageComposer;
use super::cooldown::{CooldownDecision, CooldownGate};
use super::fanout::FanoutDispatcher;
use super::quota::{HypeQuota, QuotaStatus};
use crate::clock::Clock;
use crate::collaborators::{with_deadline, Collaborators};
use crate::config::RescueConfig;
use crate::error::{RescueError, RescueResult, StorageError};
use crate::storage::SosStore;
use chrono::{DateTime, Utc};
use parc_types::{
    normalize_description, normalize_emoji, normalize_message, Flare, FlareId, FlareStatus,
    HypeResponse, PreferencesPatch, SosPreferences, UserId, UNKNOWN_SENDER_NAME,
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

const PREFERENCES_WRITE_ATTEMPTS: u32 = 3;

/// Authenticated caller as injected by the identity collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    pub display_name: Option<String>,
}

impl Caller {
    pub fn new(user_id: UserId, display_name: Option<String>) -> Self {
        Self {
            user_id,
            display_name,
        }
    }

    /// Display name, or the placeholder used for unknown senders
    pub fn name(&self) -> &str {
        self.display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(UNKNOWN_SENDER_NAME)
    }
}

/// Result of raising a flare
#[derive(Debug, Clone, Serialize)]
pub struct RaiseOutcome {
    pub flare: Flare,
    pub ai_reply: Option<String>,
}

/// Coordinates the store, the policies, and the collaborators
pub struct RescueEngine {
    store: Arc<dyn SosStore>,
    collaborators: Collaborators,
    clock: Arc<dyn Clock>,
    cooldown: CooldownGate,
    quota: HypeQuota,
    fanout: FanoutDispatcher,
    tasks: Arc<BackgroundTasks>,
    deadline: Duration,
}

impl RescueEngine {
    pub fn new(
        store: Arc<dyn SosStore>,
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
        config: &RescueConfig,
    ) -> Self {
        let deadline = config.collaborator_timeout();
        Self {
            quota: HypeQuota::new(
                store.clone(),
                collaborators.tribes.clone(),
                clock.clone(),
                deadline,
            ),
            fanout: FanoutDispatcher::new(
                collaborators.tribes.clone(),
                collaborators.push.clone(),
                config.fanout_batch_size(),
                deadline,
            ),
            cooldown: CooldownGate::new(config.cooldown()),
            tasks: Arc::new(BackgroundTasks::new(config.background_timeout())),
            store,
            collaborators,
            clock,
            deadline,
        }
    }

    /// Detached work started by this engine
    pub fn tasks(&self) -> &Arc<BackgroundTasks> {
        &self.tasks
    }

    pub fn store(&self) -> &Arc<dyn SosStore> {
        &self.store
    }

    /// Raise a flare for `owner`.
    ///
    /// Checks run in order (cooldown, active fast) and the first failure
    /// wins. The flare is durable before any notification is attempted, and
    /// the tribe fan-out is detached before the coach reply is awaited.
    pub async fn raise_flare(&self, owner: &Caller, description: &str) -> RescueResult<RaiseOutcome> {
        let description = normalize_description(description)
            .map_err(|e| RescueError::InvalidInput(e.to_string()))?;

        let preferences = self.store.get_preferences(&owner.user_id).await?;
        let now = self.clock.now();

        if let CooldownDecision::Deny { remaining_secs } = self.cooldown.check(&preferences, now) {
            return Err(RescueError::CooldownActive { remaining_secs });
        }

        let fast = with_deadline(
            self.deadline,
            self.collaborators.fasts.find_active_by_user(&owner.user_id),
        )
        .await?
        .ok_or(RescueError::NoActiveFast)?;

        let hours_fasted = (now - fast.start_time).num_milliseconds().max(0) as f64 / 3_600_000.0;

        let tribe_id = match with_deadline(
            self.deadline,
            self.collaborators.tribes.tribe_of(&owner.user_id),
        )
        .await
        {
            Ok(tribe_id) => tribe_id,
            Err(e) => {
                tracing::warn!(owner_id = %owner.user_id, error = %e, "Tribe lookup failed, raising unscoped flare");
                None
            }
        };

        self.expire_prior_flare(&owner.user_id, now).await?;

        let flare = Flare::new(
            owner.user_id.clone(),
            fast.id,
            tribe_id,
            description,
            hours_fasted,
            preferences.anonymous_by_default,
            now,
        );

        match self.store.save_flare(flare.clone()).await {
            Ok(()) => {}
            // A concurrent raise by the same owner won the race
            Err(StorageError::Conflict(_)) => {
                return Err(RescueError::CooldownActive {
                    remaining_secs: self.cooldown.cooldown().num_seconds().max(0) as u64,
                })
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            flare_id = %flare.id,
            owner_id = %flare.owner_id,
            hours_fasted = flare.whole_hours_fasted(),
            anonymous = flare.anonymous,
            "Flare raised"
        );

        self.record_last_flare(&owner.user_id, now).await;

        if preferences.notify_tribe_on_flare && flare.tribe_id.is_some() {
            let fanout = self.fanout.clone();
            let snapshot = flare.clone();
            let sender_name = owner.name().to_string();
            self.tasks.spawn("fanout", async move {
                fanout.dispatch(&snapshot, &sender_name).await;
            });
        }

        let ai_reply = self.craving_help(owner, &flare.description).await;

        Ok(RaiseOutcome { flare, ai_reply })
    }

    /// Send a hype to someone else's ACTIVE flare
    pub async fn send_hype(
        &self,
        flare_id: &FlareId,
        sender: &Caller,
        emoji: &str,
        message: Option<&str>,
    ) -> RescueResult<HypeResponse> {
        let flare = self.load_flare(flare_id).await?;

        if !flare.is_active() {
            return Err(RescueError::FlareInactive);
        }
        if sender.user_id == flare.owner_id {
            return Err(RescueError::SelfHypeForbidden);
        }

        let quota = self
            .quota
            .status(&sender.user_id, flare.tribe_id.as_ref())
            .await?;
        if quota.is_exhausted() {
            return Err(RescueError::QuotaExhausted {
                used: quota.used,
                cap: quota.cap,
            });
        }

        let emoji = normalize_emoji(emoji).map_err(|e| RescueError::InvalidInput(e.to_string()))?;
        let hype = HypeResponse::new(
            flare.id,
            sender.user_id.clone(),
            sender.display_name.clone(),
            emoji,
            normalize_message(message),
            self.clock.now(),
        );

        let hype_count = match self.store.append_hype(hype.clone()).await {
            Ok(count) => count,
            Err(StorageError::Conflict(_)) => return Err(RescueError::FlareInactive),
            Err(StorageError::NotFound(_)) => {
                return Err(RescueError::NotFound(flare_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            flare_id = %flare.id,
            hype_id = %hype.id,
            from_user_id = %hype.from_user_id,
            hype_count,
            "Hype sent"
        );

        let push = self.collaborators.push.clone();
        let deadline = self.deadline;
        let owner = flare.owner_id.clone();
        let notification = MessageComposer::hype_received(&flare, &hype);
        self.tasks.spawn("hype_notify", async move {
            if let Err(e) = with_deadline(deadline, push.send(&owner, &notification)).await {
                tracing::warn!(owner_id = %owner, error = %e, "Hype notification failed");
            }
        });

        Ok(hype)
    }

    /// Resolve a flare as survived (RESCUED) or not (FAILED).
    ///
    /// Only the owner may resolve. Resolving a flare that already left
    /// ACTIVE returns it unchanged and notifies nobody.
    pub async fn resolve_flare(
        &self,
        flare_id: &FlareId,
        caller: &UserId,
        survived: bool,
    ) -> RescueResult<Flare> {
        let flare = self.load_flare(flare_id).await?;

        if &flare.owner_id != caller {
            return Err(RescueError::NotOwner);
        }
        if !flare.is_active() {
            return Ok(flare);
        }

        let status = FlareStatus::from_outcome(survived);
        let resolved = match self
            .store
            .update_status(flare_id, status, self.clock.now())
            .await
        {
            Ok(resolved) => resolved,
            // Lost a race with another resolve or the janitor
            Err(StorageError::Conflict(_)) => return self.load_flare(flare_id).await,
            Err(e) => return Err(e.into()),
        };

        tracing::info!(flare_id = %resolved.id, status = %resolved.status, "Flare resolved");

        if survived {
            self.notify_responders(&resolved).await;
        }

        Ok(resolved)
    }

    pub async fn get_flare(&self, flare_id: &FlareId) -> RescueResult<Flare> {
        self.load_flare(flare_id).await
    }

    /// The owner's ACTIVE flare, if any
    pub async fn active_flare(&self, owner: &UserId) -> RescueResult<Option<Flare>> {
        Ok(self.store.find_active_by_owner(owner).await?)
    }

    /// Hypes on a flare in delivery order
    pub async fn list_hypes(&self, flare_id: &FlareId) -> RescueResult<Vec<HypeResponse>> {
        self.load_flare(flare_id).await?;
        Ok(self.store.list_hypes(flare_id).await?)
    }

    /// `sender`'s remaining hype budget in the tribe of `flare_id`
    pub async fn hype_quota(&self, sender: &UserId, flare_id: &FlareId) -> RescueResult<QuotaStatus> {
        let flare = self.load_flare(flare_id).await?;
        self.quota.status(sender, flare.tribe_id.as_ref()).await
    }

    pub async fn preferences(&self, user_id: &UserId) -> RescueResult<SosPreferences> {
        Ok(self.store.get_preferences(user_id).await?)
    }

    pub async fn update_preferences(
        &self,
        user_id: &UserId,
        patch: PreferencesPatch,
    ) -> RescueResult<SosPreferences> {
        Ok(self.store.update_preference_flags(user_id, patch).await?)
    }

    async fn load_flare(&self, flare_id: &FlareId) -> RescueResult<Flare> {
        self.store
            .find_flare(flare_id)
            .await?
            .ok_or_else(|| RescueError::NotFound(flare_id.to_string()))
    }

    /// Expire an ACTIVE flare older than the cooldown.
    ///
    /// A younger one belongs to a raise that beat this one past the cooldown
    /// check, so this raise is refused instead.
    async fn expire_prior_flare(&self, owner: &UserId, now: DateTime<Utc>) -> RescueResult<()> {
        let Some(prior) = self.store.find_active_by_owner(owner).await? else {
            return Ok(());
        };

        if let CooldownDecision::Deny { remaining_secs } =
            self.cooldown.check_since(Some(prior.created_at), now)
        {
            return Err(RescueError::CooldownActive { remaining_secs });
        }

        match self
            .store
            .update_status(&prior.id, FlareStatus::Expired, now)
            .await
        {
            Ok(_) => {
                tracing::info!(flare_id = %prior.id, owner_id = %owner, "Expired prior active flare");
                Ok(())
            }
            Err(StorageError::Conflict(_)) | Err(StorageError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist `last_flare_at`, retrying within the request
    async fn record_last_flare(&self, user_id: &UserId, now: DateTime<Utc>) {
        for attempt in 1..=PREFERENCES_WRITE_ATTEMPTS {
            match self.store.record_last_flare_at(user_id, now).await {
                Ok(()) => return,
                Err(e) if attempt < PREFERENCES_WRITE_ATTEMPTS => {
                    tracing::warn!(user_id = %user_id, attempt, error = %e, "Retrying cooldown write");
                }
                Err(e) => {
                    tracing::error!(
                        user_id = %user_id,
                        error = %e,
                        "Cooldown write failed, next flare will not be rate limited"
                    );
                }
            }
        }
    }

    /// Ask the coach for help on a detached task and wait for its answer.
    ///
    /// The wait is bounded by the collaborator deadline; the task keeps
    /// running under the background timeout after the wait gives up. Any
    /// failure yields `None`.
    async fn craving_help(&self, owner: &Caller, description: &str) -> Option<String> {
        let (tx, rx) = oneshot::channel();
        let coach = self.collaborators.coach.clone();
        let user_id = owner.user_id.clone();
        let description = description.to_string();

        self.tasks.spawn("craving_help", async move {
            let reply = coach.craving_help(&user_id, &description).await;
            let _ = tx.send(reply);
        });

        match tokio::time::timeout(self.deadline, rx).await {
            Ok(Ok(Ok(reply))) => Some(reply),
            Ok(Ok(Err(e))) => {
                tracing::warn!(user_id = %owner.user_id, error = %e, "Craving coach failed");
                None
            }
            Ok(Err(_)) => {
                tracing::warn!(user_id = %owner.user_id, "Craving coach timed out");
                None
            }
            Err(_) => {
                tracing::warn!(
                    user_id = %owner.user_id,
                    deadline = ?self.deadline,
                    "Craving coach still running, returning flare without a reply"
                );
                None
            }
        }
    }

    async fn notify_responders(&self, flare: &Flare) {
        let hypes = match self.store.list_hypes(&flare.id).await {
            Ok(hypes) => hypes,
            Err(e) => {
                tracing::warn!(flare_id = %flare.id, error = %e, "Could not list responders");
                return;
            }
        };

        let responders: Vec<UserId> = hypes
            .into_iter()
            .map(|hype| hype.from_user_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if responders.is_empty() {
            return;
        }

        let notification = MessageComposer::held_the_line(flare);
        if let Err(e) = with_deadline(
            self.deadline,
            self.collaborators.push.send_batch(&responders, &notification),
        )
        .await
        {
            tracing::warn!(flare_id = %flare.id, error = %e, "Resolve notification failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::collaborators::{
        CannedCoach, CollaboratorResult, CravingCoach, InMemoryDirectory, RecordingPush,
    };
    use crate::config::ServerConfig;
    use crate::storage::{
        FlareStorage, HypeStorage, InMemorySosStore, PreferencesStorage, StorageResult,
    };
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use parc_types::{FastId, NotificationKind, TribeId};
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    struct Harness {
        engine: RescueEngine,
        clock: Arc<ManualClock>,
        dir: Arc<InMemoryDirectory>,
        push: Arc<RecordingPush>,
    }

    async fn harness(coach: CannedCoach) -> Harness {
        harness_with(
            Arc::new(coach),
            Arc::new(InMemorySosStore::new()),
            RescueConfig::default(),
        )
        .await
    }

    async fn harness_with(
        coach: Arc<dyn CravingCoach>,
        store: Arc<dyn SosStore>,
        config: RescueConfig,
    ) -> Harness {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap(),
        ));
        let dir = Arc::new(InMemoryDirectory::new());
        let push = Arc::new(RecordingPush::new());
        let collaborators = Collaborators {
            fasts: dir.clone(),
            tribes: dir.clone(),
            push: push.clone(),
            coach,
        };
        let engine = RescueEngine::new(store, collaborators, clock.clone(), &config);
        Harness {
            engine,
            clock,
            dir,
            push,
        }
    }

    /// Coach whose backend never answers
    struct StalledCoach;

    #[async_trait]
    impl CravingCoach for StalledCoach {
        async fn craving_help(&self, _user_id: &UserId, _description: &str) -> CollaboratorResult<String> {
            std::future::pending().await
        }
    }

    /// In-memory store with injectable write failures
    #[derive(Default)]
    struct FlakyStore {
        inner: InMemorySosStore,
        conflict_on_save: AtomicBool,
        anchor_failures: AtomicU32,
        anchor_attempts: AtomicU32,
    }

    impl SosStore for FlakyStore {
        fn backend(&self) -> &'static str {
            "flaky"
        }
    }

    #[async_trait]
    impl FlareStorage for FlakyStore {
        async fn save_flare(&self, flare: Flare) -> StorageResult<()> {
            if self.conflict_on_save.load(Ordering::SeqCst) {
                return Err(StorageError::Conflict("owner already has an active flare".into()));
            }
            self.inner.save_flare(flare).await
        }

        async fn find_flare(&self, id: &FlareId) -> StorageResult<Option<Flare>> {
            self.inner.find_flare(id).await
        }

        async fn find_active_by_owner(&self, owner_id: &UserId) -> StorageResult<Option<Flare>> {
            self.inner.find_active_by_owner(owner_id).await
        }

        async fn find_all_active(&self) -> StorageResult<Vec<Flare>> {
            self.inner.find_all_active().await
        }

        async fn update_status(
            &self,
            id: &FlareId,
            status: FlareStatus,
            resolved_at: DateTime<Utc>,
        ) -> StorageResult<Flare> {
            self.inner.update_status(id, status, resolved_at).await
        }

        async fn set_ai_fallback_fired(&self, id: &FlareId) -> StorageResult<()> {
            self.inner.set_ai_fallback_fired(id).await
        }
    }

    #[async_trait]
    impl HypeStorage for FlakyStore {
        async fn append_hype(&self, hype: HypeResponse) -> StorageResult<u64> {
            self.inner.append_hype(hype).await
        }

        async fn list_hypes(&self, flare_id: &FlareId) -> StorageResult<Vec<HypeResponse>> {
            self.inner.list_hypes(flare_id).await
        }

        async fn count_hypes_by_sender_since(
            &self,
            user_id: &UserId,
            since: DateTime<Utc>,
        ) -> StorageResult<u64> {
            self.inner.count_hypes_by_sender_since(user_id, since).await
        }
    }

    #[async_trait]
    impl PreferencesStorage for FlakyStore {
        async fn get_preferences(&self, user_id: &UserId) -> StorageResult<SosPreferences> {
            self.inner.get_preferences(user_id).await
        }

        async fn update_preference_flags(
            &self,
            user_id: &UserId,
            patch: PreferencesPatch,
        ) -> StorageResult<SosPreferences> {
            self.inner.update_preference_flags(user_id, patch).await
        }

        async fn record_last_flare_at(&self, user_id: &UserId, at: DateTime<Utc>) -> StorageResult<()> {
            self.anchor_attempts.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .anchor_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(StorageError::Connection("preferences table unavailable".into()));
            }
            self.inner.record_last_flare_at(user_id, at).await
        }
    }

    async fn tribe_of_three(h: &Harness) -> TribeId {
        let tribe = TribeId::new("t");
        for member in ["u", "v", "w"] {
            h.dir.add_member(&tribe, &UserId::new(member)).await;
        }
        h.dir
            .start_fast(&UserId::new("u"), FastId::new("f"), h.clock.now() - ChronoDuration::hours(4))
            .await;
        tribe
    }

    fn caller(id: &str) -> Caller {
        Caller::new(UserId::new(id), Some(id.to_uppercase()))
    }

    #[tokio::test]
    async fn test_raise_requires_active_fast() {
        let h = harness(CannedCoach::failing()).await;
        let err = h.engine.raise_flare(&caller("u"), "help").await.unwrap_err();
        assert!(matches!(err, RescueError::NoActiveFast));
    }

    #[tokio::test]
    async fn test_raise_rejects_oversized_description() {
        let h = harness(CannedCoach::failing()).await;
        let long = "x".repeat(parc_types::MAX_DESCRIPTION_CHARS + 1);
        let err = h.engine.raise_flare(&caller("u"), &long).await.unwrap_err();
        assert_eq!(err.kind(), "INVALID_INPUT");
    }

    #[tokio::test]
    async fn test_raise_returns_coach_reply_and_swallows_failures() {
        let h = harness(CannedCoach::replying("breathe")).await;
        let u = UserId::new("u");
        h.dir
            .start_fast(&u, FastId::new("f"), h.clock.now() - ChronoDuration::hours(3))
            .await;

        let outcome = h.engine.raise_flare(&caller("u"), "hungry  ").await.unwrap();
        assert_eq!(outcome.ai_reply.as_deref(), Some("breathe"));
        assert_eq!(outcome.flare.description, "hungry");
        assert_eq!(outcome.flare.whole_hours_fasted(), 3);

        let h = harness(CannedCoach::failing()).await;
        h.dir
            .start_fast(&u, FastId::new("f"), h.clock.now())
            .await;
        let outcome = h.engine.raise_flare(&caller("u"), "hungry").await.unwrap();
        assert!(outcome.ai_reply.is_none());
        assert!(outcome.flare.is_active());
    }

    #[tokio::test]
    async fn test_raise_records_cooldown_and_anonymity() {
        let h = harness(CannedCoach::failing()).await;
        let u = UserId::new("u");
        h.dir.start_fast(&u, FastId::new("f"), h.clock.now()).await;
        h.engine
            .update_preferences(
                &u,
                PreferencesPatch {
                    anonymous_by_default: Some(true),
                    notify_tribe_on_flare: None,
                },
            )
            .await
            .unwrap();

        let outcome = h.engine.raise_flare(&caller("u"), "").await.unwrap();
        assert!(outcome.flare.anonymous);

        let prefs = h.engine.preferences(&u).await.unwrap();
        assert_eq!(prefs.last_flare_at, Some(h.clock.now()));
    }

    #[tokio::test]
    async fn test_new_flare_expires_prior_active_one() {
        let h = harness(CannedCoach::failing()).await;
        let u = UserId::new("u");
        h.dir.start_fast(&u, FastId::new("f"), h.clock.now()).await;

        let first = h.engine.raise_flare(&caller("u"), "one").await.unwrap().flare;
        h.clock.advance(ChronoDuration::hours(25));
        let second = h.engine.raise_flare(&caller("u"), "two").await.unwrap().flare;

        let first = h.engine.get_flare(&first.id).await.unwrap();
        assert_eq!(first.status, FlareStatus::Expired);
        assert_eq!(
            h.engine.active_flare(&u).await.unwrap().map(|f| f.id),
            Some(second.id)
        );
    }

    #[tokio::test]
    async fn test_hype_validation_and_notification() {
        let h = harness(CannedCoach::failing()).await;
        let u = UserId::new("u");
        let tribe = TribeId::new("t");
        h.dir.add_member(&tribe, &u).await;
        h.dir.add_member(&tribe, &UserId::new("v")).await;
        h.dir.start_fast(&u, FastId::new("f"), h.clock.now()).await;

        let flare = h.engine.raise_flare(&caller("u"), "").await.unwrap().flare;

        let err = h
            .engine
            .send_hype(&flare.id, &caller("v"), "   ", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "INVALID_INPUT");

        let hype = h
            .engine
            .send_hype(&flare.id, &caller("v"), "💪", Some("  you got this  "))
            .await
            .unwrap();
        assert_eq!(hype.message.as_deref(), Some("you got this"));
        assert_eq!(hype.from_display_name, "V");

        h.engine.tasks().drain(Duration::from_secs(5)).await;
        let received = h.push.received_by(&u).await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].kind, NotificationKind::HypeReceived);
        assert_eq!(received[0].body, "you got this");

        let err = h
            .engine
            .send_hype(&FlareId::generate(), &caller("v"), "💪", None)
            .await
            .unwrap_err();
        assert!(matches!(err, RescueError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_resolve_rules() {
        let h = harness(CannedCoach::failing()).await;
        let u = UserId::new("u");
        h.dir.start_fast(&u, FastId::new("f"), h.clock.now()).await;
        let flare = h.engine.raise_flare(&caller("u"), "").await.unwrap().flare;

        let err = h
            .engine
            .resolve_flare(&flare.id, &UserId::new("v"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, RescueError::NotOwner));

        let failed = h.engine.resolve_flare(&flare.id, &u, false).await.unwrap();
        assert_eq!(failed.status, FlareStatus::Failed);
        assert!(failed.resolved_at.is_some());

        // Terminal states are sinks
        let again = h.engine.resolve_flare(&flare.id, &u, true).await.unwrap();
        assert_eq!(again.status, FlareStatus::Failed);

        let err = h
            .engine
            .send_hype(&flare.id, &caller("v"), "🔥", None)
            .await
            .unwrap_err();
        assert!(matches!(err, RescueError::FlareInactive));
        assert!(h.push.deliveries().await.is_empty());
    }

    #[tokio::test]
    async fn test_fanout_is_not_held_back_by_a_stalled_coach() {
        let config = RescueConfig {
            collaborator_timeout_secs: 1,
            ..Default::default()
        };
        let request_budget = std::time::Duration::from_secs(ServerConfig::default().request_timeout_secs);
        let h = harness_with(Arc::new(StalledCoach), Arc::new(InMemorySosStore::new()), config).await;
        tribe_of_three(&h).await;

        let started = std::time::Instant::now();
        let outcome = h.engine.raise_flare(&caller("u"), "shaky").await.unwrap();
        assert!(started.elapsed() < request_budget);
        assert!(outcome.ai_reply.is_none());
        assert!(outcome.flare.is_active());

        // The coach task is still pending; only the fan-out can finish
        h.engine.tasks().drain(Duration::from_millis(200)).await;
        let raised: Vec<_> = h
            .push
            .deliveries()
            .await
            .into_iter()
            .filter(|d| d.notification.kind == NotificationKind::FlareRaised)
            .collect();
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].recipients, vec![UserId::new("v"), UserId::new("w")]);
    }

    #[tokio::test]
    async fn test_opted_out_owner_alerts_nobody() {
        let h = harness(CannedCoach::failing()).await;
        tribe_of_three(&h).await;
        let u = UserId::new("u");
        h.engine
            .update_preferences(
                &u,
                PreferencesPatch {
                    notify_tribe_on_flare: Some(false),
                    anonymous_by_default: None,
                },
            )
            .await
            .unwrap();

        let flare = h.engine.raise_flare(&caller("u"), "").await.unwrap().flare;
        assert_eq!(flare.tribe_id, Some(TribeId::new("t")));

        h.engine.tasks().drain(Duration::from_secs(5)).await;
        assert!(h.push.deliveries().await.is_empty());
    }

    #[tokio::test]
    async fn test_anonymous_flare_alert_hides_the_owner() {
        let h = harness(CannedCoach::failing()).await;
        tribe_of_three(&h).await;
        let u = UserId::new("u");
        h.engine
            .update_preferences(
                &u,
                PreferencesPatch {
                    notify_tribe_on_flare: None,
                    anonymous_by_default: Some(true),
                },
            )
            .await
            .unwrap();

        let owner = Caller::new(u.clone(), Some("Priya".to_string()));
        h.engine.raise_flare(&owner, "").await.unwrap();
        h.engine.tasks().drain(Duration::from_secs(5)).await;

        let deliveries = h.push.deliveries().await;
        assert_eq!(deliveries.len(), 1);
        let alert = &deliveries[0].notification;
        assert_eq!(alert.kind, NotificationKind::FlareRaised);
        assert_eq!(alert.title, "Tribe Alert: A tribe member needs backup");
        assert!(!alert.body.contains("Priya"));
        assert!(alert.data.values().all(|value| !value.contains("Priya")));
        assert!(!deliveries[0].recipients.contains(&u));
    }

    #[tokio::test]
    async fn test_save_conflict_reports_cooldown() {
        let store = Arc::new(FlakyStore::default());
        store.conflict_on_save.store(true, Ordering::SeqCst);
        let h = harness_with(Arc::new(CannedCoach::failing()), store.clone(), RescueConfig::default()).await;
        h.dir.start_fast(&UserId::new("u"), FastId::new("f"), h.clock.now()).await;

        let err = h.engine.raise_flare(&caller("u"), "").await.unwrap_err();
        assert_eq!(err.kind(), "COOLDOWN_ACTIVE");
        assert!(matches!(
            err,
            RescueError::CooldownActive { remaining_secs } if remaining_secs == 24 * 3600
        ));
    }

    #[tokio::test]
    async fn test_cooldown_write_is_retried() {
        let store = Arc::new(FlakyStore::default());
        store.anchor_failures.store(2, Ordering::SeqCst);
        let h = harness_with(Arc::new(CannedCoach::failing()), store.clone(), RescueConfig::default()).await;
        let u = UserId::new("u");
        h.dir.start_fast(&u, FastId::new("f"), h.clock.now()).await;

        h.engine.raise_flare(&caller("u"), "").await.unwrap();
        assert_eq!(store.anchor_attempts.load(Ordering::SeqCst), 3);
        assert_eq!(
            h.engine.preferences(&u).await.unwrap().last_flare_at,
            Some(h.clock.now())
        );
    }

    #[tokio::test]
    async fn test_flare_survives_a_failed_cooldown_write() {
        let store = Arc::new(FlakyStore::default());
        store.anchor_failures.store(u32::MAX, Ordering::SeqCst);
        let h = harness_with(Arc::new(CannedCoach::failing()), store.clone(), RescueConfig::default()).await;
        let u = UserId::new("u");
        h.dir.start_fast(&u, FastId::new("f"), h.clock.now()).await;

        let flare = h.engine.raise_flare(&caller("u"), "").await.unwrap().flare;
        assert_eq!(store.anchor_attempts.load(Ordering::SeqCst), PREFERENCES_WRITE_ATTEMPTS);
        assert!(h.engine.get_flare(&flare.id).await.unwrap().is_active());
        assert!(h.engine.preferences(&u).await.unwrap().last_flare_at.is_none());

        // The missing anchor is covered by the ACTIVE flare itself
        h.clock.advance(ChronoDuration::minutes(1));
        let err = h.engine.raise_flare(&caller("u"), "").await.unwrap_err();
        assert_eq!(err.kind(), "COOLDOWN_ACTIVE");
    }

    #[tokio::test]
    async fn test_failed_flare_sends_no_resolve_notice() {
        let h = harness(CannedCoach::failing()).await;
        tribe_of_three(&h).await;
        let u = UserId::new("u");
        let v = UserId::new("v");

        let flare = h.engine.raise_flare(&caller("u"), "").await.unwrap().flare;
        h.engine
            .send_hype(&flare.id, &caller("v"), "🔥", None)
            .await
            .unwrap();
        h.engine.resolve_flare(&flare.id, &u, false).await.unwrap();
        h.engine.tasks().drain(Duration::from_secs(5)).await;

        let kinds: Vec<_> = h.push.received_by(&v).await.into_iter().map(|n| n.kind).collect();
        assert_eq!(kinds, vec![NotificationKind::FlareRaised]);
    }

    #[tokio::test]
    async fn test_preference_update_racing_a_raise_keeps_the_anchor() {
        let h = harness(CannedCoach::failing()).await;
        let u = UserId::new("u");
        h.dir.start_fast(&u, FastId::new("f"), h.clock.now()).await;
        let patch = PreferencesPatch {
            notify_tribe_on_flare: Some(false),
            anonymous_by_default: None,
        };

        let owner = caller("u");
        let (raised, updated) = tokio::join!(
            h.engine.raise_flare(&owner, ""),
            h.engine.update_preferences(&u, patch)
        );
        let first = raised.unwrap().flare;
        updated.unwrap();

        let prefs = h.engine.preferences(&u).await.unwrap();
        assert_eq!(prefs.last_flare_at, Some(h.clock.now()));
        assert!(!prefs.notify_tribe_on_flare);

        h.clock.advance(ChronoDuration::minutes(1));
        let err = h.engine.raise_flare(&caller("u"), "").await.unwrap_err();
        assert_eq!(err.kind(), "COOLDOWN_ACTIVE");
        assert!(h.engine.get_flare(&first.id).await.unwrap().is_active());
    }

    #[tokio::test]
    async fn test_racing_raises_keep_the_first_flare() {
        let h = harness(CannedCoach::failing()).await;
        let u = UserId::new("u");
        h.dir.start_fast(&u, FastId::new("f"), h.clock.now()).await;

        let (ca, cb) = (caller("u"), caller("u"));
        let (a, b) = tokio::join!(
            h.engine.raise_flare(&ca, "a"),
            h.engine.raise_flare(&cb, "b")
        );
        let outcomes = [a, b];
        let winners: Vec<_> = outcomes.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        assert!(outcomes
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| e.kind() == "COOLDOWN_ACTIVE"));

        let active = h.engine.active_flare(&u).await.unwrap().unwrap();
        assert_eq!(active.id, winners[0].flare.id);
    }

    #[test]
    fn test_caller_name_falls_back() {
        assert_eq!(Caller::new(UserId::new("u"), None).name(), UNKNOWN_SENDER_NAME);
        assert_eq!(Caller::new(UserId::new("u"), Some(" ".into())).name(), UNKNOWN_SENDER_NAME);
        assert_eq!(Caller::new(UserId::new("u"), Some("Ana".into())).name(), "Ana");
    }
}
