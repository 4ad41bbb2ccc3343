//! Escalation sweeper
//!
//! One cooperative task per process. Multi-instance deployments need an
//! external single-writer lease around [`EscalationSweeper::run`].

use crate::clock::Clock;
use crate::collaborators::{with_deadline, PushDelivery};
use crate::config::RescueConfig;
use crate::error::StorageError;
use crate::rescue::MessageComposer;
use crate::storage::SosStore;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parc_types::{Flare, FlareStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

/// Counters for one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// ACTIVE flares looked at
    pub examined: usize,
    /// Fallback pushes attempted
    pub escalated: usize,
    /// Flags set without a push because someone already answered
    pub silenced: usize,
    /// Flares moved to EXPIRED by the janitor
    pub expired: usize,
    pub errors: usize,
}

enum Escalation {
    Skipped,
    Silenced,
    Escalated,
}

/// Periodic task that fires the AI fallback once per unanswered flare
pub struct EscalationSweeper {
    store: Arc<dyn SosStore>,
    push: Arc<dyn PushDelivery>,
    clock: Arc<dyn Clock>,
    grace_window: ChronoDuration,
    expire_after: Option<ChronoDuration>,
    tick: Duration,
    deadline: Duration,
}

impl EscalationSweeper {
    pub fn new(
        store: Arc<dyn SosStore>,
        push: Arc<dyn PushDelivery>,
        clock: Arc<dyn Clock>,
        config: &RescueConfig,
    ) -> Self {
        Self {
            store,
            push,
            clock,
            grace_window: config.grace_window(),
            expire_after: config.expire_after(),
            tick: config.sweep_interval(),
            deadline: config.collaborator_timeout(),
        }
    }

    /// Run until `shutdown` flips to `true`.
    ///
    /// A sweep in progress finishes before the loop exits.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval = ?self.tick, "Escalation sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.sweep_once().await;
                    if report.escalated + report.silenced + report.expired + report.errors > 0 {
                        tracing::info!(
                            examined = report.examined,
                            escalated = report.escalated,
                            silenced = report.silenced,
                            expired = report.expired,
                            errors = report.errors,
                            "Sweep complete"
                        );
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }

            if *shutdown.borrow() {
                break;
            }
        }

        tracing::info!("Escalation sweeper stopped");
    }

    /// One pass over every ACTIVE flare
    pub async fn sweep_once(&self) -> SweepReport {
        let mut report = SweepReport::default();

        let active = match self.store.find_all_active().await {
            Ok(active) => active,
            Err(e) => {
                tracing::error!(error = %e, "Sweep could not list active flares");
                report.errors += 1;
                return report;
            }
        };

        let now = self.clock.now();
        for flare in active {
            report.examined += 1;

            if self.is_stale(&flare, now) {
                match self.expire(&flare, now).await {
                    Ok(true) => report.expired += 1,
                    Ok(false) => {}
                    Err(e) => {
                        report.errors += 1;
                        tracing::warn!(flare_id = %flare.id, error = %e, "Could not expire flare");
                    }
                }
                continue;
            }

            if !flare.needs_escalation(now, self.grace_window) {
                continue;
            }

            match self.escalate(&flare, now).await {
                Ok(Escalation::Escalated) => report.escalated += 1,
                Ok(Escalation::Silenced) => report.silenced += 1,
                Ok(Escalation::Skipped) => {}
                Err(e) => {
                    report.errors += 1;
                    tracing::warn!(flare_id = %flare.id, error = %e, "Escalation failed");
                }
            }
        }

        report
    }

    fn is_stale(&self, flare: &Flare, now: DateTime<Utc>) -> bool {
        self.expire_after
            .is_some_and(|max_age| now - flare.created_at >= max_age)
    }

    async fn expire(&self, flare: &Flare, now: DateTime<Utc>) -> Result<bool, StorageError> {
        match self
            .store
            .update_status(&flare.id, FlareStatus::Expired, now)
            .await
        {
            Ok(_) => {
                tracing::info!(flare_id = %flare.id, "Flare expired");
                Ok(true)
            }
            Err(StorageError::Conflict(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Claim the flag first, then push; a failed push is never retried.
    async fn escalate(&self, candidate: &Flare, now: DateTime<Utc>) -> Result<Escalation, StorageError> {
        // Re-read so a concurrent resolve wins
        let Some(flare) = self.store.find_flare(&candidate.id).await? else {
            return Ok(Escalation::Skipped);
        };
        if !flare.needs_escalation(now, self.grace_window) {
            return Ok(Escalation::Skipped);
        }

        let answered = !self.store.list_hypes(&flare.id).await?.is_empty();

        match self.store.set_ai_fallback_fired(&flare.id).await {
            Ok(()) => {}
            Err(StorageError::AlreadySet(_)) | Err(StorageError::Conflict(_)) => {
                return Ok(Escalation::Skipped)
            }
            Err(e) => return Err(e),
        }

        if answered {
            tracing::debug!(flare_id = %flare.id, "Grace window passed with hypes, fallback silenced");
            return Ok(Escalation::Silenced);
        }

        let notification = MessageComposer::ai_fallback(&flare);
        match with_deadline(self.deadline, self.push.send(&flare.owner_id, &notification)).await {
            Ok(()) => tracing::info!(flare_id = %flare.id, owner_id = %flare.owner_id, "AI fallback sent"),
            Err(e) => tracing::warn!(flare_id = %flare.id, error = %e, "AI fallback push failed"),
        }
        Ok(Escalation::Escalated)
    }
}
