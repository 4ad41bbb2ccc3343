//! Tribe fan-out for new flares

use super::compose::MessageComposer;
use crate::collaborators::{with_deadline, PushDelivery, TribeDirectory};
use futures::future::join_all;
use parc_types::{Flare, UserId};
use std::sync::Arc;
use std::time::Duration;

/// Summary of one fan-out run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub recipients: usize,
    pub batches: usize,
    pub failed_batches: usize,
}

/// Delivers a flare alert to every tribe member except the sender
///
/// Push failures are logged and dropped; the flare is already durable.
#[derive(Clone)]
pub struct FanoutDispatcher {
    tribes: Arc<dyn TribeDirectory>,
    push: Arc<dyn PushDelivery>,
    batch_size: usize,
    deadline: Duration,
}

impl FanoutDispatcher {
    pub fn new(
        tribes: Arc<dyn TribeDirectory>,
        push: Arc<dyn PushDelivery>,
        batch_size: usize,
        deadline: Duration,
    ) -> Self {
        Self {
            tribes,
            push,
            batch_size: batch_size.max(1),
            deadline,
        }
    }

    pub async fn dispatch(&self, flare: &Flare, sender_name: &str) -> FanoutReport {
        let Some(tribe_id) = flare.tribe_id.as_ref() else {
            return FanoutReport::default();
        };

        let members = match with_deadline(self.deadline, self.tribes.members_of(tribe_id)).await {
            Ok(members) => members,
            Err(e) => {
                tracing::warn!(
                    flare_id = %flare.id,
                    tribe_id = %tribe_id,
                    error = %e,
                    "Fan-out skipped, tribe lookup failed"
                );
                return FanoutReport::default();
            }
        };

        let recipients: Vec<UserId> = members
            .into_iter()
            .filter(|member| member != &flare.owner_id)
            .collect();
        if recipients.is_empty() {
            return FanoutReport::default();
        }

        let notification = MessageComposer::flare_raised(flare, sender_name);
        let sends = recipients.chunks(self.batch_size).map(|batch| {
            with_deadline(self.deadline, self.push.send_batch(batch, &notification))
        });
        let results = join_all(sends).await;

        let mut report = FanoutReport {
            recipients: recipients.len(),
            batches: results.len(),
            failed_batches: 0,
        };
        for result in results {
            if let Err(e) = result {
                report.failed_batches += 1;
                tracing::warn!(flare_id = %flare.id, error = %e, "Fan-out batch failed");
            }
        }

        tracing::info!(
            flare_id = %flare.id,
            tribe_id = %tribe_id,
            recipients = report.recipients,
            batches = report.batches,
            failed = report.failed_batches,
            "Flare fan-out complete"
        );
        report
    }
}
