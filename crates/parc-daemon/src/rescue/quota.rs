//! Per-sender daily hype quota

use crate::clock::{start_of_day_utc, Clock};
use crate::collaborators::{with_deadline, TribeDirectory};
use crate::error::RescueResult;
use crate::storage::SosStore;
use parc_types::{daily_hype_cap, TribeId, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// A sender's hype budget for the current UTC day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub used: u64,
    pub cap: u32,
    pub remaining: u64,
}

impl QuotaStatus {
    pub fn new(used: u64, cap: u32) -> Self {
        Self {
            used,
            cap,
            remaining: u64::from(cap).saturating_sub(used),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= u64::from(self.cap)
    }
}

/// Computes hype budgets from the store and live tribe size
///
/// The check and the later insert are not serialized; two concurrent sends
/// that both observe `cap - 1` may both succeed.
#[derive(Clone)]
pub struct HypeQuota {
    store: Arc<dyn SosStore>,
    tribes: Arc<dyn TribeDirectory>,
    clock: Arc<dyn Clock>,
    deadline: Duration,
}

impl HypeQuota {
    pub fn new(
        store: Arc<dyn SosStore>,
        tribes: Arc<dyn TribeDirectory>,
        clock: Arc<dyn Clock>,
        deadline: Duration,
    ) -> Self {
        Self {
            store,
            tribes,
            clock,
            deadline,
        }
    }

    /// Budget of `sender` when reacting to a flare scoped to `tribe_id`
    pub async fn status(&self, sender: &UserId, tribe_id: Option<&TribeId>) -> RescueResult<QuotaStatus> {
        let tribe_size = match tribe_id {
            Some(tribe_id) => Some(with_deadline(self.deadline, self.tribes.size_of(tribe_id)).await?),
            None => None,
        };
        let cap = daily_hype_cap(tribe_size);

        let since = start_of_day_utc(self.clock.now());
        let used = self.store.count_hypes_by_sender_since(sender, since).await?;

        Ok(QuotaStatus::new(used, cap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::collaborators::InMemoryDirectory;
    use crate::storage::{FlareStorage, HypeStorage, InMemorySosStore};
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use parc_types::{FastId, Flare, HypeResponse};

    #[test]
    fn test_status_remaining() {
        let s = QuotaStatus::new(9, 10);
        assert_eq!(s.remaining, 1);
        assert!(!s.is_exhausted());

        let s = QuotaStatus::new(12, 10);
        assert_eq!(s.remaining, 0);
        assert!(s.is_exhausted());
    }

    #[tokio::test]
    async fn test_status_counts_todays_hypes_only() {
        let start = Utc.with_ymd_and_hms(2026, 5, 1, 23, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let store = Arc::new(InMemorySosStore::new());
        let dir = Arc::new(InMemoryDirectory::new());
        let tribe = TribeId::new("t");
        for i in 0..12 {
            dir.add_member(&tribe, &UserId::new(format!("m{}", i))).await;
        }

        let flare = Flare::new(
            UserId::new("m0"),
            FastId::new("f"),
            Some(tribe.clone()),
            String::new(),
            3.0,
            false,
            start,
        );
        store.save_flare(flare.clone()).await.unwrap();

        let sender = UserId::new("m1");
        for _ in 0..3 {
            let hype = HypeResponse::new(flare.id, sender.clone(), None, "🔥".into(), None, start);
            store.append_hype(hype).await.unwrap();
        }

        let quota = HypeQuota::new(store.clone(), dir.clone(), clock.clone(), Duration::from_secs(1));
        let status = quota.status(&sender, Some(&tribe)).await.unwrap();
        assert_eq!(status, QuotaStatus::new(3, 20));

        clock.advance(ChronoDuration::hours(1));
        let status = quota.status(&sender, Some(&tribe)).await.unwrap();
        assert_eq!(status, QuotaStatus::new(0, 20));

        let status = quota.status(&sender, None).await.unwrap();
        assert_eq!(status.cap, 5);
    }
}
