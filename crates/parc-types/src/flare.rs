//! SOS flare types
//!
//! A Flare is raised by a user mid-fast and stays ACTIVE until the owner
//! resolves it (RESCUED / FAILED) or the janitor expires it (EXPIRED).
//! Terminal states are sinks.

use crate::{FastId, FlareId, TribeId, UserId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A durable request for mid-fast support
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flare {
    /// Unique flare identifier
    pub id: FlareId,

    /// User who raised the flare
    pub owner_id: UserId,

    /// Fast that was running when the flare was raised
    pub fast_id: FastId,

    /// Tribe the flare is scoped to, if any
    pub tribe_id: Option<TribeId>,

    /// Free-text description (trimmed, length-bounded)
    pub description: String,

    /// Hours fasted at creation time
    pub hours_fasted: f64,

    /// Lifecycle status
    pub status: FlareStatus,

    /// Number of hype responses received
    pub hype_count: u64,

    /// Whether fan-out messages hide the owner's name
    pub anonymous: bool,

    /// Whether the sweeper already handled the grace window
    pub ai_fallback_fired: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Set when the flare leaves ACTIVE
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Flare {
    /// Build a new ACTIVE flare with zero hypes.
    pub fn new(
        owner_id: UserId,
        fast_id: FastId,
        tribe_id: Option<TribeId>,
        description: String,
        hours_fasted: f64,
        anonymous: bool,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: FlareId::generate(),
            owner_id,
            fast_id,
            tribe_id,
            description,
            hours_fasted: hours_fasted.max(0.0),
            status: FlareStatus::Active,
            hype_count: 0,
            anonymous,
            ai_fallback_fired: false,
            created_at,
            resolved_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Integer floor of the hours fasted, as shown in notifications.
    pub fn whole_hours_fasted(&self) -> u64 {
        if self.hours_fasted.is_finite() && self.hours_fasted > 0.0 {
            self.hours_fasted.floor() as u64
        } else {
            0
        }
    }

    /// Whether at least `grace` has elapsed since creation at instant `now`.
    pub fn grace_elapsed(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        now - self.created_at >= grace
    }

    /// Whether the sweeper should consider this flare for the AI fallback.
    pub fn needs_escalation(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        self.is_active() && !self.ai_fallback_fired && self.grace_elapsed(now, grace)
    }
}

/// Flare lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlareStatus {
    /// Waiting for help
    Active,

    /// Owner reported they made it through
    Rescued,

    /// Owner reported they broke the fast
    Failed,

    /// Closed without an owner decision
    Expired,
}

impl FlareStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, FlareStatus::Active)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// Terminal status for an owner resolution.
    pub fn from_outcome(survived: bool) -> Self {
        if survived {
            FlareStatus::Rescued
        } else {
            FlareStatus::Failed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FlareStatus::Active => "ACTIVE",
            FlareStatus::Rescued => "RESCUED",
            FlareStatus::Failed => "FAILED",
            FlareStatus::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for FlareStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlareStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(FlareStatus::Active),
            "RESCUED" => Ok(FlareStatus::Rescued),
            "FAILED" => Ok(FlareStatus::Failed),
            "EXPIRED" => Ok(FlareStatus::Expired),
            other => Err(format!("unknown flare status: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flare_at(created_at: DateTime<Utc>) -> Flare {
        Flare::new(
            UserId::new("u"),
            FastId::new("fast-1"),
            None,
            "sugar urge".to_string(),
            5.7,
            false,
            created_at,
        )
    }

    #[test]
    fn test_new_flare_is_active() {
        let flare = flare_at(Utc::now());
        assert!(flare.is_active());
        assert_eq!(flare.hype_count, 0);
        assert!(!flare.ai_fallback_fired);
        assert!(flare.resolved_at.is_none());
        assert_eq!(flare.whole_hours_fasted(), 5);
    }

    #[test]
    fn test_negative_hours_clamped() {
        let mut flare = flare_at(Utc::now());
        flare.hours_fasted = -3.0;
        assert_eq!(flare.whole_hours_fasted(), 0);

        let clamped = Flare::new(
            UserId::new("u"),
            FastId::new("f"),
            None,
            String::new(),
            -1.0,
            false,
            Utc::now(),
        );
        assert_eq!(clamped.hours_fasted, 0.0);
    }

    #[test]
    fn test_grace_boundary() {
        let t0 = Utc::now();
        let flare = flare_at(t0);
        let grace = Duration::minutes(10);

        assert!(!flare.needs_escalation(t0 + grace - Duration::milliseconds(1), grace));
        assert!(flare.needs_escalation(t0 + grace, grace));
    }

    #[test]
    fn test_status_round_trip_strings() {
        for status in [
            FlareStatus::Active,
            FlareStatus::Rescued,
            FlareStatus::Failed,
            FlareStatus::Expired,
        ] {
            assert_eq!(status.as_str().parse::<FlareStatus>().unwrap(), status);
        }
        assert!("PENDING".parse::<FlareStatus>().is_err());
    }

    #[test]
    fn test_status_serde_is_screaming_snake() {
        let json = serde_json::to_string(&FlareStatus::Rescued).unwrap();
        assert_eq!(json, "\"RESCUED\"");
    }

    #[test]
    fn test_outcome_mapping() {
        assert_eq!(FlareStatus::from_outcome(true), FlareStatus::Rescued);
        assert_eq!(FlareStatus::from_outcome(false), FlareStatus::Failed);
        assert!(FlareStatus::Expired.is_terminal());
    }
}
