//! Flare cooldown gate

use chrono::{DateTime, Duration, Utc};
use parc_types::SosPreferences;

/// Outcome of a cooldown check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownDecision {
    Allow,
    /// Denied; `remaining_secs` is rounded up to whole seconds
    Deny { remaining_secs: u64 },
}

impl CooldownDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, CooldownDecision::Allow)
    }
}

/// Rejects a new flare while the previous one is younger than the cooldown
#[derive(Debug, Clone, Copy)]
pub struct CooldownGate {
    cooldown: Duration,
}

impl CooldownGate {
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Check `preferences.last_flare_at` against `now`.
    ///
    /// A raise at exactly `last_flare_at + cooldown` is allowed.
    pub fn check(&self, preferences: &SosPreferences, now: DateTime<Utc>) -> CooldownDecision {
        self.check_since(preferences.last_flare_at, now)
    }

    /// Same rule against an arbitrary anchor
    pub fn check_since(&self, last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> CooldownDecision {
        let Some(last) = last else {
            return CooldownDecision::Allow;
        };

        let remaining = last + self.cooldown - now;
        if remaining <= Duration::zero() {
            return CooldownDecision::Allow;
        }

        let millis = remaining.num_milliseconds().max(1);
        CooldownDecision::Deny {
            remaining_secs: ((millis + 999) / 1000) as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use parc_types::UserId;
    use proptest::prelude::*;

    fn prefs(last: Option<DateTime<Utc>>) -> SosPreferences {
        SosPreferences {
            last_flare_at: last,
            ..SosPreferences::defaults_for(UserId::new("u"))
        }
    }

    #[test]
    fn test_first_flare_is_allowed() {
        let gate = CooldownGate::new(Duration::hours(24));
        assert!(gate.check(&prefs(None), Utc::now()).is_allowed());
    }

    #[test]
    fn test_cooldown_boundary() {
        let gate = CooldownGate::new(Duration::hours(24));
        let t0 = Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap();
        let p = prefs(Some(t0));

        assert_eq!(gate.check(&p, t0 + Duration::hours(24)), CooldownDecision::Allow);
        assert_eq!(
            gate.check(&p, t0 + Duration::hours(24) - Duration::milliseconds(1)),
            CooldownDecision::Deny { remaining_secs: 1 }
        );
    }

    #[test]
    fn test_remaining_rounds_up() {
        let gate = CooldownGate::new(Duration::hours(24));
        let t0 = Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap();
        let decision = gate.check(&prefs(Some(t0)), t0 + Duration::hours(23) + Duration::minutes(59));
        assert_eq!(decision, CooldownDecision::Deny { remaining_secs: 60 });
    }

    #[test]
    fn test_check_since_prior_flare() {
        let gate = CooldownGate::new(Duration::hours(24));
        let t0 = Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap();

        assert!(gate.check_since(None, t0).is_allowed());
        assert_eq!(
            gate.check_since(Some(t0), t0),
            CooldownDecision::Deny { remaining_secs: 24 * 3600 }
        );
        assert!(gate.check_since(Some(t0), t0 + Duration::hours(25)).is_allowed());
    }

    proptest! {
        #[test]
        fn deny_exactly_inside_the_window(cooldown_secs in 1i64..200_000, elapsed_ms in 0i64..400_000_000) {
            let gate = CooldownGate::new(Duration::seconds(cooldown_secs));
            let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
            let decision = gate.check(&prefs(Some(t0)), t0 + Duration::milliseconds(elapsed_ms));

            if elapsed_ms >= cooldown_secs * 1000 {
                prop_assert_eq!(decision, CooldownDecision::Allow);
            } else {
                match decision {
                    CooldownDecision::Deny { remaining_secs } => {
                        prop_assert!(remaining_secs >= 1);
                        prop_assert!(remaining_secs as i64 <= cooldown_secs);
                    }
                    CooldownDecision::Allow => prop_assert!(false, "allowed inside cooldown"),
                }
            }
        }
    }
}
