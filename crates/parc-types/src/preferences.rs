//! Per-user SOS preferences

use crate::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// SOS settings for a single user, created lazily with defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SosPreferences {
    pub user_id: UserId,

    /// Fan a new flare out to the user's tribe
    pub notify_tribe_on_flare: bool,

    /// Hide the user's name in fan-out messages
    pub anonymous_by_default: bool,

    /// Instant of the user's most recent flare (cooldown anchor)
    pub last_flare_at: Option<DateTime<Utc>>,
}

impl SosPreferences {
    pub fn defaults_for(user_id: UserId) -> Self {
        Self {
            user_id,
            notify_tribe_on_flare: true,
            anonymous_by_default: false,
            last_flare_at: None,
        }
    }
}

/// Partial update of the user-editable preference fields
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreferencesPatch {
    #[serde(default)]
    pub notify_tribe_on_flare: Option<bool>,
    #[serde(default)]
    pub anonymous_by_default: Option<bool>,
}

impl PreferencesPatch {
    pub fn apply(self, mut prefs: SosPreferences) -> SosPreferences {
        if let Some(notify) = self.notify_tribe_on_flare {
            prefs.notify_tribe_on_flare = notify;
        }
        if let Some(anonymous) = self.anonymous_by_default {
            prefs.anonymous_by_default = anonymous;
        }
        prefs
    }
}
