//! Hype responses

use crate::{FlareId, HypeId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display name used when the sender's name is unknown
pub const UNKNOWN_SENDER_NAME: &str = "A friend";

/// Encouragement sent by one user to another user's flare
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypeResponse {
    pub id: HypeId,
    pub flare_id: FlareId,
    pub from_user_id: UserId,
    /// Sender's display name at send time
    pub from_display_name: String,
    pub message: Option<String>,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

impl HypeResponse {
    pub fn new(
        flare_id: FlareId,
        from_user_id: UserId,
        from_display_name: Option<String>,
        emoji: String,
        message: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let from_display_name = from_display_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| UNKNOWN_SENDER_NAME.to_string());

        Self {
            id: HypeId::generate(),
            flare_id,
            from_user_id,
            from_display_name,
            message,
            emoji,
            created_at,
        }
    }
}
