//! Push notification payloads
//!
//! PARC only produces a `kind` plus a flat data map; deep-link URL
//! construction belongs to the push collaborator.

use crate::FlareId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind tag carried by every PARC notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    FlareRaised,
    HypeReceived,
    FlareResolved,
    AiFallback,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::FlareRaised => "FLARE_RAISED",
            NotificationKind::HypeReceived => "HYPE_RECEIVED",
            NotificationKind::FlareResolved => "FLARE_RESOLVED",
            NotificationKind::AiFallback => "AI_FALLBACK",
        }
    }
}

/// A push notification ready for delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub kind: NotificationKind,
    pub data: BTreeMap<String, String>,
}

impl Notification {
    /// Build a notification about `flare_id`, tagging the payload with the
    /// flare id and a deep-link hint.
    pub fn for_flare(
        kind: NotificationKind,
        flare_id: &FlareId,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        let mut data = BTreeMap::new();
        data.insert("flare_id".to_string(), flare_id.as_uuid().to_string());
        data.insert("kind".to_string(), kind.as_str().to_string());
        data.insert("deep_link".to_string(), "sos_flare".to_string());

        Self {
            title: title.into(),
            body: body.into(),
            kind,
            data,
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}
