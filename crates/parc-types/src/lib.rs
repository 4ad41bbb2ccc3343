//! PARC Types - Core types for the Peer-Assist Rescue Core
//!
//! PARC lets a user who is struggling mid-fast raise an SOS flare to their
//! tribe, collect encouragement ("hype") from other members, and receive an
//! automated AI fallback if nobody answers within the grace window.
//!
//! ## Key Concepts
//!
//! - **Flare**: durable record of a request for mid-fast support
//! - **HypeResponse**: encouragement sent to a flare by another user
//! - **SosPreferences**: per-user settings plus the cooldown anchor
//! - **Notification**: push payload handed to the delivery collaborator
//! - **Limits**: cooldown, grace window, input bounds, and tribe-size quota tiers

#![deny(unsafe_code)]

pub mod flare;
pub mod hype;
pub mod ids;
pub mod limits;
pub mod notification;
pub mod preferences;

// Re-export main types
pub use flare::{Flare, FlareStatus};
pub use hype::{HypeResponse, UNKNOWN_SENDER_NAME};
pub use ids::{FastId, FlareId, HypeId, IdParseError, TribeId, UserId};
pub use limits::{
    daily_hype_cap, normalize_description, normalize_emoji, normalize_message, InputError,
    DEFAULT_COOLDOWN_SECS, DEFAULT_GRACE_WINDOW_SECS, MAX_DESCRIPTION_CHARS, MAX_EMOJI_CHARS,
    MAX_MESSAGE_CHARS,
};
pub use notification::{Notification, NotificationKind};
pub use preferences::{PreferencesPatch, SosPreferences};
