//! Notification text for every PARC push
//!
//! All anonymity decisions live here; callers never build titles or bodies
//! themselves.

use parc_types::{Flare, HypeResponse, Notification, NotificationKind};

const ANONYMOUS_FLARE_TITLE: &str = "Tribe Alert: A tribe member needs backup";
const DEFAULT_HYPE_BODY: &str = "Someone in your tribe is cheering you on. You've got this!";

fn hours_phrase(hours: u64) -> String {
    if hours == 1 {
        "1 hour".to_string()
    } else {
        format!("{} hours", hours)
    }
}

/// Builds notifications from flare and hype snapshots
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageComposer;

impl MessageComposer {
    /// Tribe alert for a newly raised flare.
    ///
    /// Anonymous flares never mention `sender_name`.
    pub fn flare_raised(flare: &Flare, sender_name: &str) -> Notification {
        let hours = hours_phrase(flare.whole_hours_fasted());
        let (title, body) = if flare.anonymous {
            (
                ANONYMOUS_FLARE_TITLE.to_string(),
                format!(
                    "Someone is {} into their fast and fighting a craving. Send some hype!",
                    hours
                ),
            )
        } else {
            (
                format!("Tribe Alert: {} needs backup", sender_name),
                format!(
                    "{} is {} into their fast and fighting a craving. Send some hype!",
                    sender_name, hours
                ),
            )
        };

        Notification::for_flare(NotificationKind::FlareRaised, &flare.id, title, body)
    }

    /// Unicast to the flare owner when a hype arrives
    pub fn hype_received(flare: &Flare, hype: &HypeResponse) -> Notification {
        let title = format!("{} sent you hype {}", hype.from_display_name, hype.emoji);
        let body = hype
            .message
            .clone()
            .unwrap_or_else(|| DEFAULT_HYPE_BODY.to_string());

        Notification::for_flare(NotificationKind::HypeReceived, &flare.id, title, body)
            .with_data("hype_id", hype.id.as_uuid().to_string())
    }

    /// Multicast to responders when the owner made it through
    pub fn held_the_line(flare: &Flare) -> Notification {
        let body = format!(
            "The fast you cheered on held the line at {}. Your hype helped.",
            hours_phrase(flare.whole_hours_fasted())
        );
        Notification::for_flare(
            NotificationKind::FlareResolved,
            &flare.id,
            "They held the line!",
            body,
        )
    }

    /// Unicast to the owner when nobody answered within the grace window
    pub fn ai_fallback(flare: &Flare) -> Notification {
        let body = format!(
            "You're {} in. Take a slow breath, drink a glass of water, and give it ten more \
             minutes. The craving will pass.",
            hours_phrase(flare.whole_hours_fasted())
        );
        Notification::for_flare(
            NotificationKind::AiFallback,
            &flare.id,
            "Still fighting that craving?",
            body,
        )
    }
}
