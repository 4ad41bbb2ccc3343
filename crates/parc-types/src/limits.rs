//! Rescue limits and input normalization
//!
//! Constants and pure functions shared by the daemon and its clients.

use thiserror::Error;

/// Minimum interval between two flares by the same user (24 hours)
pub const DEFAULT_COOLDOWN_SECS: u64 = 24 * 60 * 60;

/// Time a flare waits for human hype before the AI fallback (10 minutes)
pub const DEFAULT_GRACE_WINDOW_SECS: u64 = 10 * 60;

/// Maximum flare description length, in code points
pub const MAX_DESCRIPTION_CHARS: usize = 1024;

/// Maximum hype message length, in code points
pub const MAX_MESSAGE_CHARS: usize = 512;

/// Maximum hype emoji length, in code points
pub const MAX_EMOJI_CHARS: usize = 16;

/// Cap applied when a flare has no tribe (treated as unbounded size)
const UNSCOPED_DAILY_CAP: u32 = 5;

/// Input validation failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("description exceeds {max} characters (got {actual})")]
    DescriptionTooLong { max: usize, actual: usize },

    #[error("emoji is required")]
    EmptyEmoji,

    #[error("emoji exceeds {max} characters (got {actual})")]
    EmojiTooLong { max: usize, actual: usize },
}

/// Daily hype cap for a sender reacting inside a tribe of `tribe_size` members.
///
/// | Tribe size     | Cap |
/// |----------------|-----|
/// | N <= 10        | 100 |
/// | 10 < N <= 50   | 20  |
/// | 50 < N <= 200  | 10  |
/// | N > 200 / none | 5   |
pub fn daily_hype_cap(tribe_size: Option<u64>) -> u32 {
    match tribe_size {
        Some(n) if n <= 10 => 100,
        Some(n) if n <= 50 => 20,
        Some(n) if n <= 200 => 10,
        _ => UNSCOPED_DAILY_CAP,
    }
}

/// Trim trailing whitespace and enforce the description bound.
pub fn normalize_description(raw: &str) -> Result<String, InputError> {
    let trimmed = raw.trim_end();
    let actual = trimmed.chars().count();
    if actual > MAX_DESCRIPTION_CHARS {
        return Err(InputError::DescriptionTooLong {
            max: MAX_DESCRIPTION_CHARS,
            actual,
        });
    }
    Ok(trimmed.to_string())
}

/// Trim a hype message and cut it to the message bound.
///
/// Blank messages collapse to `None`.
pub fn normalize_message(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        return None;
    }
    let bounded: String = trimmed.chars().take(MAX_MESSAGE_CHARS).collect();
    Some(bounded.trim_end().to_string())
}

/// Trim a hype emoji and require it to be short and non-empty.
pub fn normalize_emoji(raw: &str) -> Result<String, InputError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(InputError::EmptyEmoji);
    }
    let actual = trimmed.chars().count();
    if actual > MAX_EMOJI_CHARS {
        return Err(InputError::EmojiTooLong {
            max: MAX_EMOJI_CHARS,
            actual,
        });
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_cap_tier_boundaries() {
        assert_eq!(daily_hype_cap(Some(0)), 100);
        assert_eq!(daily_hype_cap(Some(10)), 100);
        assert_eq!(daily_hype_cap(Some(11)), 20);
        assert_eq!(daily_hype_cap(Some(50)), 20);
        assert_eq!(daily_hype_cap(Some(51)), 10);
        assert_eq!(daily_hype_cap(Some(200)), 10);
        assert_eq!(daily_hype_cap(Some(201)), 5);
        assert_eq!(daily_hype_cap(None), 5);
    }

    #[test]
    fn test_description_trailing_whitespace_trimmed() {
        assert_eq!(normalize_description("  sugar urge \n\t").unwrap(), "  sugar urge");
    }

    #[test]
    fn test_description_bound_counts_code_points() {
        let exact = "é".repeat(MAX_DESCRIPTION_CHARS);
        assert!(normalize_description(&exact).is_ok());

        let over = "é".repeat(MAX_DESCRIPTION_CHARS + 1);
        assert_eq!(
            normalize_description(&over),
            Err(InputError::DescriptionTooLong {
                max: MAX_DESCRIPTION_CHARS,
                actual: MAX_DESCRIPTION_CHARS + 1
            })
        );
    }

    #[test]
    fn test_message_normalization() {
        assert_eq!(normalize_message(None), None);
        assert_eq!(normalize_message(Some("   ")), None);
        assert_eq!(normalize_message(Some(" you got this ")).as_deref(), Some("you got this"));

        let long = "x".repeat(MAX_MESSAGE_CHARS + 40);
        assert_eq!(
            normalize_message(Some(&long)).unwrap().chars().count(),
            MAX_MESSAGE_CHARS
        );
    }

    #[test]
    fn test_emoji_validation() {
        assert_eq!(normalize_emoji(" 🔥 ").unwrap(), "🔥");
        assert_eq!(normalize_emoji(""), Err(InputError::EmptyEmoji));
        assert!(matches!(
            normalize_emoji(&"🔥".repeat(17)),
            Err(InputError::EmojiTooLong { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_cap_never_increases_with_size(a in 0u64..10_000, b in 0u64..10_000) {
            let (small, large) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(daily_hype_cap(Some(small)) >= daily_hype_cap(Some(large)));
            prop_assert!(daily_hype_cap(Some(large)) >= daily_hype_cap(None));
        }

        #[test]
        fn prop_message_is_bounded_and_trimmed(raw in ".{0,700}") {
            if let Some(msg) = normalize_message(Some(&raw)) {
                prop_assert!(msg.chars().count() <= MAX_MESSAGE_CHARS);
                prop_assert!(!msg.is_empty());
                prop_assert_eq!(msg.trim(), msg.as_str());
            }
        }

        #[test]
        fn prop_description_never_ends_in_whitespace(raw in ".{0,300}") {
            let desc = normalize_description(&raw).unwrap();
            prop_assert_eq!(desc.trim_end(), desc.as_str());
        }
    }
}
