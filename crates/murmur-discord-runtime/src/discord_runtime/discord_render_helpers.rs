//! Canned replies, reply routing, and outbound message rendering.

use std::sync::atomic::{AtomicU64, Ordering};

use super::ReplyRoute;
use crate::discord_helpers::truncate_for_error;

static DIE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Rolls a six-sided die from a mixed atomic counter, so tests stay
/// deterministic in range without pulling in a random number generator.
fn roll_die() -> u64 {
    let seed = DIE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mixed = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).rotate_left(23);
    1 + mixed % 6
}

/// Short-circuit replies answered locally without an assistant round-trip.
pub(super) fn canned_reply(text: &str) -> Option<String> {
    let lowered = text.trim().to_lowercase();
    if lowered.is_empty() {
        return Some("Well, you're awfully silent...".to_string());
    }
    if lowered.contains("hello") {
        return Some("Hello there!".to_string());
    }
    if lowered.contains("how are you") {
        return Some("Good, thanks!".to_string());
    }
    if lowered.contains("bye") {
        return Some("See you!".to_string());
    }
    if lowered.contains("roll dice") {
        return Some(format!("You rolled: {}", roll_die()));
    }
    None
}

/// A leading `?` routes the reply to the author's DM instead of the channel.
pub(super) fn split_private_prefix(text: &str) -> (ReplyRoute, &str) {
    let trimmed = text.trim();
    match trimmed.strip_prefix('?') {
        Some(rest) => (ReplyRoute::DirectMessage, rest),
        None => (ReplyRoute::Channel, trimmed),
    }
}

pub(super) fn render_relay_error_message(error: &anyhow::Error) -> String {
    format!(
        "Murmur could not answer that message: {}",
        truncate_for_error(&format!("{error:#}"), 320)
    )
}

pub(super) fn render_summary_prompt(messages: &[String]) -> String {
    let mut prompt = String::from("Please summarize the following messages:\n");
    prompt.push_str(&messages.join("\n"));
    prompt
}

#[cfg(test)]
mod tests {
    use super::super::ReplyRoute;
    use super::{canned_reply, render_summary_prompt, split_private_prefix};

    #[test]
    fn unit_canned_replies_match_known_phrases_case_insensitively() {
        assert_eq!(canned_reply("HeLLo world"), Some("Hello there!".to_string()));
        assert_eq!(
            canned_reply("so, how are you today?"),
            Some("Good, thanks!".to_string())
        );
        assert_eq!(canned_reply("ok bye now"), Some("See you!".to_string()));
        assert_eq!(
            canned_reply("   "),
            Some("Well, you're awfully silent...".to_string())
        );
        assert_eq!(canned_reply("what is rust?"), None);
    }

    #[test]
    fn unit_roll_dice_reply_stays_in_range() {
        for _ in 0..32 {
            let reply = canned_reply("roll dice").expect("dice reply");
            let value: u64 = reply
                .strip_prefix("You rolled: ")
                .expect("dice prefix")
                .parse()
                .expect("dice value");
            assert!((1..=6).contains(&value), "rolled {value}");
        }
    }

    #[test]
    fn unit_private_prefix_routes_to_direct_message() {
        let (route, rest) = split_private_prefix("?what is rust");
        assert_eq!(route, ReplyRoute::DirectMessage);
        assert_eq!(rest, "what is rust");

        let (route, rest) = split_private_prefix("  plain message ");
        assert_eq!(route, ReplyRoute::Channel);
        assert_eq!(rest, "plain message");
    }

    #[test]
    fn unit_summary_prompt_joins_messages_in_order() {
        let prompt = render_summary_prompt(&["first".to_string(), "second".to_string()]);
        assert_eq!(
            prompt,
            "Please summarize the following messages:\nfirst\nsecond"
        );
    }
}
