//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token.
//! Good enough to decide when the active view has outgrown its budget.

use crate::event::Event;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}

/// Estimate tokens for a single event including per-event overhead.
///
/// Each event costs ~4 tokens of overhead for its kind marker, id and
/// delimiters once rendered into a prompt.
pub fn estimate_event_tokens(event: &Event) -> usize {
    let overhead = 4;
    overhead + estimate_tokens(&event.render())
}

/// Estimate tokens for a slice of events.
pub fn estimate_events_tokens<'a>(events: impl IntoIterator<Item = &'a Event>) -> usize {
    events.into_iter().map(estimate_event_tokens).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventDraft, EventId};
    use chrono::Utc;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn four_chars_is_one_token() {
        assert_eq!(estimate_tokens("test"), 1);
    }

    #[test]
    fn five_chars_rounds_up() {
        assert_eq!(estimate_tokens("hello"), 2);
    }

    #[test]
    fn event_includes_overhead() {
        let event = EventDraft::user_message("hi").into_event(EventId(0), Utc::now());
        // "user #0: hi" = 11 chars → 3 tokens + 4 overhead
        assert_eq!(estimate_event_tokens(&event), 7);
    }

    #[test]
    fn sums_over_events() {
        let a = EventDraft::user_message("hi").into_event(EventId(0), Utc::now());
        let b = EventDraft::user_message("hi").into_event(EventId(1), Utc::now());
        assert_eq!(estimate_events_tokens([&a, &b]), 14);
    }
}
