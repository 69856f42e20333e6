//! Recency condenser: keep the head and the latest events, drop the middle.

use async_trait::async_trait;
use causeway_core::error::CondenserError;
use causeway_core::event::Event;
use causeway_core::state::State;
use causeway_core::view::View;
use tracing::debug;

use super::{Condensation, Condenser, middle_span, placeholder_text, summary_of};

/// Keeps the first `keep_first` events and the most recent events so the
/// condensed view holds at most `max_size` events, one of them a
/// placeholder summary stating how many events were dropped.
#[derive(Debug, Clone)]
pub struct RecentCondenser {
    keep_first: usize,
    max_size: usize,
}

impl RecentCondenser {
    pub fn new(keep_first: usize, max_size: usize) -> Self {
        Self {
            keep_first,
            max_size,
        }
    }

    /// The events this strategy would drop from `view`, oldest first.
    pub fn dropped<'v>(&self, view: &'v View, state: &State) -> Vec<&'v Event> {
        middle_span(view, &state.budget, self.keep_first, self.max_size)
            .map(|span| view.events()[span].iter().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Condenser for RecentCondenser {
    fn name(&self) -> &str {
        "recent"
    }

    async fn condense(&self, view: &View, state: &State) -> Result<Condensation, CondenserError> {
        let dropped = self.dropped(view, state);
        if dropped.is_empty() {
            return Ok(Condensation::Unchanged);
        }
        debug!(dropped = dropped.len(), view = view.len(), "Condensing by recency");
        let text = placeholder_text(&dropped);
        Ok(Condensation::Condensed(summary_of(&dropped, text, self.name())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condenser::testing::{apply, trace};
    use causeway_core::event::{EventDraft, EventId, EventKind};
    use causeway_core::state::Budget;

    async fn condensed_view(pairs: usize, keep_first: usize, max_size: usize) -> View {
        let (stream, mut state) = trace(pairs, Budget::Events(max_size)).await;
        let view = View::build(&state, &stream);
        match RecentCondenser::new(keep_first, max_size)
            .condense(&view, &state)
            .await
            .unwrap()
        {
            Condensation::Condensed(summary) => apply(&stream, &mut state, summary).await,
            Condensation::Unchanged => view,
        }
    }

    #[tokio::test]
    async fn nine_events_become_root_summary_and_last_pair() {
        // root, a1,o1 .. a4,o4
        let view = condensed_view(4, 1, 4).await;
        assert_eq!(view.len(), 4);
        let ids = view.ids();
        assert_eq!(ids[0], EventId(0));
        assert_eq!(view.events()[1].kind(), EventKind::Summary);
        assert_eq!(&ids[2..], &[EventId(7), EventId(8)]);

        let summary = view.events()[1].as_summary().unwrap();
        assert_eq!(summary.covered, (1..=6).map(EventId).collect::<Vec<_>>());
        assert!(summary.text.contains("6 earlier events"));
        assert!(summary.text.contains("#1..#6"));

        // a4 pointed at o3, which was absorbed by the summary.
        assert_eq!(view.events()[2].cause, Some(ids[1]));
        assert!(view.causally_closed());
        assert!(view.is_ordered());
    }

    #[tokio::test]
    async fn ten_events_fit_in_five() {
        let (stream, mut state) = trace(4, Budget::Events(5)).await;
        stream.append(EventDraft::user_message("also run the tests")).await.unwrap();
        for event in stream.replay(state.next_expected()) {
            state.apply(&event);
        }
        let view = View::build(&state, &stream);
        assert_eq!(view.len(), 10);

        let Condensation::Condensed(summary) =
            RecentCondenser::new(1, 5).condense(&view, &state).await.unwrap()
        else {
            panic!("expected a condensation");
        };
        let view = apply(&stream, &mut state, summary).await;
        assert!(view.len() <= 5);
        assert_eq!(view.ids()[0], EventId(0));
        assert!(view.causally_closed());
    }

    #[tokio::test]
    async fn minimal_view_is_unchanged() {
        let (stream, state) = trace(2, Budget::Events(10)).await;
        let view = View::build(&state, &stream);
        let outcome = RecentCondenser::new(1, 10).condense(&view, &state).await.unwrap();
        assert_eq!(outcome, Condensation::Unchanged);
    }

    #[tokio::test]
    async fn keep_first_zero_starts_with_summary() {
        let view = condensed_view(4, 0, 4).await;
        assert_eq!(view.events()[0].kind(), EventKind::Summary);
        assert_eq!(view.len(), 4);
    }

    #[tokio::test]
    async fn repeated_condensation_chains_summaries() {
        let (stream, mut state) = trace(4, Budget::Events(4)).await;
        let condenser = RecentCondenser::new(1, 4);

        let view = View::build(&state, &stream);
        let Condensation::Condensed(first) = condenser.condense(&view, &state).await.unwrap() else {
            panic!("expected a condensation");
        };
        apply(&stream, &mut state, first).await;

        // Grow the view again past its limit.
        for text in ["more", "and more", "still more"] {
            stream.append(EventDraft::user_message(text)).await.unwrap();
        }
        for event in stream.replay(state.next_expected()) {
            state.apply(&event);
        }

        let view = View::build(&state, &stream);
        let Condensation::Condensed(second) = condenser.condense(&view, &state).await.unwrap() else {
            panic!("expected a second condensation");
        };
        let first_summary_id = EventId(9);
        assert!(second.covered.contains(&first_summary_id));
        let view = apply(&stream, &mut state, second).await;

        assert_eq!(view.len(), 4);
        assert_eq!(view.ids()[0], EventId(0));
        assert!(view.causally_closed());
        assert!(view.is_ordered());
        // Anything that pointed at the first summary now resolves to the second.
        assert_eq!(state.resolve(EventId(3)), view.ids()[1]);
    }

    #[tokio::test]
    async fn token_budget_shrinks_the_tail() {
        let (stream, state) = trace(6, Budget::Tokens(60)).await;
        let view = View::build(&state, &stream);
        let condenser = RecentCondenser::new(1, 100);
        let dropped = condenser.dropped(&view, &state);
        assert!(!dropped.is_empty());
        assert!(dropped.len() < view.len() - 1);
    }
}
