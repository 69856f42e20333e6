//! Attention condenser: drop the least relevant events rather than the oldest.
//!
//! Every event after the kept head is scored; the lowest scores go first,
//! ties broken by lower id. The dropped events are summarized (or replaced
//! by a placeholder) just like the `llm` strategy. If the scorer fails, the
//! ordering falls back to pure recency.

use std::sync::Arc;

use async_trait::async_trait;
use causeway_core::agent::{RelevanceScorer, Summarizer};
use causeway_core::error::{CondenserError, SummarizerError};
use causeway_core::event::{Event, EventPayload, Notice, Observation};
use causeway_core::state::{Budget, State};
use causeway_core::view::View;
use tracing::{debug, warn};

use super::llm::summarize_or_placeholder;
use super::{Condensation, Condenser, placeholder_text, summary_of};

pub struct AttentionCondenser {
    keep_first: usize,
    max_size: usize,
    scorer: Arc<dyn RelevanceScorer>,
    summarizer: Option<Arc<dyn Summarizer>>,
}

impl AttentionCondenser {
    pub fn new(keep_first: usize, max_size: usize, scorer: Arc<dyn RelevanceScorer>) -> Self {
        Self {
            keep_first,
            max_size,
            scorer,
            summarizer: None,
        }
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Candidates in drop order: lowest score first, then lowest id.
    async fn drop_order<'v>(&self, candidates: &'v [Event]) -> Vec<&'v Event> {
        let scores = match self.scorer.score(candidates).await {
            Ok(scores) if scores.len() == candidates.len() => Some(scores),
            Ok(scores) => {
                warn!(
                    scorer = self.scorer.name(),
                    expected = candidates.len(),
                    got = scores.len(),
                    "Scorer returned the wrong number of scores, falling back to recency"
                );
                None
            }
            Err(e) => {
                warn!(scorer = self.scorer.name(), error = %e, "Scorer failed, falling back to recency");
                None
            }
        };

        let mut order: Vec<(f32, &Event)> = candidates
            .iter()
            .enumerate()
            .map(|(i, e)| (scores.as_ref().map_or(0.0, |s| s[i]), e))
            .collect();
        order.sort_by(|(sa, a), (sb, b)| sa.total_cmp(sb).then(a.id.cmp(&b.id)));
        order.into_iter().map(|(_, e)| e).collect()
    }

    /// How many events must go so the view fits.
    fn drop_count(&self, view: &View, state: &State, order: &[&Event]) -> usize {
        let len = view.len();
        let mut count = if len > self.max_size {
            len - self.max_size + 1
        } else {
            0
        };

        if let Budget::Tokens(limit) = state.budget {
            let total = state.budget.measure(view.events());
            let mut removed: usize = order[..count.min(order.len())]
                .iter()
                .map(|e| state.budget.measure([*e]))
                .sum();
            while count < order.len() && total.saturating_sub(removed) > limit {
                removed += state.budget.measure([order[count]]);
                count += 1;
            }
        }
        count.min(order.len())
    }
}

#[async_trait]
impl Condenser for AttentionCondenser {
    fn name(&self) -> &str {
        "attention"
    }

    async fn condense(&self, view: &View, state: &State) -> Result<Condensation, CondenserError> {
        let head = self.keep_first.min(view.len());
        let candidates = &view.events()[head..];
        if candidates.is_empty() {
            return Ok(Condensation::Unchanged);
        }

        let order = self.drop_order(candidates).await;
        let count = self.drop_count(view, state, &order);
        if count == 0 {
            return Ok(Condensation::Unchanged);
        }

        let mut dropped: Vec<&Event> = order[..count].to_vec();
        dropped.sort_by_key(|e| e.view_key());
        debug!(dropped = dropped.len(), view = view.len(), "Condensing by relevance");

        let text = match &self.summarizer {
            Some(summarizer) => summarize_or_placeholder(summarizer.as_ref(), &dropped).await,
            None => placeholder_text(&dropped),
        };
        Ok(Condensation::Condensed(summary_of(&dropped, text, self.name())))
    }
}

/// A model-free scorer that ranks events by kind.
///
/// User messages and failures matter most, bare command output least.
pub struct KindScorer;

impl KindScorer {
    fn score_one(event: &Event) -> f32 {
        match &event.payload {
            EventPayload::UserMessage { .. } | EventPayload::Confirmation(_) => 1.0,
            EventPayload::Summary(_) => 0.9,
            EventPayload::Observation(Observation::Failure { .. })
            | EventPayload::Observation(Observation::Rejected { .. })
            | EventPayload::Notice(Notice::AgentFailed { .. }) => 0.8,
            EventPayload::Action(_) => 0.5,
            EventPayload::Notice(_) => 0.3,
            EventPayload::Observation(Observation::Output { .. }) => 0.2,
        }
    }
}

#[async_trait]
impl RelevanceScorer for KindScorer {
    fn name(&self) -> &str {
        "kind"
    }

    async fn score(&self, events: &[Event]) -> Result<Vec<f32>, SummarizerError> {
        Ok(events.iter().map(Self::score_one).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condenser::testing::{apply, trace};
    use causeway_core::event::EventId;

    /// Scores each event by a fixed table keyed by id; unknown ids score 0.5.
    struct TableScorer(Vec<(u64, f32)>);

    #[async_trait]
    impl RelevanceScorer for TableScorer {
        fn name(&self) -> &str {
            "table"
        }
        async fn score(&self, events: &[Event]) -> Result<Vec<f32>, SummarizerError> {
            Ok(events
                .iter()
                .map(|e| {
                    self.0
                        .iter()
                        .find(|(id, _)| *id == e.id.0)
                        .map_or(0.5, |(_, s)| *s)
                })
                .collect())
        }
    }

    struct BrokenScorer;

    #[async_trait]
    impl RelevanceScorer for BrokenScorer {
        fn name(&self) -> &str {
            "broken"
        }
        async fn score(&self, _events: &[Event]) -> Result<Vec<f32>, SummarizerError> {
            Err(SummarizerError::RequestFailed("timeout".into()))
        }
    }

    #[tokio::test]
    async fn lowest_scores_are_dropped() {
        // 9 events, max 6: drop 4. Events 7 and 8 are the least relevant.
        let (stream, mut state) = trace(4, Budget::Events(6)).await;
        let view = View::build(&state, &stream);
        let scorer = TableScorer(vec![(7, 0.1), (8, 0.1), (2, 0.2)]);
        let condenser = AttentionCondenser::new(1, 6, Arc::new(scorer));

        let Condensation::Condensed(summary) = condenser.condense(&view, &state).await.unwrap() else {
            panic!("expected a condensation");
        };
        // 7, 8, then 2, then the lowest remaining id among the 0.5 ties.
        assert_eq!(
            summary.covered,
            vec![EventId(1), EventId(2), EventId(7), EventId(8)]
        );
        assert_eq!(summary.anchor, EventId(1));

        let view = apply(&stream, &mut state, summary).await;
        assert_eq!(view.len(), 6);
        assert_eq!(view.ids()[0], EventId(0));
        assert!(view.causally_closed());
        assert!(view.is_ordered());
    }

    #[tokio::test]
    async fn ties_drop_older_first() {
        let (stream, state) = trace(4, Budget::Events(6)).await;
        let view = View::build(&state, &stream);
        let condenser = AttentionCondenser::new(1, 6, Arc::new(TableScorer(vec![])));
        let Condensation::Condensed(summary) = condenser.condense(&view, &state).await.unwrap() else {
            panic!("expected a condensation");
        };
        assert_eq!(summary.covered, (1..=4).map(EventId).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn scorer_failure_falls_back_to_recency() {
        let (stream, state) = trace(4, Budget::Events(6)).await;
        let view = View::build(&state, &stream);
        let condenser = AttentionCondenser::new(1, 6, Arc::new(BrokenScorer));
        let Condensation::Condensed(summary) = condenser.condense(&view, &state).await.unwrap() else {
            panic!("expected a condensation");
        };
        assert_eq!(summary.covered, (1..=4).map(EventId).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn head_is_never_dropped() {
        let (stream, state) = trace(4, Budget::Events(4)).await;
        let view = View::build(&state, &stream);
        let scorer = TableScorer(vec![(0, 0.0), (1, 0.0)]);
        let condenser = AttentionCondenser::new(2, 4, Arc::new(scorer));
        let Condensation::Condensed(summary) = condenser.condense(&view, &state).await.unwrap() else {
            panic!("expected a condensation");
        };
        assert!(!summary.covered.contains(&EventId(0)));
        assert!(!summary.covered.contains(&EventId(1)));
    }

    #[tokio::test]
    async fn small_view_is_unchanged() {
        let (stream, state) = trace(1, Budget::Events(10)).await;
        let view = View::build(&state, &stream);
        let condenser = AttentionCondenser::new(1, 10, Arc::new(KindScorer));
        assert_eq!(
            condenser.condense(&view, &state).await.unwrap(),
            Condensation::Unchanged
        );
    }

    #[tokio::test]
    async fn kind_scorer_prefers_user_messages() {
        let (stream, state) = trace(1, Budget::Events(10)).await;
        let view = View::build(&state, &stream);
        let scores = KindScorer.score(view.events()).await.unwrap();
        // root user message, action, output
        assert!(scores[0] > scores[1]);
        assert!(scores[1] > scores[2]);
    }
}
