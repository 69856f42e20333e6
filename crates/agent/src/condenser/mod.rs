//! Condensers — keep the active view within its budget.
//!
//! A condenser never edits the log. It inspects the current view and
//! proposes a [`Summary`] covering some of its events; the controller
//! appends that summary and the state fold removes the covered events from
//! the view and redirects causal references to the summary.
//!
//! Strategies:
//! - `noop`: never reduces
//! - `recent`: keep the head and the most recent tail, placeholder for the middle
//! - `llm`: like `recent`, but the middle is summarized by a model call
//! - `amortized`: wraps another strategy, condensing only every K iterations
//! - `attention`: drops the least relevant events instead of the oldest

pub mod amortized;
pub mod attention;
pub mod llm;
pub mod noop;
pub mod recent;

pub use amortized::AmortizedCondenser;
pub use attention::{AttentionCondenser, KindScorer};
pub use llm::LlmCondenser;
pub use noop::NoopCondenser;
pub use recent::RecentCondenser;

use std::sync::Arc;

use async_trait::async_trait;
use causeway_config::CondenserConfig;
use causeway_core::agent::{RelevanceScorer, Summarizer};
use causeway_core::error::CondenserError;
use causeway_core::event::{Event, EventId, Summary};
use causeway_core::state::{Budget, State};
use causeway_core::view::View;
use tracing::warn;

/// What a condenser decided for one view.
#[derive(Debug, Clone, PartialEq)]
pub enum Condensation {
    /// Nothing to reduce.
    Unchanged,
    /// Replace the covered events with this summary.
    Condensed(Summary),
}

#[async_trait]
pub trait Condenser: Send + Sync {
    fn name(&self) -> &str;

    /// How far past the budget the view may grow before condensation is forced.
    fn slack(&self) -> usize {
        0
    }

    /// Whether the controller should call [`Condenser::condense`] now.
    fn should_condense(&self, view: &View, state: &State) -> bool {
        state.budget.exceeded_by(view.size(&state.budget), 0)
    }

    async fn condense(&self, view: &View, state: &State) -> Result<Condensation, CondenserError>;
}

/// Build the condenser described by `[condenser]`.
///
/// Model-backed strategies use `summarizer` and `scorer` when given; without
/// them they degrade to placeholder summaries and recency ordering.
pub fn from_config(
    config: &CondenserConfig,
    summarizer: Option<Arc<dyn Summarizer>>,
    scorer: Option<Arc<dyn RelevanceScorer>>,
) -> Arc<dyn Condenser> {
    match config {
        CondenserConfig::Noop => Arc::new(NoopCondenser),
        CondenserConfig::Recent {
            keep_first,
            max_size,
        } => Arc::new(RecentCondenser::new(*keep_first, *max_size)),
        CondenserConfig::Llm {
            keep_first,
            max_size,
        } => match summarizer {
            Some(summarizer) => Arc::new(LlmCondenser::new(*keep_first, *max_size, summarizer)),
            None => {
                warn!("llm condenser configured without a summarizer, using placeholders");
                Arc::new(RecentCondenser::new(*keep_first, *max_size))
            }
        },
        CondenserConfig::Amortized { every, slack, inner } => Arc::new(AmortizedCondenser::new(
            *every,
            *slack,
            from_config(inner, summarizer, scorer),
        )),
        CondenserConfig::Attention {
            keep_first,
            max_size,
        } => {
            let scorer = scorer.unwrap_or_else(|| Arc::new(KindScorer));
            let mut condenser = AttentionCondenser::new(*keep_first, *max_size, scorer);
            if let Some(summarizer) = summarizer {
                condenser = condenser.with_summarizer(summarizer);
            }
            Arc::new(condenser)
        }
    }
}

/// Placeholder text stating how many events were dropped and their id range.
pub fn placeholder_text(dropped: &[&Event]) -> String {
    let first = dropped.iter().map(|e| e.id).min();
    let last = dropped.iter().map(|e| e.id).max();
    match (first, last) {
        (Some(first), Some(last)) => format!(
            "{} earlier events condensed ({first}..{last})",
            dropped.len()
        ),
        _ => "no events condensed".into(),
    }
}

/// A summary covering `dropped`, anchored where the earliest of them sat.
pub fn summary_of(dropped: &[&Event], text: String, strategy: &str) -> Summary {
    let mut covered: Vec<EventId> = dropped.iter().map(|e| e.id).collect();
    covered.sort();
    let anchor = dropped
        .iter()
        .map(|e| e.view_key())
        .min()
        .unwrap_or(EventId::ROOT);
    Summary {
        covered,
        anchor,
        text,
        strategy: strategy.into(),
    }
}

/// Index range of the view to drop so that the head (`keep_first` events)
/// and the most recent tail survive with room for one summary.
///
/// With a token budget the tail shrinks further until the kept events fit.
/// Returns `None` when nothing can be dropped.
pub(crate) fn middle_span(
    view: &View,
    budget: &Budget,
    keep_first: usize,
    max_size: usize,
) -> Option<std::ops::Range<usize>> {
    let events = view.events();
    let len = events.len();
    let head = keep_first.min(len);

    let mut tail = if len > max_size {
        max_size.saturating_sub(keep_first + 1)
    } else {
        len - head
    };

    if let Budget::Tokens(limit) = budget {
        let kept_size = |tail: usize| {
            budget.measure(events[..head].iter().chain(&events[len - tail..]))
        };
        while tail > 0 && kept_size(tail) > *limit {
            tail -= 1;
        }
    }

    let span = head..len - tail.min(len - head);
    (!span.is_empty()).then_some(span)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Builders for condenser tests: a stream with a realistic trace and
    //! a helper that applies a condensation the way the controller does.

    use super::*;
    use causeway_core::event::{Action, EventDraft, EventSource, GateStatus, Observation};
    use causeway_core::safety::RiskLevel;
    use causeway_core::state::{Limits, SessionId};
    use causeway_core::stream::EventStream;

    /// `root` followed by `pairs` action/observation pairs.
    pub async fn trace(pairs: usize, budget: Budget) -> (EventStream, State) {
        let stream = EventStream::new(SessionId::from("condense"));
        let root = stream.append(EventDraft::user_message("fix the build")).await.unwrap();
        let mut last = root;
        for i in 1..=pairs {
            let action = stream
                .append(EventDraft::action(
                    Some(last),
                    Action::Run {
                        command: format!("step {i}"),
                    },
                    GateStatus::Allowed,
                    RiskLevel::Low,
                ))
                .await
                .unwrap();
            last = stream
                .append(EventDraft::observation(
                    action,
                    EventSource::Runtime,
                    Observation::output(format!("output {i}")),
                ))
                .await
                .unwrap();
        }
        let limits = Limits {
            max_iterations: 1000,
            budget,
        };
        let state = State::replay(
            SessionId::from("condense"),
            limits,
            stream.snapshot().iter().map(|e| e.as_ref()),
        );
        (stream, state)
    }

    /// Append the summary and fold it, returning the new view.
    pub async fn apply(stream: &EventStream, state: &mut State, summary: Summary) -> View {
        stream.append(EventDraft::summary(summary)).await.unwrap();
        for event in stream.replay(state.next_expected()) {
            state.apply(&event);
        }
        View::build(state, stream)
    }
}
