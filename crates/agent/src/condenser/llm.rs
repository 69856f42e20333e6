//! Model-summarized condenser.
//!
//! Chooses the same span as [`RecentCondenser`], but asks a [`Summarizer`]
//! to describe it. A failed or empty summary degrades to the placeholder
//! text; condensation never blocks the loop on the summarizer.

use std::sync::Arc;

use async_trait::async_trait;
use causeway_core::agent::Summarizer;
use causeway_core::error::CondenserError;
use causeway_core::event::Event;
use causeway_core::state::State;
use causeway_core::view::View;
use tracing::{debug, warn};

use super::{Condensation, Condenser, RecentCondenser, placeholder_text, summary_of};

/// Summarize `dropped` with `summarizer`, falling back to a placeholder.
pub(crate) async fn summarize_or_placeholder(
    summarizer: &dyn Summarizer,
    dropped: &[&Event],
) -> String {
    let owned: Vec<Event> = dropped.iter().map(|e| (*e).clone()).collect();
    match summarizer.summarize(&owned).await {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => {
            warn!(summarizer = summarizer.name(), "Empty summary, using placeholder");
            placeholder_text(dropped)
        }
        Err(e) => {
            warn!(summarizer = summarizer.name(), error = %e, "Summarizer failed, using placeholder");
            placeholder_text(dropped)
        }
    }
}

pub struct LlmCondenser {
    window: RecentCondenser,
    summarizer: Arc<dyn Summarizer>,
}

impl LlmCondenser {
    pub fn new(keep_first: usize, max_size: usize, summarizer: Arc<dyn Summarizer>) -> Self {
        Self {
            window: RecentCondenser::new(keep_first, max_size),
            summarizer,
        }
    }
}

#[async_trait]
impl Condenser for LlmCondenser {
    fn name(&self) -> &str {
        "llm"
    }

    async fn condense(&self, view: &View, state: &State) -> Result<Condensation, CondenserError> {
        let dropped = self.window.dropped(view, state);
        if dropped.is_empty() {
            return Ok(Condensation::Unchanged);
        }
        debug!(dropped = dropped.len(), summarizer = self.summarizer.name(), "Summarizing condensed span");
        let text = summarize_or_placeholder(self.summarizer.as_ref(), &dropped).await;
        Ok(Condensation::Condensed(summary_of(&dropped, text, self.name())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condenser::testing::trace;
    use causeway_core::error::SummarizerError;
    use causeway_core::event::EventId;
    use causeway_core::state::Budget;
    use std::sync::Mutex;

    /// Records what it was asked to summarize.
    struct EchoSummarizer {
        seen: Mutex<Vec<Vec<EventId>>>,
    }

    #[async_trait]
    impl Summarizer for EchoSummarizer {
        fn name(&self) -> &str {
            "echo"
        }
        async fn summarize(&self, events: &[Event]) -> Result<String, SummarizerError> {
            self.seen
                .lock()
                .unwrap()
                .push(events.iter().map(|e| e.id).collect());
            Ok(format!("the agent ran {} steps", events.len() / 2))
        }
    }

    struct FailingSummarizer;

    #[async_trait]
    impl Summarizer for FailingSummarizer {
        fn name(&self) -> &str {
            "failing"
        }
        async fn summarize(&self, _events: &[Event]) -> Result<String, SummarizerError> {
            Err(SummarizerError::RequestFailed("rate limited".into()))
        }
    }

    #[tokio::test]
    async fn summary_text_comes_from_the_model() {
        let (stream, state) = trace(4, Budget::Events(4)).await;
        let view = View::build(&state, &stream);
        let summarizer = Arc::new(EchoSummarizer {
            seen: Mutex::new(vec![]),
        });
        let condenser = LlmCondenser::new(1, 4, summarizer.clone());

        let Condensation::Condensed(summary) = condenser.condense(&view, &state).await.unwrap() else {
            panic!("expected a condensation");
        };
        assert_eq!(summary.text, "the agent ran 3 steps");
        assert_eq!(summary.strategy, "llm");
        assert_eq!(
            summarizer.seen.lock().unwrap()[0],
            (1..=6).map(EventId).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn failure_degrades_to_placeholder() {
        let (stream, state) = trace(4, Budget::Events(4)).await;
        let view = View::build(&state, &stream);
        let condenser = LlmCondenser::new(1, 4, Arc::new(FailingSummarizer));

        let Condensation::Condensed(summary) = condenser.condense(&view, &state).await.unwrap() else {
            panic!("expected a condensation");
        };
        assert!(summary.text.contains("6 earlier events condensed"));
        assert_eq!(summary.covered.len(), 6);
    }

    #[tokio::test]
    async fn minimal_view_skips_the_model() {
        let (stream, state) = trace(1, Budget::Events(10)).await;
        let view = View::build(&state, &stream);
        let summarizer = Arc::new(EchoSummarizer {
            seen: Mutex::new(vec![]),
        });
        let condenser = LlmCondenser::new(1, 10, summarizer.clone());
        assert_eq!(
            condenser.condense(&view, &state).await.unwrap(),
            Condensation::Unchanged
        );
        assert!(summarizer.seen.lock().unwrap().is_empty());
    }
}
