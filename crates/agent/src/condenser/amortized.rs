//! Amortized condensation: run the inner strategy only every K iterations.
//!
//! Between scheduled runs the view may exceed the budget by `slack`; past
//! that, condensation is forced regardless of the schedule.

use std::sync::Arc;

use async_trait::async_trait;
use causeway_core::error::CondenserError;
use causeway_core::state::State;
use causeway_core::view::View;

use super::{Condensation, Condenser};

pub struct AmortizedCondenser {
    every: u32,
    slack: usize,
    inner: Arc<dyn Condenser>,
}

impl AmortizedCondenser {
    pub fn new(every: u32, slack: usize, inner: Arc<dyn Condenser>) -> Self {
        Self {
            every: every.max(1),
            slack,
            inner,
        }
    }

    fn scheduled(&self, state: &State) -> bool {
        state.iteration % self.every == 0
    }
}

#[async_trait]
impl Condenser for AmortizedCondenser {
    fn name(&self) -> &str {
        "amortized"
    }

    fn slack(&self) -> usize {
        self.slack
    }

    fn should_condense(&self, view: &View, state: &State) -> bool {
        let size = view.size(&state.budget);
        let over_budget = state.budget.exceeded_by(size, 0);
        let over_slack = state.budget.exceeded_by(size, self.slack);
        over_slack || (over_budget && self.scheduled(state))
    }

    async fn condense(&self, view: &View, state: &State) -> Result<Condensation, CondenserError> {
        self.inner.condense(view, state).await
    }
}
