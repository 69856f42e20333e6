//! The no-op condenser, for effectively unbounded budgets.

use async_trait::async_trait;
use causeway_core::error::CondenserError;
use causeway_core::state::State;
use causeway_core::view::View;

use super::{Condensation, Condenser};

/// Never reduces the view. If the budget is exceeded anyway, the
/// controller reports the condenser as exhausted.
pub struct NoopCondenser;

#[async_trait]
impl Condenser for NoopCondenser {
    fn name(&self) -> &str {
        "noop"
    }

    async fn condense(&self, _view: &View, _state: &State) -> Result<Condensation, CondenserError> {
        Ok(Condensation::Unchanged)
    }
}
