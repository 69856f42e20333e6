//! Runtime trait — the execution sandbox.
//!
//! A runtime executes one action and returns its observation. It never
//! touches the event stream; the controller appends what it returns.

use async_trait::async_trait;

use crate::error::RuntimeError;
use crate::event::{Action, Observation};

#[async_trait]
pub trait Runtime: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, action: &Action) -> Result<Observation, RuntimeError>;
}
