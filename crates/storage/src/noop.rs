//! No-op store — for sessions that should leave no trace.

use async_trait::async_trait;
use causeway_core::error::StorageError;
use causeway_core::event::{Event, EventId};
use causeway_core::state::SessionId;
use causeway_core::storage::EventStore;

/// A store that discards everything and remembers nothing.
pub struct NoopStore;

#[async_trait]
impl EventStore for NoopStore {
    fn name(&self) -> &str {
        "none"
    }

    async fn append(&self, _session: &SessionId, _event: &Event) -> Result<(), StorageError> {
        Ok(())
    }

    async fn load_since(
        &self,
        _session: &SessionId,
        _from: EventId,
    ) -> Result<Vec<Event>, StorageError> {
        Ok(vec![])
    }
}
