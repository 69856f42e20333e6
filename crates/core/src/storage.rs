//! Persistence trait — where a session's event log is durably kept.
//!
//! The core prescribes no schema: a backend only has to store events and
//! hand them back in id order, so that replay is deterministic.
//!
//! Implementations: in-memory, JSONL file, SQLite, none (no-op).

use async_trait::async_trait;

use crate::error::StorageError;
use crate::event::{Event, EventId};
use crate::state::SessionId;

#[async_trait]
pub trait EventStore: Send + Sync {
    /// The backend name (e.g., "file", "sqlite", "none").
    fn name(&self) -> &str;

    /// Durably record one event.
    async fn append(&self, session: &SessionId, event: &Event) -> Result<(), StorageError>;

    /// Every stored event of `session` with id ≥ `from`, ascending.
    async fn load_since(&self, session: &SessionId, from: EventId)
        -> Result<Vec<Event>, StorageError>;

    /// Sessions known to this backend.
    async fn sessions(&self) -> Result<Vec<SessionId>, StorageError> {
        Ok(Vec::new())
    }
}
