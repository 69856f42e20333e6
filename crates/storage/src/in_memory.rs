//! In-memory store — useful for testing and ephemeral sessions.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use causeway_core::error::StorageError;
use causeway_core::event::{Event, EventId};
use causeway_core::state::SessionId;
use causeway_core::storage::EventStore;
use tokio::sync::RwLock;

/// Keeps every session's log in a map of vectors.
/// Cloning shares the same underlying logs.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    logs: Arc<RwLock<HashMap<SessionId, Vec<Event>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events stored for `session`.
    pub async fn count(&self, session: &SessionId) -> usize {
        self.logs.read().await.get(session).map_or(0, Vec::len)
    }
}

#[async_trait]
impl EventStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn append(&self, session: &SessionId, event: &Event) -> Result<(), StorageError> {
        self.logs
            .write()
            .await
            .entry(session.clone())
            .or_default()
            .push(event.clone());
        Ok(())
    }

    async fn load_since(
        &self,
        session: &SessionId,
        from: EventId,
    ) -> Result<Vec<Event>, StorageError> {
        let logs = self.logs.read().await;
        Ok(logs
            .get(session)
            .map(|log| log.iter().filter(|e| e.id >= from).cloned().collect())
            .unwrap_or_default())
    }

    async fn sessions(&self) -> Result<Vec<SessionId>, StorageError> {
        let mut sessions: Vec<SessionId> = self.logs.read().await.keys().cloned().collect();
        sessions.sort();
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use causeway_core::event::EventDraft;
    use chrono::Utc;

    fn event(id: u64, text: &str) -> Event {
        EventDraft::user_message(text).into_event(EventId(id), Utc::now())
    }

    #[tokio::test]
    async fn append_and_load() {
        let store = InMemoryStore::new();
        let session = SessionId::from("a");
        for i in 0..3 {
            store.append(&session, &event(i, "hi")).await.unwrap();
        }
        let loaded = store.load_since(&session, EventId(1)).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, EventId(1));
        assert_eq!(store.count(&session).await, 3);
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = InMemoryStore::new();
        store.append(&SessionId::from("a"), &event(0, "x")).await.unwrap();
        store.append(&SessionId::from("b"), &event(0, "y")).await.unwrap();

        let a = store.load_since(&SessionId::from("a"), EventId::ROOT).await.unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(
            store.sessions().await.unwrap(),
            vec![SessionId::from("a"), SessionId::from("b")]
        );
    }

    #[tokio::test]
    async fn unknown_session_is_empty() {
        let store = InMemoryStore::new();
        assert!(store
            .load_since(&SessionId::from("ghost"), EventId::ROOT)
            .await
            .unwrap()
            .is_empty());
    }
}
