//! The event stream — an ordered, append-only log shared by all producers.
//!
//! Appends are serialized behind a single writer lock that covers id
//! assignment, the durable write and publication. Committed events live in
//! an arena indexed by id; readers only ever take the arena's read lock.
//!
//! Subscribers are woken through a `tokio::sync::broadcast` channel but read
//! the events themselves from the arena, so a lagging subscriber never
//! misses or reorders an event.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::StreamError;
use crate::event::{Event, EventDraft, EventId};
use crate::state::SessionId;
use crate::storage::EventStore;

/// Default broadcast capacity for subscriber wake-ups.
pub const DEFAULT_CAPACITY: usize = 256;

struct Inner {
    session_id: SessionId,
    arena: RwLock<Vec<Arc<Event>>>,
    writer: tokio::sync::Mutex<()>,
    notifier: Mutex<Option<broadcast::Sender<EventId>>>,
    closed: AtomicBool,
    store: Option<Arc<dyn EventStore>>,
}

impl Inner {
    fn get(&self, index: u64) -> Option<Arc<Event>> {
        let arena = self.arena.read().unwrap_or_else(|e| e.into_inner());
        arena.get(index as usize).cloned()
    }

    fn len(&self) -> u64 {
        self.arena.read().unwrap_or_else(|e| e.into_inner()).len() as u64
    }
}

/// A session's event log. Cheap to clone; clones share the same log.
#[derive(Clone)]
pub struct EventStream {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("session_id", &self.inner.session_id)
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .field("durable", &self.inner.store.is_some())
            .finish()
    }
}

impl EventStream {
    /// A volatile stream with no persistence backend.
    pub fn new(session_id: SessionId) -> Self {
        Self::build(session_id, None, Vec::new(), DEFAULT_CAPACITY)
    }

    /// A stream that durably writes every event to `store` before publishing it.
    pub fn with_store(session_id: SessionId, store: Arc<dyn EventStore>) -> Self {
        Self::build(session_id, Some(store), Vec::new(), DEFAULT_CAPACITY)
    }

    /// A fresh stream with an explicit subscriber wake-up capacity.
    pub fn with_capacity(
        session_id: SessionId,
        store: Option<Arc<dyn EventStore>>,
        capacity: usize,
    ) -> Self {
        Self::build(session_id, store, Vec::new(), capacity)
    }

    /// Open a stream over an existing log, loading every stored event.
    pub async fn open(
        session_id: SessionId,
        store: Arc<dyn EventStore>,
        capacity: usize,
    ) -> Result<Self, StreamError> {
        let events = store.load_since(&session_id, EventId::ROOT).await?;
        for (expected, event) in events.iter().enumerate() {
            if event.id.0 != expected as u64 {
                return Err(StreamError::Gap {
                    expected: expected as u64,
                    found: event.id.0,
                });
            }
        }
        info!(session_id = %session_id, events = events.len(), backend = store.name(), "Event stream restored");
        let events = events.into_iter().map(Arc::new).collect();
        Ok(Self::build(session_id, Some(store), events, capacity))
    }

    fn build(
        session_id: SessionId,
        store: Option<Arc<dyn EventStore>>,
        events: Vec<Arc<Event>>,
        capacity: usize,
    ) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                session_id,
                arena: RwLock::new(events),
                writer: tokio::sync::Mutex::new(()),
                notifier: Mutex::new(Some(sender)),
                closed: AtomicBool::new(false),
                store,
            }),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.inner.session_id
    }

    /// Append an event, assigning the next id.
    ///
    /// The event is durably stored before it becomes visible. On failure
    /// nothing is published and the id is not consumed; callers must retry
    /// or escalate.
    pub async fn append(&self, draft: EventDraft) -> Result<EventId, StreamError> {
        let _writer = self.inner.writer.lock().await;
        if self.is_closed() {
            return Err(StreamError::Closed);
        }

        let id = EventId(self.inner.len());
        let event = draft.into_event(id, Utc::now());

        if let Some(store) = &self.inner.store {
            store.append(&self.inner.session_id, &event).await?;
        }

        debug!(session_id = %self.inner.session_id, event_id = %id, kind = ?event.kind(), "Event appended");
        self.inner
            .arena
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(event));

        if let Some(sender) = self
            .inner
            .notifier
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            // No subscribers is fine.
            let _ = sender.send(id);
        }
        Ok(id)
    }

    /// Register a subscriber that sees every event appended from now on.
    pub fn subscribe(&self) -> Subscription {
        let notifier = self.inner.notifier.lock().unwrap_or_else(|e| e.into_inner());
        let receiver = notifier.as_ref().map(broadcast::Sender::subscribe);
        // Taken under the notifier lock: anything appended later is both in
        // the arena past `next` and signalled on `receiver`.
        let next = self.inner.len();
        drop(notifier);
        Subscription {
            inner: self.inner.clone(),
            receiver,
            next,
        }
    }

    /// Run `callback` on every future event, in append order, on a background task.
    pub fn subscribe_with<F>(&self, mut callback: F) -> JoinHandle<()>
    where
        F: FnMut(&Event) + Send + 'static,
    {
        let mut subscription = self.subscribe();
        tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                callback(&event);
            }
        })
    }

    /// All events with id ≥ `from`, lazily, in ascending order.
    ///
    /// The sequence ends at the log's length when `replay` was called.
    pub fn replay(&self, from: EventId) -> Replay {
        Replay {
            inner: self.inner.clone(),
            from: from.0,
            cursor: from.0,
            end: self.inner.len(),
        }
    }

    /// Every committed event.
    pub fn snapshot(&self) -> Vec<Arc<Event>> {
        self.inner
            .arena
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn get(&self, id: EventId) -> Option<Arc<Event>> {
        self.inner.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.inner.len() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last_id(&self) -> Option<EventId> {
        self.inner.len().checked_sub(1).map(EventId)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Refuse further appends and let subscribers drain and finish.
    pub async fn close(&self) {
        let _writer = self.inner.writer.lock().await;
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            self.inner
                .notifier
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take();
            info!(session_id = %self.inner.session_id, events = self.len(), "Event stream closed");
        }
    }
}

/// A live feed of events appended after the subscription was created.
pub struct Subscription {
    inner: Arc<Inner>,
    receiver: Option<broadcast::Receiver<EventId>>,
    next: u64,
}

impl Subscription {
    /// The next event in append order, or `None` once the stream is closed
    /// and fully drained.
    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        loop {
            if let Some(event) = self.try_next() {
                return Some(event);
            }
            let receiver = self.receiver.as_mut()?;
            match receiver.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    self.receiver = None;
                    return self.try_next();
                }
            }
        }
    }

    /// The next already-committed event, without waiting.
    pub fn try_next(&mut self) -> Option<Arc<Event>> {
        let event = self.inner.get(self.next)?;
        self.next += 1;
        Some(event)
    }

    /// Id of the next event this subscription will yield.
    pub fn position(&self) -> EventId {
        EventId(self.next)
    }
}

/// A finite, restartable, lazy sequence over a range of the log.
#[derive(Clone)]
pub struct Replay {
    inner: Arc<Inner>,
    from: u64,
    cursor: u64,
    end: u64,
}

impl Replay {
    /// Rewind to the first event of the range.
    pub fn restart(&mut self) {
        self.cursor = self.from;
    }
}

impl Iterator for Replay {
    type Item = Arc<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.end {
            return None;
        }
        let event = self.inner.get(self.cursor)?;
        self.cursor += 1;
        Some(event)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end.saturating_sub(self.cursor) as usize;
        (remaining, Some(remaining))
    }
}
