//! The active view — what the agent (and the condenser) actually see.
//!
//! A view is a snapshot of the events named by `State::history`, with
//! causal references already rewritten through any summaries. The
//! canonical log is never touched; rewriting happens on the copies.

use std::collections::HashSet;

use tracing::warn;

use crate::event::{Event, EventId, EventPayload};
use crate::state::{Budget, State};
use crate::stream::EventStream;
use crate::token::estimate_events_tokens;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct View {
    events: Vec<Event>,
}

impl View {
    /// Materialize the active view of `state` from the stream's arena.
    pub fn build(state: &State, stream: &EventStream) -> Self {
        let mut events = Vec::with_capacity(state.history.len());
        for id in &state.history {
            let Some(event) = stream.get(*id) else {
                warn!(event_id = %id, "Active view references an event missing from the stream");
                continue;
            };
            let mut event = (*event).clone();
            event.cause = event.cause.map(|cause| state.resolve(cause));
            events.push(event);
        }
        Self { events }
    }

    /// Wrap already-ordered events (tests, replays).
    pub fn from_events(events: Vec<Event>) -> Self {
        Self { events }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    pub fn ids(&self) -> Vec<EventId> {
        self.events.iter().map(|e| e.id).collect()
    }

    pub fn get(&self, id: EventId) -> Option<&Event> {
        self.events.iter().find(|e| e.id == id)
    }

    pub fn estimated_tokens(&self) -> usize {
        estimate_events_tokens(&self.events)
    }

    /// Size in the unit of `budget`.
    pub fn size(&self, budget: &Budget) -> usize {
        budget.measure(&self.events)
    }

    /// Text of every user message in the view, oldest first.
    pub fn user_messages(&self) -> impl Iterator<Item = &str> {
        self.events.iter().filter_map(|e| match &e.payload {
            EventPayload::UserMessage { content } => Some(content.as_str()),
            _ => None,
        })
    }

    /// Whether every non-null cause points at an event in the view.
    pub fn causally_closed(&self) -> bool {
        let present: HashSet<EventId> = self.events.iter().map(|e| e.id).collect();
        self.events
            .iter()
            .filter_map(|e| e.cause)
            .all(|cause| present.contains(&cause))
    }

    /// Whether events are in non-decreasing view-key order.
    pub fn is_ordered(&self) -> bool {
        self.events
            .windows(2)
            .all(|pair| pair[0].view_key() <= pair[1].view_key())
    }
}

impl<'a> IntoIterator for &'a View {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
