//! Sessions — one event stream, one state, one controller.
//!
//! [`SessionBuilder`] wires a controller from configuration and spawns it.
//! The returned [`SessionHandle`] is what a front end holds: it appends
//! user messages and confirmations, requests a stop, and reads status by
//! folding the log. [`SessionRegistry`] maps ids to handles; it owns no
//! session state itself.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use causeway_config::AppConfig;
use causeway_core::agent::{Agent, RelevanceScorer, Summarizer};
use causeway_core::error::{Error, StreamError};
use causeway_core::event::{Action, EventDraft, EventId};
use causeway_core::knowledge::KnowledgeBase;
use causeway_core::runtime::Runtime;
use causeway_core::state::{ControllerStatus, Limits, SessionId, State};
use causeway_core::storage::EventStore;
use causeway_core::stream::{EventStream, Subscription};
use causeway_security::{AuditLogger, RuleError, SafetyGate};
use tokio::task::JoinHandle;
use tracing::info;

use crate::condenser;
use crate::controller::{Controller, FailurePolicy, StopHandle};
use crate::knowledge::{TriggerError, TriggerKnowledge};

#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("Failed to open event stream: {0}")]
    Stream(#[from] StreamError),

    #[error("Invalid security rule: {0}")]
    Rule(#[from] RuleError),

    #[error("Invalid knowledge trigger: {0}")]
    Knowledge(#[from] TriggerError),
}

pub struct SessionBuilder {
    config: AppConfig,
    agent: Arc<dyn Agent>,
    runtime: Arc<dyn Runtime>,
    session_id: Option<SessionId>,
    store: Option<Arc<dyn EventStore>>,
    summarizer: Option<Arc<dyn Summarizer>>,
    scorer: Option<Arc<dyn RelevanceScorer>>,
    knowledge: Option<Arc<dyn KnowledgeBase>>,
    audit: Option<Arc<AuditLogger>>,
}

impl SessionBuilder {
    pub fn new(config: AppConfig, agent: Arc<dyn Agent>, runtime: Arc<dyn Runtime>) -> Self {
        Self {
            config,
            agent,
            runtime,
            session_id: None,
            store: None,
            summarizer: None,
            scorer: None,
            knowledge: None,
            audit: None,
        }
    }

    /// Use a fixed id. With a store, an existing log under this id is resumed.
    pub fn session_id(mut self, id: SessionId) -> Self {
        self.session_id = Some(id);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn RelevanceScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    /// Replace the `[[knowledge]]` microagents from the configuration.
    pub fn with_knowledge(mut self, knowledge: Arc<dyn KnowledgeBase>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Build the controller without starting it.
    pub async fn build(self, task: Option<&str>) -> Result<Controller, StartError> {
        let id = self.session_id.unwrap_or_default();
        let capacity = self.config.stream.subscriber_capacity;
        let stream = match self.store {
            Some(store) => EventStream::open(id, store, capacity).await?,
            None => EventStream::with_capacity(id, None, capacity),
        };
        if let Some(task) = task {
            stream.append(EventDraft::user_message(task)).await?;
        }

        let audit = self.audit.unwrap_or_default();
        let gate = SafetyGate::from_config(&self.config.security, audit)?;
        let knowledge: Arc<dyn KnowledgeBase> = match self.knowledge {
            Some(knowledge) => knowledge,
            None => Arc::new(TriggerKnowledge::from_config(&self.config.knowledge)?),
        };
        let condenser = condenser::from_config(&self.config.condenser, self.summarizer, self.scorer);

        let controller_config = &self.config.controller;
        let mut controller = Controller::new(stream, controller_config.limits(), self.agent, self.runtime)
            .with_gate(Arc::new(gate))
            .with_condenser(condenser)
            .with_knowledge(knowledge)
            .with_failure_policy(FailurePolicy::from_config(controller_config));
        if let Some(secs) = controller_config.runtime_timeout_secs {
            controller = controller.with_runtime_timeout(Duration::from_secs(secs));
        }
        Ok(controller)
    }

    /// Build the controller and run it on a background task.
    pub async fn start(self, task: Option<&str>) -> Result<SessionHandle, StartError> {
        let controller = self.build(task).await?;
        Ok(SessionHandle::spawn(controller))
    }
}

/// A front end's view of a running session.
pub struct SessionHandle {
    id: SessionId,
    stream: EventStream,
    limits: Limits,
    stop: StopHandle,
    task: tokio::sync::Mutex<Option<JoinHandle<Result<ControllerStatus, Error>>>>,
}

impl SessionHandle {
    pub fn spawn(mut controller: Controller) -> Self {
        let state = controller.state();
        let id = state.session_id.clone();
        let limits = Limits {
            max_iterations: state.max_iterations,
            budget: state.budget,
        };
        let stream = controller.stream().clone();
        let stop = controller.stop_handle();
        info!(session_id = %id, "Session started");
        let task = tokio::spawn(async move { controller.run().await });
        Self {
            id,
            stream,
            limits,
            stop,
            task: tokio::sync::Mutex::new(Some(task)),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn stream(&self) -> &EventStream {
        &self.stream
    }

    pub async fn send_message(&self, text: impl Into<String>) -> Result<EventId, StreamError> {
        self.stream.append(EventDraft::user_message(text)).await
    }

    /// Approve an action awaiting confirmation.
    ///
    /// A confirmation that does not match the pending action is recorded but
    /// has no effect.
    pub async fn confirm(&self, action: EventId) -> Result<EventId, StreamError> {
        self.stream
            .append(EventDraft::confirmation(action, true, None))
            .await
    }

    pub async fn reject(&self, action: EventId, reason: Option<String>) -> Result<EventId, StreamError> {
        self.stream
            .append(EventDraft::confirmation(action, false, reason))
            .await
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    /// The session's state, folded from its log.
    pub fn state(&self) -> State {
        let log = self.stream.snapshot();
        State::replay(self.id.clone(), self.limits, log.iter().map(|e| e.as_ref()))
    }

    pub fn status(&self) -> ControllerStatus {
        self.state().status
    }

    /// The action waiting for a confirmation, if any.
    pub fn pending_action(&self) -> Option<(EventId, Action)> {
        let state = self.state();
        let pending = state.pending.filter(|p| p.resolution.is_none())?;
        let event = self.stream.get(pending.action)?;
        let action = event.as_action()?.action.clone();
        Some((pending.action, action))
    }

    pub fn subscribe(&self) -> Subscription {
        self.stream.subscribe()
    }

    /// Wait for the controller to finish. Later calls return the recorded status.
    pub async fn wait(&self) -> Result<ControllerStatus, Error> {
        let task = self.task.lock().await.take();
        match task {
            Some(task) => task
                .await
                .map_err(|e| Error::Internal(format!("controller task failed: {e}")))?,
            None => Ok(self.status()),
        }
    }
}

/// Session id → handle, behind one lock.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: SessionHandle) -> Arc<SessionHandle> {
        let handle = Arc::new(handle);
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(handle.id().clone(), handle.clone());
        handle
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<SessionHandle>> {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    pub fn remove(&self, id: &SessionId) -> Option<Arc<SessionHandle>> {
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self
            .sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        ids.sort_by(|a, b| a.0.cmp(&b.0));
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ask every registered session to stop.
    pub fn stop_all(&self) {
        for handle in self.sessions.read().unwrap_or_else(|e| e.into_inner()).values() {
            handle.stop();
        }
    }
}
