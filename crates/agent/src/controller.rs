//! The controller — one session's step loop.
//!
//! Each step:
//!
//! 1. **Condense** the active view if it has outgrown its budget
//! 2. **Decide**: hand the view (plus matched knowledge) to the agent
//! 3. **Gate** the proposed action through the safety inspectors
//! 4. **Dispatch** allowed actions to the runtime and record the observation
//!
//! The controller never edits its [`State`] directly. Every decision is
//! appended to the event stream and folded back with [`State::apply`], so a
//! session rebuilt from its log ends up in exactly the same state.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use causeway_config::ControllerConfig;
use causeway_core::agent::{Agent, Decision, PromptView};
use causeway_core::error::{CondenserError, Error, RuntimeError, SessionError};
use causeway_core::event::{Action, EventDraft, EventId, EventSource, GateStatus, Notice, Observation, RejectionOrigin};
use causeway_core::knowledge::{KnowledgeBase, NoKnowledge};
use causeway_core::runtime::Runtime;
use causeway_core::safety::{ActionInspector, Assessment, RiskLevel, Verdict};
use causeway_core::state::{ControllerStatus, Limits, Pending, Resolution, State};
use causeway_core::stream::EventStream;
use causeway_core::view::View;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::condenser::{Condensation, Condenser, NoopCondenser};

/// Decides which runtime failures end the session.
///
/// `Recoverable` never does and `Fatal` always does. A categorized
/// `Failure` is fatal only if its category is listed.
#[derive(Debug, Clone, Default)]
pub struct FailurePolicy {
    fatal_categories: HashSet<String>,
}

impl FailurePolicy {
    pub fn new<I, S>(fatal_categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fatal_categories: fatal_categories.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_config(config: &ControllerConfig) -> Self {
        Self::new(config.fatal_failure_categories.iter().cloned())
    }

    pub fn is_fatal(&self, error: &RuntimeError) -> bool {
        match error {
            RuntimeError::Recoverable(_) => false,
            RuntimeError::Fatal(_) => true,
            RuntimeError::Failure { category, .. } => self.fatal_categories.contains(category),
        }
    }
}

/// Requests a cooperative stop. Cheap to clone.
///
/// The controller honours it at its next safe point: before a step, or
/// while suspended. A runtime call in progress is never interrupted.
#[derive(Debug, Clone)]
pub struct StopHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.sender.borrow()
    }
}

pub struct Controller {
    stream: EventStream,
    state: State,
    agent: Arc<dyn Agent>,
    runtime: Arc<dyn Runtime>,
    gate: Option<Arc<dyn ActionInspector>>,
    condenser: Arc<dyn Condenser>,
    knowledge: Arc<dyn KnowledgeBase>,
    failures: FailurePolicy,
    runtime_timeout: Option<Duration>,
    stop_sender: Arc<watch::Sender<bool>>,
    stop: watch::Receiver<bool>,
}

impl Controller {
    /// A controller over `stream`. Events already in the stream are folded
    /// in, so a restored log resumes where it left off.
    pub fn new(
        stream: EventStream,
        limits: Limits,
        agent: Arc<dyn Agent>,
        runtime: Arc<dyn Runtime>,
    ) -> Self {
        let (sender, stop) = watch::channel(false);
        let mut controller = Self {
            state: State::new(stream.session_id().clone(), limits),
            stream,
            agent,
            runtime,
            gate: None,
            condenser: Arc::new(NoopCondenser),
            knowledge: Arc::new(NoKnowledge),
            failures: FailurePolicy::default(),
            runtime_timeout: None,
            stop_sender: Arc::new(sender),
            stop,
        };
        controller.catch_up();
        controller
    }

    /// Inspect every proposed action with `gate`. Without one, all actions are allowed.
    pub fn with_gate(mut self, gate: Arc<dyn ActionInspector>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_condenser(mut self, condenser: Arc<dyn Condenser>) -> Self {
        self.condenser = condenser;
        self
    }

    pub fn with_knowledge(mut self, knowledge: Arc<dyn KnowledgeBase>) -> Self {
        self.knowledge = knowledge;
        self
    }

    pub fn with_failure_policy(mut self, failures: FailurePolicy) -> Self {
        self.failures = failures;
        self
    }

    /// Bound each runtime call; expiry is reported as a recoverable failure.
    pub fn with_runtime_timeout(mut self, timeout: Duration) -> Self {
        self.runtime_timeout = Some(timeout);
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            sender: self.stop_sender.clone(),
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn stream(&self) -> &EventStream {
        &self.stream
    }

    /// Drive the session until it reaches a terminal status.
    ///
    /// The stream is closed on the way out. An `Err` means the log itself
    /// could not be written; the session is then left as last recorded.
    pub async fn run(&mut self) -> Result<ControllerStatus, Error> {
        info!(
            session_id = %self.state.session_id,
            agent = self.agent.name(),
            runtime = self.runtime.name(),
            condenser = self.condenser.name(),
            "Controller started"
        );

        loop {
            self.catch_up();
            let status = self.state.status;

            if status.is_terminal() {
                self.stream.close().await;
                info!(
                    session_id = %self.state.session_id,
                    %status,
                    iteration = self.state.iteration,
                    last_error = self.state.last_error.as_deref().unwrap_or(""),
                    "Controller finished"
                );
                return Ok(status);
            }

            // Checked before suspending or stopping: the last iteration may
            // have been a question to the user.
            if self.state.iteration_limit_reached() {
                self.exceed_iteration_limit().await?;
                continue;
            }

            if self.stop_requested() {
                self.transition(ControllerStatus::Stopped, Some("stop requested".into()))
                    .await?;
                continue;
            }

            if status.is_suspended() {
                self.wait_for_input().await?;
                continue;
            }

            self.step().await?;
        }
    }

    /// Run one step from `RUNNING`.
    pub async fn step(&mut self) -> Result<(), Error> {
        if let Some(Pending {
            action,
            resolution: Some(resolution),
        }) = self.state.pending.clone()
        {
            return self.resolve_pending(action, resolution).await;
        }

        // An allowed action with no observation: the previous run ended mid-dispatch.
        if let Some(action) = self.state.in_flight {
            warn!(session_id = %self.state.session_id, event_id = %action, "Action was interrupted before its observation was recorded");
            let observation = Observation::Failure {
                reason: "interrupted before an observation was recorded".into(),
                fatal: false,
            };
            self.append(EventDraft::observation(action, EventSource::Controller, observation))
                .await?;
            return Ok(());
        }

        if self.state.iteration_limit_reached() {
            return self.exceed_iteration_limit().await;
        }

        if !self.ensure_budget().await? {
            return Ok(());
        }

        let view = View::build(&self.state, &self.stream);
        let cause = view.events().last().map(|e| e.id);
        let knowledge = self.knowledge.match_view(&view).await;
        let prompt = PromptView { view, knowledge };

        debug!(
            session_id = %self.state.session_id,
            iteration = self.state.iteration,
            view = prompt.view.len(),
            snippets = prompt.knowledge.len(),
            "Asking agent for a decision"
        );

        match self.agent.decide(&prompt, &self.state).await {
            Ok(Decision::Act { action }) => self.propose(cause, action).await,
            Ok(Decision::NoFurtherAction { message }) => {
                info!(session_id = %self.state.session_id, iteration = self.state.iteration, "Agent reports the task complete");
                self.transition(ControllerStatus::Finished, message).await
            }
            Err(e) => {
                warn!(session_id = %self.state.session_id, error = %e, "Agent failed to decide");
                self.append(EventDraft::notice(
                    cause,
                    Notice::AgentFailed {
                        reason: e.to_string(),
                    },
                ))
                .await?;
                Ok(())
            }
        }
    }

    async fn exceed_iteration_limit(&mut self) -> Result<(), Error> {
        let reason = SessionError::IterationLimitExceeded {
            limit: self.state.max_iterations,
        };
        error!(session_id = %self.state.session_id, iteration = self.state.iteration, "{reason}");
        self.transition(ControllerStatus::Error, Some(reason.to_string()))
            .await
    }

    /// Gate a proposed action and record it according to the verdict.
    async fn propose(&mut self, cause: Option<EventId>, action: Action) -> Result<(), Error> {
        // Questions to the user never leave the session.
        if action.awaits_user() {
            self.append(EventDraft::action(cause, action, GateStatus::Allowed, RiskLevel::Low))
                .await?;
            return Ok(());
        }

        let assessment = self.assess(&action).await;
        match assessment.verdict {
            Verdict::Allow => {
                let id = self
                    .append(EventDraft::action(cause, action.clone(), GateStatus::Allowed, assessment.risk))
                    .await?;
                self.dispatch(id, &action).await
            }
            Verdict::RequireConfirmation => {
                let id = self
                    .append(EventDraft::action(
                        cause,
                        action.clone(),
                        GateStatus::AwaitingConfirmation,
                        assessment.risk,
                    ))
                    .await?;
                info!(
                    session_id = %self.state.session_id,
                    event_id = %id,
                    action = %action.describe(),
                    risk = %assessment.risk,
                    reason = assessment.reason.as_deref().unwrap_or(""),
                    "Action awaiting confirmation"
                );
                Ok(())
            }
            Verdict::Reject => {
                let reason = assessment
                    .reason
                    .unwrap_or_else(|| "blocked by the safety gate".into());
                warn!(session_id = %self.state.session_id, action = %action.describe(), %reason, "Action rejected");
                let id = self
                    .append(EventDraft::action(
                        cause,
                        action,
                        GateStatus::Rejected {
                            reason: reason.clone(),
                        },
                        assessment.risk,
                    ))
                    .await?;
                let observation = Observation::Rejected {
                    reason,
                    origin: RejectionOrigin::SafetyGate,
                };
                self.append(EventDraft::observation(id, EventSource::Controller, observation))
                    .await?;
                Ok(())
            }
        }
    }

    async fn assess(&self, action: &Action) -> Assessment {
        let Some(gate) = &self.gate else {
            return Assessment::allow(RiskLevel::Low);
        };
        match gate.inspect(action, &self.state).await {
            Ok(assessment) => assessment,
            Err(e) => {
                warn!(gate = gate.name(), error = %e, "Safety gate failed, requiring confirmation");
                let reason = SessionError::AnalyzerUnavailable(e.to_string());
                Assessment::new(Verdict::RequireConfirmation, RiskLevel::High, reason.to_string())
            }
        }
    }

    /// Act on the answer to an action that was awaiting confirmation.
    async fn resolve_pending(&mut self, id: EventId, resolution: Resolution) -> Result<(), Error> {
        let action = self
            .stream
            .get(id)
            .and_then(|event| event.as_action().map(|a| a.action.clone()))
            .ok_or_else(|| Error::Internal(format!("pending action {id} is not an action event")))?;

        match resolution {
            Resolution::Approved => {
                info!(session_id = %self.state.session_id, event_id = %id, "Confirmed action dispatched");
                self.dispatch(id, &action).await
            }
            Resolution::Rejected { reason } => {
                let reason = reason.unwrap_or_else(|| "rejected by the user".into());
                info!(session_id = %self.state.session_id, event_id = %id, %reason, "Action rejected by the user");
                let observation = Observation::Rejected {
                    reason,
                    origin: RejectionOrigin::User,
                };
                self.append(EventDraft::observation(id, EventSource::Controller, observation))
                    .await?;
                Ok(())
            }
        }
    }

    /// Execute an action and record what came back.
    async fn dispatch(&mut self, id: EventId, action: &Action) -> Result<(), Error> {
        debug!(session_id = %self.state.session_id, event_id = %id, action = %action.describe(), "Dispatching action");

        let result = match self.runtime_timeout {
            Some(limit) => tokio::time::timeout(limit, self.runtime.execute(action))
                .await
                .unwrap_or_else(|_| {
                    Err(RuntimeError::Recoverable(format!("timed out after {limit:?}")))
                }),
            None => self.runtime.execute(action).await,
        };

        match result {
            Ok(observation) => {
                self.append(EventDraft::observation(id, EventSource::Runtime, observation))
                    .await?;
                Ok(())
            }
            Err(e) if self.failures.is_fatal(&e) => {
                let reason = e.reason().to_string();
                error!(session_id = %self.state.session_id, event_id = %id, error = %e, "Runtime failure is fatal");
                let observation = Observation::Failure {
                    reason: reason.clone(),
                    fatal: true,
                };
                self.append(EventDraft::observation(id, EventSource::Runtime, observation))
                    .await?;
                let reason = SessionError::RuntimeFatal(reason);
                self.transition(ControllerStatus::Error, Some(reason.to_string()))
                    .await
            }
            Err(e) => {
                warn!(session_id = %self.state.session_id, event_id = %id, error = %e, "Runtime failure fed back to the agent");
                let observation = Observation::Failure {
                    reason: e.to_string(),
                    fatal: false,
                };
                self.append(EventDraft::observation(id, EventSource::Runtime, observation))
                    .await?;
                Ok(())
            }
        }
    }

    /// Condense until the view is within budget plus the condenser's slack.
    ///
    /// Returns `false` if the condenser is exhausted; the session has then
    /// moved to `ERROR`.
    async fn ensure_budget(&mut self) -> Result<bool, Error> {
        loop {
            let view = View::build(&self.state, &self.stream);
            if !self.condenser.should_condense(&view, &self.state) {
                return Ok(true);
            }

            let budget = self.state.budget;
            let slack = self.condenser.slack();
            let before = view.size(&budget);

            let summary = match self.condenser.condense(&view, &self.state).await {
                Ok(Condensation::Condensed(summary)) => summary,
                Ok(Condensation::Unchanged) if !budget.exceeded_by(before, slack) => return Ok(true),
                Ok(Condensation::Unchanged) => {
                    return self
                        .exhausted(format!(
                            "{} cannot reduce a view of size {before} below {}",
                            self.condenser.name(),
                            budget.limit().unwrap_or(before)
                        ))
                        .await;
                }
                Err(CondenserError::Exhausted { reason }) => return self.exhausted(reason).await,
            };

            let covered = summary.count();
            self.append(EventDraft::summary(summary)).await?;

            let condensed = View::build(&self.state, &self.stream);
            let after = condensed.size(&budget);
            info!(
                session_id = %self.state.session_id,
                condenser = self.condenser.name(),
                covered,
                before = view.len(),
                after = condensed.len(),
                "Active view condensed"
            );

            if condensed.len() >= view.len() && after >= before {
                return self
                    .exhausted(format!("{} did not shrink the view", self.condenser.name()))
                    .await;
            }
            if !budget.exceeded_by(after, slack) {
                return Ok(true);
            }
        }
    }

    async fn exhausted(&mut self, reason: String) -> Result<bool, Error> {
        let reason = SessionError::CondenserExhausted(reason);
        error!(session_id = %self.state.session_id, "{reason}");
        self.transition(ControllerStatus::Error, Some(reason.to_string()))
            .await?;
        Ok(false)
    }

    /// Block until something is appended or a stop is requested.
    async fn wait_for_input(&mut self) -> Result<(), Error> {
        let mut subscription = self.stream.subscribe();
        self.catch_up();
        if !self.state.status.is_suspended() || self.stop_requested() {
            return Ok(());
        }

        debug!(session_id = %self.state.session_id, status = %self.state.status, "Waiting for input");
        tokio::select! {
            event = subscription.recv() => {
                if event.is_none() {
                    return Err(SessionError::StreamClosed.into());
                }
            }
            _ = self.stop.changed() => {}
        }
        Ok(())
    }

    async fn transition(&mut self, status: ControllerStatus, reason: Option<String>) -> Result<(), Error> {
        info!(session_id = %self.state.session_id, from = %self.state.status, to = %status, "Status change");
        self.append(EventDraft::status(status, reason)).await?;
        Ok(())
    }

    async fn append(&mut self, draft: EventDraft) -> Result<EventId, Error> {
        let id = self.stream.append(draft).await?;
        self.catch_up();
        Ok(id)
    }

    /// Fold every event appended since the last fold.
    fn catch_up(&mut self) {
        for event in self.stream.replay(self.state.next_expected()) {
            self.state.apply(&event);
        }
    }

    fn stop_requested(&self) -> bool {
        *self.stop.borrow()
    }
}
