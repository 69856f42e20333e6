//! End-to-end integration tests for the Causeway orchestration core.
//!
//! These tests drive whole sessions: scripted agent → safety gate →
//! runtime → event stream → condenser, and check the traces they leave.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use causeway_agent::{
    Condensation, Condenser, Controller, RecentCondenser, Script, ScriptedAgent, SessionBuilder,
};
use causeway_config::AppConfig;
use causeway_core::error::{RuntimeError, SafetyError};
use causeway_core::event::{
    Action, EventDraft, EventId, EventKind, EventSource, GateStatus, Observation, RejectionOrigin,
};
use causeway_core::runtime::Runtime;
use causeway_core::safety::{ActionInspector, Assessment, RiskLevel, Verdict};
use causeway_core::state::{Budget, ControllerStatus, Limits, SessionId, State};
use causeway_core::storage::EventStore;
use causeway_core::stream::EventStream;
use causeway_core::view::View;
use causeway_security::{AuditLogger, SafetyGate};
use causeway_storage::FileStore;

// ── Mock Runtime ─────────────────────────────────────────────────────────

/// A runtime that returns scripted results in sequence, then echoes.
struct ScriptedRuntime {
    results: Mutex<Vec<Result<Observation, RuntimeError>>>,
    calls: Mutex<Vec<Action>>,
}

impl ScriptedRuntime {
    fn new(results: Vec<Result<Observation, RuntimeError>>) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(results),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn echo() -> Arc<Self> {
        Self::new(vec![])
    }

    fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Runtime for ScriptedRuntime {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn execute(&self, action: &Action) -> Result<Observation, RuntimeError> {
        self.calls.lock().unwrap().push(action.clone());
        let mut results = self.results.lock().unwrap();
        if results.is_empty() {
            Ok(Observation::output(format!("ok: {}", action.describe())))
        } else {
            results.remove(0)
        }
    }
}

/// An inspector with a fixed opinion.
struct Fixed(Verdict, &'static str);

#[async_trait]
impl ActionInspector for Fixed {
    fn name(&self) -> &str {
        self.1
    }

    async fn inspect(&self, _: &Action, _: &State) -> Result<Assessment, SafetyError> {
        Ok(match self.0 {
            Verdict::Allow => Assessment::allow(RiskLevel::Low),
            verdict => Assessment::new(verdict, RiskLevel::High, self.1),
        })
    }
}

fn run(command: &str) -> Action {
    Action::Run {
        command: command.into(),
    }
}

fn scripted(task: &str, steps: Vec<Action>) -> Arc<ScriptedAgent> {
    Arc::new(ScriptedAgent::new(Script {
        task: task.into(),
        steps,
        finish: Some("done".into()),
    }))
}

async fn new_session(task: &str) -> EventStream {
    let stream = EventStream::new(SessionId::new());
    stream.append(EventDraft::user_message(task)).await.unwrap();
    stream
}

fn limits(max_iterations: u32, budget: Budget) -> Limits {
    Limits {
        max_iterations,
        budget,
    }
}

fn no_adjacent_actions(stream: &EventStream) -> bool {
    let kinds: Vec<EventKind> = stream.snapshot().iter().map(|e| e.kind()).collect();
    kinds
        .windows(2)
        .all(|w| !(w[0] == EventKind::Action && w[1] == EventKind::Action))
}

/// root, then `pairs` action/observation pairs chained by cause.
async fn trace(pairs: usize) -> EventStream {
    let stream = new_session("fix the build").await;
    let mut last = EventId::ROOT;
    for i in 1..=pairs {
        let action = stream
            .append(EventDraft::action(
                Some(last),
                run(&format!("step {i}")),
                GateStatus::Allowed,
                RiskLevel::Low,
            ))
            .await
            .unwrap();
        last = stream
            .append(EventDraft::observation(
                action,
                EventSource::Runtime,
                Observation::output(format!("out {i}")),
            ))
            .await
            .unwrap();
    }
    stream
}

fn fold(stream: &EventStream, limits: Limits) -> State {
    let log = stream.snapshot();
    State::replay(stream.session_id().clone(), limits, log.iter().map(|e| e.as_ref()))
}

async fn condense(stream: &EventStream, state: &mut State, condenser: &dyn Condenser) -> View {
    let view = View::build(state, stream);
    if let Condensation::Condensed(summary) = condenser.condense(&view, state).await.unwrap() {
        stream.append(EventDraft::summary(summary)).await.unwrap();
        for event in stream.replay(state.next_expected()) {
            state.apply(&event);
        }
    }
    View::build(state, stream)
}

// ── E2E: Event Stream ────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_replay_yields_every_event_without_gaps() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn EventStore> = Arc::new(FileStore::new(dir.path().to_path_buf()));
    let id = SessionId::from("durable");

    let stream = EventStream::with_store(id.clone(), store.clone());
    for i in 0..40 {
        stream
            .append(EventDraft::user_message(format!("message {i}")))
            .await
            .unwrap();
    }

    let ids: Vec<u64> = stream.replay(EventId::ROOT).map(|e| e.id.0).collect();
    assert_eq!(ids, (0..40).collect::<Vec<_>>());

    // The same log, reopened from disk.
    let reopened = EventStream::open(id, store, 16).await.unwrap();
    let ids: Vec<u64> = reopened.replay(EventId::ROOT).map(|e| e.id.0).collect();
    assert_eq!(ids, (0..40).collect::<Vec<_>>());
    assert_eq!(reopened.replay(EventId(35)).count(), 5);
}

// ── E2E: Condensation ────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_recent_condenses_ten_events_to_five() {
    // root, 4 pairs, one more user message: 10 events
    let stream = trace(4).await;
    stream
        .append(EventDraft::user_message("and run the tests"))
        .await
        .unwrap();
    let mut state = fold(&stream, limits(100, Budget::Events(5)));
    assert_eq!(state.history.len(), 10);

    let view = condense(&stream, &mut state, &RecentCondenser::new(1, 5)).await;
    assert!(view.len() <= 5);
    let first = &view.events()[0];
    assert!(first.id == EventId::ROOT || first.kind() == EventKind::Summary);
    assert!(view.causally_closed());
    assert!(view.is_ordered());
}

#[tokio::test]
async fn e2e_condensing_a_minimal_history_is_a_noop() {
    let stream = trace(2).await;
    let mut state = fold(&stream, limits(100, Budget::Events(10)));
    let before = View::build(&state, &stream);

    let after = condense(&stream, &mut state, &RecentCondenser::new(1, 10)).await;
    assert_eq!(after, before);
    assert_eq!(stream.len(), 5);
}

#[tokio::test]
async fn e2e_nine_events_into_four() {
    // budget 6, recent(keep_first = 1, max_size = 4)
    let stream = trace(4).await;
    let mut state = fold(&stream, limits(100, Budget::Events(6)));
    assert_eq!(state.history.len(), 9);

    let view = condense(&stream, &mut state, &RecentCondenser::new(1, 4)).await;
    let ids = view.ids();
    assert_eq!(ids.len(), 4);
    assert_eq!(ids[0], EventId::ROOT);
    assert_eq!(view.events()[1].kind(), EventKind::Summary);
    assert_eq!(&ids[2..], &[EventId(7), EventId(8)]);

    let summary = view.events()[1].as_summary().unwrap();
    assert_eq!(summary.covered, (1..=6).map(EventId).collect::<Vec<_>>());

    // a4 pointed at o3, which the summary absorbed.
    assert_eq!(view.events()[2].cause, Some(ids[1]));
    // o4 still points at a4.
    assert_eq!(view.events()[3].cause, Some(EventId(7)));
    // The canonical log is untouched.
    assert_eq!(stream.get(EventId(7)).unwrap().cause, Some(EventId(6)));
}

// ── E2E: Safety Gate ─────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_gate_composition_more_restrictive_wins() {
    let state = State::new(SessionId::from("gate"), Limits::default());
    let action = run("make install");

    let gate = SafetyGate::new(Arc::new(AuditLogger::new()))
        .with_inspector(Arc::new(Fixed(Verdict::RequireConfirmation, "analyzer")))
        .with_inspector(Arc::new(Fixed(Verdict::Allow, "policy")));
    assert_eq!(
        gate.inspect(&action, &state).await.unwrap().verdict,
        Verdict::RequireConfirmation
    );

    for other in [Verdict::Allow, Verdict::RequireConfirmation, Verdict::Reject] {
        let gate = SafetyGate::new(Arc::new(AuditLogger::new()))
            .with_inspector(Arc::new(Fixed(Verdict::Reject, "analyzer")))
            .with_inspector(Arc::new(Fixed(other, "policy")));
        assert_eq!(gate.inspect(&action, &state).await.unwrap().verdict, Verdict::Reject);
    }
}

// ── E2E: Controller ──────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_no_two_actions_without_an_observation() {
    let mut config = AppConfig::default();
    config.controller.budget = Budget::Events(8);
    config.condenser = causeway_config::CondenserConfig::Recent {
        keep_first: 1,
        max_size: 5,
    };

    // A mix of allowed, rejected and failing steps.
    let steps = vec![
        run("ls"),
        run("rm -rf /"),
        run("cat missing.txt"),
        run("make"),
        run("mkfs.ext4 /dev/sda1"),
        run("make test"),
        run("git status"),
    ];
    let runtime = ScriptedRuntime::new(vec![
        Ok(Observation::output("src")),
        Err(RuntimeError::Recoverable("no such file".into())),
    ]);
    let handle = SessionBuilder::new(config, scripted("mixed", steps), runtime.clone())
        .start(Some("mixed"))
        .await
        .unwrap();

    assert_eq!(handle.wait().await.unwrap(), ControllerStatus::Finished);
    assert!(no_adjacent_actions(handle.stream()));
    // Two destructive commands never reached the runtime.
    assert_eq!(runtime.calls(), 5);
    assert_eq!(handle.state().iteration, 7);
    assert!(
        handle
            .stream()
            .snapshot()
            .iter()
            .any(|e| e.kind() == EventKind::Summary)
    );
}

#[tokio::test]
async fn e2e_fatal_runtime_failure_stops_the_session() {
    let stream = new_session("write the report").await;
    let runtime = ScriptedRuntime::new(vec![Err(RuntimeError::Fatal("disk full".into()))]);
    let agent = scripted("write", vec![run("save report"), run("save again")]);
    let mut controller = Controller::new(stream.clone(), limits(10, Budget::Unbounded), agent, runtime.clone());

    assert_eq!(controller.run().await.unwrap(), ControllerStatus::Error);
    assert_eq!(controller.state().last_error.as_deref(), Some("disk full"));
    assert_eq!(runtime.calls(), 1);

    let actions = stream
        .snapshot()
        .iter()
        .filter(|e| e.kind() == EventKind::Action)
        .count();
    assert_eq!(actions, 1);
    // The log is preserved and closed for postmortem replay.
    assert!(stream.is_closed());
    assert_eq!(fold(&stream, limits(10, Budget::Unbounded)).last_error.as_deref(), Some("disk full"));
}

#[tokio::test]
async fn e2e_confirmation_rejection_never_reaches_the_runtime() {
    let mut config = AppConfig::default();
    config.security.confirmation_mode = true;
    config.security.confirmation_threshold = RiskLevel::High;

    let runtime = ScriptedRuntime::echo();
    let steps = vec![run("rm -rf build"), run("ls")];
    let handle = SessionBuilder::new(config, scripted("clean", steps), runtime.clone())
        .start(Some("clean"))
        .await
        .unwrap();

    let mut events = handle.subscribe();
    let (pending, action) = loop {
        if let Some(pending) = handle.pending_action() {
            break pending;
        }
        events.recv().await.unwrap();
    };
    assert_eq!(action, run("rm -rf build"));
    assert_eq!(handle.status(), ControllerStatus::AwaitingConfirmation);

    handle
        .reject(pending, Some("keep the build".into()))
        .await
        .unwrap();
    assert_eq!(handle.wait().await.unwrap(), ControllerStatus::Finished);

    // Only the follow-up `ls` ran.
    assert_eq!(runtime.calls(), 1);

    let log = handle.stream().snapshot();
    let rejection = log
        .iter()
        .find(|e| {
            matches!(
                e.as_observation(),
                Some(Observation::Rejected { origin: RejectionOrigin::User, .. })
            )
        })
        .unwrap();
    assert_eq!(rejection.cause, Some(pending));

    // Right after the rejection the session was RUNNING again.
    let state = State::replay(
        handle.id().clone(),
        Limits::default(),
        log.iter().take(rejection.id.0 as usize + 1).map(|e| e.as_ref()),
    );
    assert_eq!(state.status, ControllerStatus::Running);
    assert_eq!(state.iteration, 1);
}

#[tokio::test]
async fn e2e_persisted_session_replays_to_the_same_state() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn EventStore> = Arc::new(FileStore::new(dir.path().to_path_buf()));
    let mut config = AppConfig::default();
    config.controller.budget = Budget::Events(6);
    config.condenser = causeway_config::CondenserConfig::Recent {
        keep_first: 1,
        max_size: 4,
    };

    let steps: Vec<Action> = (0..6).map(|i| run(&format!("step {i}"))).collect();
    let handle = SessionBuilder::new(config.clone(), scripted("long", steps), ScriptedRuntime::echo())
        .session_id(SessionId::from("persisted"))
        .with_store(store.clone())
        .start(Some("long"))
        .await
        .unwrap();
    assert_eq!(handle.wait().await.unwrap(), ControllerStatus::Finished);
    let live = handle.state();

    let reopened = EventStream::open(SessionId::from("persisted"), store, 16).await.unwrap();
    let replayed = fold(&reopened, config.controller.limits());
    assert_eq!(replayed.status, live.status);
    assert_eq!(replayed.iteration, live.iteration);
    assert_eq!(replayed.history, live.history);
    assert_eq!(
        View::build(&replayed, &reopened),
        View::build(&live, handle.stream())
    );
}

// ── E2E: CLI ─────────────────────────────────────────────────────────────

/// Write a config storing sessions under `dir` and a script, then run
/// `causeway run --yes` against them, failing if it does not exit.
async fn run_cli(dir: &std::path::Path, session: &str, script: &str, config: &str) -> String {
    let config_path = dir.join("config.toml");
    let script_path = dir.join("script.toml");
    let sessions = dir.join("sessions");
    std::fs::write(
        &config_path,
        format!("{config}\n[storage]\nbackend = \"file\"\npath = {:?}\n", sessions.display().to_string()),
    )
    .unwrap();
    std::fs::write(&script_path, script).unwrap();

    let child = tokio::process::Command::new(env!("CARGO_BIN_EXE_causeway"))
        .arg("--config")
        .arg(&config_path)
        .args(["run", "--yes", "--session", session, "--script"])
        .arg(&script_path)
        .env_remove("CAUSEWAY_CONFIG")
        .env_remove("CAUSEWAY_STORAGE_PATH")
        .env_remove("CAUSEWAY_CONFIRMATION_MODE")
        .env_remove("CAUSEWAY_MAX_ITERATIONS")
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .unwrap();
    let output = tokio::time::timeout(std::time::Duration::from_secs(30), child.wait_with_output())
        .await
        .expect("causeway run did not exit")
        .unwrap();
    assert!(
        output.status.success(),
        "causeway run failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

const CLEAN_SCRIPT: &str = r#"
task = "clean the build"

[[steps]]
type = "run"
command = "rm -rf build"
"#;

#[tokio::test]
async fn e2e_cli_approves_a_deferred_first_action() {
    let dir = tempfile::tempdir().unwrap();
    let stdout = run_cli(dir.path(), "fresh", CLEAN_SCRIPT, "[security]\nconfirmation_mode = true\n").await;
    assert!(stdout.contains("FINISHED"), "{stdout}");

    let store = FileStore::new(dir.path().join("sessions"));
    let log = store.load_since(&SessionId::from("fresh"), EventId::ROOT).await.unwrap();
    let state = State::replay(SessionId::from("fresh"), Limits::default(), &log);
    assert_eq!(state.status, ControllerStatus::Finished);
    assert_eq!(state.iteration, 1);
}

#[tokio::test]
async fn e2e_cli_resumes_a_session_awaiting_confirmation() {
    let dir = tempfile::tempdir().unwrap();
    let id = SessionId::from("resumed");
    let store: Arc<dyn EventStore> = Arc::new(FileStore::new(dir.path().join("sessions")));

    // A previous run stopped while the action waited for an answer.
    let stream = EventStream::with_store(id.clone(), store.clone());
    let task = stream.append(EventDraft::user_message("clean the build")).await.unwrap();
    stream
        .append(EventDraft::action(
            Some(task),
            run("rm -rf build"),
            GateStatus::AwaitingConfirmation,
            RiskLevel::High,
        ))
        .await
        .unwrap();
    drop(stream);

    let stdout = run_cli(dir.path(), "resumed", CLEAN_SCRIPT, "[security]\nconfirmation_mode = true\n").await;
    assert!(stdout.contains("(resumed)"), "{stdout}");
    assert!(stdout.contains("Pending confirmation"), "{stdout}");

    let log = store.load_since(&id, EventId::ROOT).await.unwrap();
    let state = State::replay(id, Limits::default(), &log);
    assert_eq!(state.status, ControllerStatus::Finished);
    assert!(matches!(
        log[2].payload,
        causeway_core::event::EventPayload::Confirmation(_)
    ));
    assert!(log.iter().any(|e| e.cause == Some(EventId(1)) && e.kind() == EventKind::Observation));
}

#[cfg(unix)]
#[tokio::test]
async fn e2e_cli_interrupt_at_the_prompt_stops_the_session() {
    use tokio::io::AsyncReadExt;

    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    let script_path = dir.path().join("script.toml");
    let sessions = dir.path().join("sessions");
    std::fs::write(
        &config_path,
        format!(
            "[security]\nconfirmation_mode = true\n[storage]\nbackend = \"file\"\npath = {:?}\n",
            sessions.display().to_string()
        ),
    )
    .unwrap();
    std::fs::write(&script_path, CLEAN_SCRIPT).unwrap();

    // No --yes, and stdin stays open: the prompt waits for an answer.
    let mut child = tokio::process::Command::new(env!("CARGO_BIN_EXE_causeway"))
        .arg("--config")
        .arg(&config_path)
        .args(["run", "--session", "prompted", "--script"])
        .arg(&script_path)
        .env_remove("CAUSEWAY_CONFIG")
        .env_remove("CAUSEWAY_STORAGE_PATH")
        .env_remove("CAUSEWAY_CONFIRMATION_MODE")
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .unwrap();

    let mut stdout = child.stdout.take().unwrap();
    let mut seen = String::new();
    tokio::time::timeout(std::time::Duration::from_secs(30), async {
        let mut buf = [0u8; 1024];
        while !seen.contains("Approve?") {
            let n = stdout.read(&mut buf).await.unwrap();
            assert!(n > 0, "causeway exited before prompting: {seen}");
            seen.push_str(&String::from_utf8_lossy(&buf[..n]));
        }
    })
    .await
    .expect("no confirmation prompt");
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let pid = child.id().unwrap().to_string();
    let killed = std::process::Command::new("kill").args(["-INT", &pid]).status().unwrap();
    assert!(killed.success());

    let status = tokio::time::timeout(std::time::Duration::from_secs(30), child.wait())
        .await
        .expect("causeway ignored ctrl-c at the prompt")
        .unwrap();
    assert!(status.success());

    let store = FileStore::new(sessions);
    let log = store.load_since(&SessionId::from("prompted"), EventId::ROOT).await.unwrap();
    let state = State::replay(SessionId::from("prompted"), Limits::default(), &log);
    assert_eq!(state.status, ControllerStatus::Stopped);
}
