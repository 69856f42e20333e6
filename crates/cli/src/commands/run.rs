//! `causeway run` — Run a scripted session, confirming actions on stdin.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use causeway_agent::{DryRunRuntime, Script, ScriptedAgent, SessionBuilder, SessionHandle};
use causeway_config::AppConfig;
use causeway_core::event::{Event, EventId, GateStatus};
use causeway_core::state::SessionId;
use causeway_security::{AuditLogger, AuditOutcome, TracingSink};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

pub async fn run(
    config: AppConfig,
    script_path: &Path,
    session: Option<String>,
    auto_approve: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let script = Script::load(script_path)?;
    let store = causeway_storage::from_config(&config.storage).await?;
    let id = session.map(SessionId).unwrap_or_default();

    // A resumed session already has its task.
    let resuming = !store.load_since(&id, EventId::ROOT).await?.is_empty();
    let task = (!resuming).then(|| script.task.clone());

    let audit = Arc::new(AuditLogger::with_sinks(vec![Box::new(TracingSink)]));
    let handle = SessionBuilder::new(config, Arc::new(ScriptedAgent::new(script)), Arc::new(DryRunRuntime))
        .session_id(id.clone())
        .with_store(store)
        .with_audit(audit.clone())
        .start(task.as_deref())
        .await?;

    println!("Session {id}{}", if resuming { " (resumed)" } else { "" });
    println!();

    let mut events = handle.subscribe();
    for event in handle
        .stream()
        .replay(EventId::ROOT)
        .take_while(|e| e.id < events.position())
    {
        print_event(&event);
    }

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stopping = false;
    let mut answered = None;

    // A resumed session (or one whose first action was deferred before we
    // subscribed) may already be waiting on a confirmation.
    if let Some((id, action)) = handle.pending_action() {
        println!("  Pending confirmation: action {id} {}", action.describe());
        answered = Some(id);
        stopping = !answer(&handle, id, auto_approve, &mut stdin).await?;
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                print_event(&event);

                let awaiting = matches!(
                    event.as_action().map(|a| &a.gate),
                    Some(GateStatus::AwaitingConfirmation)
                );
                if !awaiting || stopping || answered == Some(event.id) {
                    continue;
                }
                answered = Some(event.id);
                stopping = !answer(&handle, event.id, auto_approve, &mut stdin).await?;
            }
            _ = tokio::signal::ctrl_c(), if !stopping => {
                eprintln!("  Stopping after the current step...");
                handle.stop();
                stopping = true;
            }
        }
    }

    let status = handle.wait().await?;
    let state = handle.state();
    println!();
    println!("  Status:     {status}");
    println!("  Iterations: {}", state.iteration);
    if let Some(error) = &state.last_error {
        println!("  Error:      {error}");
    }
    println!(
        "  Gate:       {} allowed, {} deferred, {} denied",
        audit.entries_by_outcome(AuditOutcome::Allowed).len(),
        audit.entries_by_outcome(AuditOutcome::Deferred).len(),
        audit.entries_by_outcome(AuditOutcome::Denied).len()
    );
    Ok(())
}

/// Approve or reject `action`. Returns `false` if ctrl-c interrupted the
/// prompt, in which case the session has been asked to stop.
async fn answer(
    handle: &SessionHandle,
    action: EventId,
    auto_approve: bool,
    stdin: &mut Lines<BufReader<Stdin>>,
) -> Result<bool, Box<dyn std::error::Error>> {
    let approved = if auto_approve {
        true
    } else {
        print!("  Approve? [y/N] ");
        std::io::stdout().flush()?;
        tokio::select! {
            line = stdin.next_line() => {
                let answer = line?.unwrap_or_default();
                matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
            }
            _ = tokio::signal::ctrl_c() => {
                eprintln!();
                eprintln!("  Stopping without answering...");
                handle.stop();
                return Ok(false);
            }
        }
    };
    if approved {
        handle.confirm(action).await?;
    } else {
        handle.reject(action, Some("declined at the prompt".into())).await?;
    }
    Ok(true)
}

fn print_event(event: &Event) {
    println!("  {}", event.render());
}
