//! `causeway replay` — Rebuild a stored session's state from its log.

use causeway_config::AppConfig;
use causeway_core::state::{SessionId, State};
use causeway_core::stream::EventStream;
use causeway_core::view::View;

pub async fn run(config: AppConfig, session: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = causeway_storage::from_config(&config.storage).await?;
    let id = SessionId::from(session);
    let stream = EventStream::open(id.clone(), store, config.stream.subscriber_capacity).await?;
    if stream.is_empty() {
        return Err(format!("No events stored for session {session}").into());
    }

    let log = stream.snapshot();
    let state = State::replay(id, config.controller.limits(), log.iter().map(|e| e.as_ref()));
    let view = View::build(&state, &stream);

    println!("Session {session}");
    println!("==========={}", "=".repeat(session.len()));
    println!("  Status:      {}", state.status);
    println!("  Iterations:  {}", state.iteration);
    if let Some(error) = &state.last_error {
        println!("  Last error:  {error}");
    }
    if let Some(pending) = state.pending.as_ref().filter(|p| p.resolution.is_none()) {
        println!("  Pending:     action {}", pending.action);
    }
    println!("  Events:      {}", stream.len());
    println!(
        "  Active view: {} events (~{} tokens)",
        view.len(),
        view.estimated_tokens()
    );
    println!();
    for event in &view {
        println!("  {}", event.render());
    }
    Ok(())
}
