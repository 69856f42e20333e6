//! `causeway events` — Dump a stored session's events as JSON lines.

use causeway_config::AppConfig;
use causeway_core::event::EventId;
use causeway_core::state::SessionId;

pub async fn run(config: AppConfig, session: &str, from: u64) -> Result<(), Box<dyn std::error::Error>> {
    let store = causeway_storage::from_config(&config.storage).await?;
    let events = store
        .load_since(&SessionId::from(session), EventId(from))
        .await?;
    if events.is_empty() {
        eprintln!("No events stored for session {session} from id {from}");
    }
    for event in &events {
        println!("{}", serde_json::to_string(event)?);
    }
    Ok(())
}
