//! File-based event store — one JSON-lines log per session.
//!
//! Each line is a JSON-encoded `Event`. Lines are only ever appended, so
//! a log is human-inspectable and survives partial writes: a torn or
//! corrupted line is skipped on load rather than failing the session, and
//! the next append starts on a fresh line instead of extending the fragment.
//!
//! Storage location: `~/.causeway/sessions/<session-id>.jsonl`

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use causeway_core::error::StorageError;
use causeway_core::event::{Event, EventId};
use causeway_core::state::SessionId;
use causeway_core::storage::EventStore;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub struct FileStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// A store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: PathBuf) -> Self {
        debug!(dir = %dir.display(), "File event store opened");
        Self {
            dir,
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn log_path(&self, session: &SessionId) -> Result<PathBuf, StorageError> {
        let name = &session.0;
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !name.starts_with('.');
        if !valid {
            return Err(StorageError::Io(format!(
                "session id '{name}' cannot be used as a file name"
            )));
        }
        Ok(self.dir.join(format!("{name}.jsonl")))
    }

    fn parse_log(content: &str, from: EventId) -> Vec<Event> {
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<Event>(line) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(error = %e, "Skipping corrupted event line");
                    None
                }
            })
            .filter(|event| event.id >= from)
            .collect()
    }
}

/// Whether a non-empty log is missing its trailing newline.
async fn ends_torn(file: &mut tokio::fs::File) -> Result<bool, StorageError> {
    let io = |e: std::io::Error| StorageError::Io(format!("Failed to inspect event log: {e}"));
    let len = file.metadata().await.map_err(io)?.len();
    if len == 0 {
        return Ok(false);
    }
    file.seek(std::io::SeekFrom::Start(len - 1)).await.map_err(io)?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).await.map_err(io)?;
    Ok(last[0] != b'\n')
}

#[async_trait]
impl EventStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn append(&self, session: &SessionId, event: &Event) -> Result<(), StorageError> {
        let path = self.log_path(session)?;
        let mut line = serde_json::to_string(event)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StorageError::Io(format!("Failed to create session directory: {e}")))?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StorageError::Io(format!("Failed to open {}: {e}", path.display())))?;
        if ends_torn(&mut file).await? {
            warn!(path = %path.display(), "Event log ends in a torn line; starting a new one");
            line.insert(0, '\n');
        }
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| StorageError::Io(format!("Failed to write event: {e}")))?;
        file.sync_data()
            .await
            .map_err(|e| StorageError::Io(format!("Failed to sync event log: {e}")))?;
        Ok(())
    }

    async fn load_since(
        &self,
        session: &SessionId,
        from: EventId,
    ) -> Result<Vec<Event>, StorageError> {
        let path = self.log_path(session)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StorageError::Io(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };
        Ok(Self::parse_log(&content, from))
    }

    async fn sessions(&self) -> Result<Vec<SessionId>, StorageError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::Io(e.to_string())),
        };

        let mut sessions = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::Io(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "jsonl") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    sessions.push(SessionId::from(stem));
                }
            }
        }
        sessions.sort();
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use causeway_core::event::{Action, EventDraft, GateStatus};
    use causeway_core::safety::RiskLevel;
    use chrono::Utc;
    use std::io::Write;
    use tempfile::TempDir;

    fn event(id: u64) -> Event {
        EventDraft::action(
            None,
            Action::Run {
                command: format!("echo {id}"),
            },
            GateStatus::Allowed,
            RiskLevel::Low,
        )
        .into_event(EventId(id), Utc::now())
    }

    #[tokio::test]
    async fn append_and_reload() {
        let tmp = TempDir::new().unwrap();
        let session = SessionId::from("session-1");

        {
            let store = FileStore::new(tmp.path().to_path_buf());
            for i in 0..4 {
                store.append(&session, &event(i)).await.unwrap();
            }
        }

        // Reopen; events persist
        let store = FileStore::new(tmp.path().to_path_buf());
        let loaded = store.load_since(&session, EventId::ROOT).await.unwrap();
        assert_eq!(loaded.len(), 4);
        assert_eq!(loaded[3].payload, event(3).payload);

        let tail = store.load_since(&session, EventId(2)).await.unwrap();
        assert_eq!(tail.iter().map(|e| e.id).collect::<Vec<_>>(), vec![EventId(2), EventId(3)]);
    }

    #[tokio::test]
    async fn missing_log_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join("never-created"));
        assert!(store
            .load_since(&SessionId::from("x"), EventId::ROOT)
            .await
            .unwrap()
            .is_empty());
        assert!(store.sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupted_lines_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().to_path_buf());
        let session = SessionId::from("s");
        store.append(&session, &event(0)).await.unwrap();

        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(tmp.path().join("s.jsonl"))
            .unwrap();
        writeln!(file, "{{not valid json").unwrap();
        drop(file);

        store.append(&session, &event(1)).await.unwrap();
        let loaded = store.load_since(&session, EventId::ROOT).await.unwrap();
        assert_eq!(loaded.len(), 2);
    }

    #[tokio::test]
    async fn torn_tail_does_not_swallow_the_next_event() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().to_path_buf());
        let session = SessionId::from("torn");
        store.append(&session, &event(0)).await.unwrap();

        // A crash mid-append leaves a fragment without its newline.
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(tmp.path().join("torn.jsonl"))
            .unwrap();
        write!(file, "{{\"id\":1,\"tim").unwrap();
        drop(file);

        store.append(&session, &event(1)).await.unwrap();
        store.append(&session, &event(2)).await.unwrap();
        let ids: Vec<u64> = store
            .load_since(&session, EventId::ROOT)
            .await
            .unwrap()
            .iter()
            .map(|e| e.id.0)
            .collect();
        assert_eq!(ids, vec![0, 1, 2]);

        // The log still resumes without a gap.
        let store: std::sync::Arc<dyn EventStore> = std::sync::Arc::new(store);
        let stream = causeway_core::stream::EventStream::open(session, store, 16)
            .await
            .unwrap();
        assert_eq!(stream.len(), 3);
    }

    #[tokio::test]
    async fn lists_sessions() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().to_path_buf());
        store.append(&SessionId::from("b"), &event(0)).await.unwrap();
        store.append(&SessionId::from("a"), &event(0)).await.unwrap();
        assert_eq!(
            store.sessions().await.unwrap(),
            vec![SessionId::from("a"), SessionId::from("b")]
        );
    }

    #[tokio::test]
    async fn rejects_path_like_session_ids() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().to_path_buf());
        let result = store.append(&SessionId::from("../escape"), &event(0)).await;
        assert!(matches!(result, Err(StorageError::Io(_))));
    }
}
