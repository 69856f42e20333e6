//! SQLite event store.
//!
//! One table keyed by `(session_id, id)`. The primary key rejects a second
//! event with the same id, which keeps a log contiguous even if two
//! processes share a database file.

use std::str::FromStr;

use async_trait::async_trait;
use causeway_core::error::StorageError;
use causeway_core::event::{Event, EventId};
use causeway_core::state::SessionId;
use causeway_core::storage::EventStore;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `url`, e.g. `sqlite:///var/lib/causeway.db`.
    pub async fn new(url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StorageError::Io(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Io(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite event store initialized at {url}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StorageError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                session_id  TEXT NOT NULL,
                id          INTEGER NOT NULL,
                kind        TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                body        TEXT NOT NULL,
                PRIMARY KEY (session_id, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Migration(format!("events table: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<Event, StorageError> {
        let body: String = row
            .try_get("body")
            .map_err(|e| StorageError::Query(format!("body column: {e}")))?;
        serde_json::from_str(&body).map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl EventStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn append(&self, session: &SessionId, event: &Event) -> Result<(), StorageError> {
        let body =
            serde_json::to_string(event).map_err(|e| StorageError::Serialization(e.to_string()))?;
        let kind = serde_json::to_value(event.kind())
            .ok()
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_default();

        sqlx::query(
            "INSERT INTO events (session_id, id, kind, created_at, body) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&session.0)
        .bind(event.id.0 as i64)
        .bind(&kind)
        .bind(event.timestamp.to_rfc3339())
        .bind(&body)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Query(format!("INSERT failed: {e}")))?;

        Ok(())
    }

    async fn load_since(
        &self,
        session: &SessionId,
        from: EventId,
    ) -> Result<Vec<Event>, StorageError> {
        let rows = sqlx::query("SELECT body FROM events WHERE session_id = ?1 AND id >= ?2 ORDER BY id ASC")
            .bind(&session.0)
            .bind(from.0 as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Query(format!("SELECT failed: {e}")))?;

        rows.iter().map(Self::row_to_event).collect()
    }

    async fn sessions(&self) -> Result<Vec<SessionId>, StorageError> {
        let rows = sqlx::query("SELECT DISTINCT session_id FROM events ORDER BY session_id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Query(format!("SELECT failed: {e}")))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("session_id")
                    .map(SessionId)
                    .map_err(|e| StorageError::Query(format!("session_id column: {e}")))
            })
            .collect()
    }
}
