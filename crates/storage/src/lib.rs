//! Event log persistence backends for Causeway.

pub mod file_backend;
pub mod in_memory;
pub mod noop;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use file_backend::FileStore;
pub use in_memory::InMemoryStore;
pub use noop::NoopStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use std::sync::Arc;

use causeway_config::StorageConfig;
use causeway_core::error::StorageError;
use causeway_core::storage::EventStore;

/// Build the backend named by `config.backend`.
pub async fn from_config(config: &StorageConfig) -> Result<Arc<dyn EventStore>, StorageError> {
    let store: Arc<dyn EventStore> = match config.backend.as_str() {
        "memory" => Arc::new(InMemoryStore::new()),
        "none" => Arc::new(NoopStore),
        "file" => Arc::new(FileStore::new(config.resolved_path())),
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let path = config.resolved_path();
            Arc::new(SqliteStore::new(&format!("sqlite://{}", path.display())).await?)
        }
        other => {
            return Err(StorageError::Io(format!(
                "storage backend '{other}' is not available in this build"
            )));
        }
    };
    tracing::debug!(backend = store.name(), "Event store selected");
    Ok(store)
}
