//! Session management: bounded, per-key serialized chat histories.

pub mod in_memory;
pub mod registry;
pub mod sqlite;
pub mod store;
pub mod traits;

pub use in_memory::InMemoryHistoryStorage;
pub use registry::SessionRegistry;
pub use sqlite::SqliteHistoryStorage;
pub use store::{decode_history, SessionStore, DEFAULT_MAX_HISTORY};
pub use traits::{BlobUpdate, HistoryStorage, SessionError};

use crate::config::SessionsConfig;
use std::path::Path;
use std::sync::Arc;

/// Backend names accepted in `sessions.backend`.
pub const SUPPORTED_BACKENDS: &[&str] = &["sqlite", "memory"];

/// Factory: create the history storage backend named in config.
///
/// `data_dir` anchors the default SQLite path when `sessions.db_path` is unset.
pub fn create_history_storage(
    config: &SessionsConfig,
    data_dir: &Path,
) -> anyhow::Result<Arc<dyn HistoryStorage>> {
    match config.backend.trim().to_ascii_lowercase().as_str() {
        "sqlite" => {
            let path = config
                .db_path
                .clone()
                .unwrap_or_else(|| data_dir.join("sessions.db"));
            Ok(Arc::new(SqliteHistoryStorage::open(&path)?))
        }
        "memory" => Ok(Arc::new(InMemoryHistoryStorage::new())),
        other => anyhow::bail!(
            "Unknown session backend: {other}. Supported: {}",
            SUPPORTED_BACKENDS.join(", ")
        ),
    }
}

/// Create a registry over the configured backend.
pub fn create_session_registry(
    config: &SessionsConfig,
    data_dir: &Path,
) -> anyhow::Result<SessionRegistry> {
    let storage = create_history_storage(config, data_dir)?;
    Ok(SessionRegistry::new(storage, config.max_history))
}
