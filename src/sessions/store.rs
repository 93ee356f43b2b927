//! Per-key session store: the single writer for one session's history.

use anyhow::Context;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::traits::{HistoryStorage, SessionError};

/// Default number of messages retained per session.
pub const DEFAULT_MAX_HISTORY: usize = 10;

/// Owns the bounded history of exactly one session key.
///
/// Every mutation runs under `write_lock`, so concurrent `append` calls on
/// the same instance queue instead of racing; the read-modify-write itself
/// goes through [`HistoryStorage::update`], which keeps it atomic against
/// other processes sharing the backend. Obtain instances through
/// [`SessionRegistry`](super::SessionRegistry) so that one key never has two
/// live instances.
pub struct SessionStore {
    key: String,
    storage: Arc<dyn HistoryStorage>,
    max_history: usize,
    write_lock: Mutex<()>,
}

impl SessionStore {
    pub fn new(key: &str, storage: Arc<dyn HistoryStorage>, max_history: usize) -> Self {
        Self {
            key: key.to_string(),
            storage,
            max_history: max_history.max(1),
            write_lock: Mutex::new(()),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// Append `message`, trim to the most recent `max_history` entries,
    /// persist the full result, and return it.
    pub async fn append(&self, message: &str) -> Result<Vec<String>, SessionError> {
        if message.is_empty() {
            return Err(SessionError::InvalidInput(
                "message must not be empty".to_string(),
            ));
        }

        let _guard = self.write_lock.lock().await;

        let max_history = self.max_history;
        let message = message.to_string();
        let blob = self
            .storage
            .update(
                &self.key,
                Box::new(move |current: Option<&[u8]>| -> anyhow::Result<Vec<u8>> {
                    let mut history = match current {
                        Some(bytes) => decode_history(bytes)?,
                        None => Vec::new(),
                    };
                    history.push(message);
                    truncate_front(&mut history, max_history);
                    serde_json::to_vec(&history).context("failed to encode history")
                }),
            )
            .await
            .map_err(|e| SessionError::StorageUnavailable(format!("{e:#}")))?;
        let history = decode_history(&blob)?;

        tracing::debug!(
            session_id = %self.key,
            history_len = history.len(),
            backend = self.storage.name(),
            "Session history appended"
        );

        Ok(history)
    }

    /// Current persisted history (empty if the session has never been written).
    pub async fn history(&self) -> Result<Vec<String>, SessionError> {
        self.load().await
    }

    async fn load(&self) -> Result<Vec<String>, SessionError> {
        let blob = self
            .storage
            .get(&self.key)
            .await
            .map_err(|e| SessionError::StorageUnavailable(format!("{e:#}")))?;

        match blob {
            Some(bytes) => decode_history(&bytes),
            None => Ok(Vec::new()),
        }
    }
}

/// Decode a persisted history blob (a JSON array of strings).
pub fn decode_history(bytes: &[u8]) -> Result<Vec<String>, SessionError> {
    serde_json::from_slice(bytes).map_err(|e| {
        SessionError::StorageUnavailable(format!("stored history is not a string array: {e}"))
    })
}

/// Drop entries from the front until at most `max` remain.
fn truncate_front(history: &mut Vec<String>, max: usize) {
    if history.len() > max {
        let excess = history.len() - max;
        history.drain(..excess);
    }
}
