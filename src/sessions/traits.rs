//! Session storage traits and error types.

use anyhow::Result;
use async_trait::async_trait;

/// Errors surfaced by a [`SessionStore`](super::SessionStore).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The caller handed us something we refuse to persist (e.g. an empty message).
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The durable backend could not be read or written, or held an undecodable blob.
    #[error("session storage unavailable: {0}")]
    StorageUnavailable(String),
}

/// Read-modify-write step applied by [`HistoryStorage::update`]: receives the
/// current blob (if any) and returns the blob to store.
pub type BlobUpdate = Box<dyn FnOnce(Option<&[u8]>) -> Result<Vec<u8>> + Send>;

/// Durable per-key blob storage backing session histories.
///
/// A `put` must be visible to the next `get` on the same key. In-process
/// writers are serialized by the session store; writers in other processes
/// sharing the same backend are serialized by [`HistoryStorage::update`].
#[async_trait]
pub trait HistoryStorage: Send + Sync {
    /// Fetch the blob stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Replace the blob stored under `key`.
    async fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Apply `apply` to the blob under `key` and store the result, returning
    /// the stored blob. Backends shared between processes must run the read
    /// and the write as one atomic unit; when `apply` fails nothing is written.
    ///
    /// The default is a plain `get` then `put`, atomic only for callers that
    /// already serialize writers per key.
    async fn update(&self, key: &str, apply: BlobUpdate) -> Result<Vec<u8>> {
        let current = self.get(key).await?;
        let next = apply(current.as_deref())?;
        self.put(key, &next).await?;
        Ok(next)
    }

    /// The name of this storage backend.
    fn name(&self) -> &str;
}
