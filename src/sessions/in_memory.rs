//! In-memory history storage.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use super::traits::{BlobUpdate, HistoryStorage};

/// History storage backed by a mutex-protected hash map. Nothing survives
/// a restart; useful for tests and throwaway deployments.
pub struct InMemoryHistoryStorage {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryHistoryStorage {
    pub fn new() -> Self {
        Self {
            blobs: Mutex::new(HashMap::new()),
        }
    }

    /// Number of keys currently holding a blob.
    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.lock().is_empty()
    }
}

impl Default for InMemoryHistoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryStorage for InMemoryHistoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.lock().get(key).cloned())
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.blobs.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn update(&self, key: &str, apply: BlobUpdate) -> Result<Vec<u8>> {
        let mut blobs = self.blobs.lock();
        let next = apply(blobs.get(key).map(Vec::as_slice))?;
        blobs.insert(key.to_string(), next.clone());
        Ok(next)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
