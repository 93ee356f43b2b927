//! SQLite-backed history storage.
//!
//! One row per session key in `session_history`. Each write replaces the
//! whole blob; the connection is shared behind a mutex and every query runs
//! on the blocking pool so request tasks never stall a runtime worker.
//! `update` runs inside `BEGIN IMMEDIATE`, so processes sharing the file
//! (a running gateway and a one-shot `chatrelay chat`) queue on the write
//! lock instead of overwriting each other.

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::traits::{BlobUpdate, HistoryStorage};

/// How long a writer waits for another connection's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SELECT_HISTORY: &str = "SELECT history FROM session_history WHERE session_id = ?1";

const UPSERT_HISTORY: &str = "INSERT INTO session_history (session_id, history, updated_at)
     VALUES (?1, ?2, ?3)
     ON CONFLICT(session_id) DO UPDATE SET
         history = excluded.history,
         updated_at = excluded.updated_at";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS session_history (
        session_id TEXT PRIMARY KEY,
        history    TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
";

pub struct SqliteHistoryStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteHistoryStorage {
    /// Open (or create) the database at `db_path` and ensure the schema exists.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create session database directory: {}", parent.display())
            })?;
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open session database: {}", db_path.display()))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .context("Failed to set SQLite busy timeout")?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
            .context("Failed to enable WAL journal")?;
        conn.execute_batch(SCHEMA)
            .context("Failed to initialize session_history schema")?;

        tracing::debug!(path = %db_path.display(), "Session database ready");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn blob_to_text(value: Vec<u8>) -> Result<String> {
    String::from_utf8(value).context("Session history blob is not valid UTF-8")
}

#[async_trait]
impl HistoryStorage for SqliteHistoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let conn = Arc::clone(&self.conn);
        let key = key.to_string();

        tokio::task::spawn_blocking(move || -> Result<Option<Vec<u8>>> {
            let conn = conn.lock();
            let row: Option<String> = conn
                .query_row(SELECT_HISTORY, params![key], |row| row.get(0))
                .optional()
                .context("Failed to read session history")?;
            Ok(row.map(String::into_bytes))
        })
        .await
        .context("Session history read task panicked")?
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let conn = Arc::clone(&self.conn);
        let key = key.to_string();
        let text = blob_to_text(value.to_vec())?;
        let updated_at = chrono::Utc::now().to_rfc3339();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = conn.lock();
            conn.execute(UPSERT_HISTORY, params![key, text, updated_at])
                .context("Failed to write session history")?;
            Ok(())
        })
        .await
        .context("Session history write task panicked")?
    }

    async fn update(&self, key: &str, apply: BlobUpdate) -> Result<Vec<u8>> {
        let conn = Arc::clone(&self.conn);
        let key = key.to_string();

        tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
            let mut conn = conn.lock();
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .context("Failed to begin session history transaction")?;

            let current: Option<String> = tx
                .query_row(SELECT_HISTORY, params![key], |row| row.get(0))
                .optional()
                .context("Failed to read session history")?;
            // Dropping `tx` on any error below rolls the transaction back.
            let next = apply(current.as_deref().map(str::as_bytes))?;
            let text = blob_to_text(next.clone())?;
            let updated_at = chrono::Utc::now().to_rfc3339();

            tx.execute(UPSERT_HISTORY, params![key, text, updated_at])
                .context("Failed to write session history")?;
            tx.commit()
                .context("Failed to commit session history")?;
            Ok(next)
        })
        .await
        .context("Session history update task panicked")?
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_storage() -> (TempDir, SqliteHistoryStorage) {
        let tmp = TempDir::new().unwrap();
        let storage = SqliteHistoryStorage::open(&tmp.path().join("sessions.db")).unwrap();
        (tmp, storage)
    }

    #[tokio::test]
    async fn get_missing_key_is_none() {
        let (_tmp, storage) = temp_storage();
        assert!(storage.get("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_then_get_roundtrips_blob() {
        let (_tmp, storage) = temp_storage();
        storage.put("s1", br#"["hello"]"#).await.unwrap();

        let blob = storage.get("s1").await.unwrap().unwrap();
        assert_eq!(blob, br#"["hello"]"#.to_vec());
    }

    #[tokio::test]
    async fn put_overwrites_previous_blob() {
        let (_tmp, storage) = temp_storage();
        storage.put("s1", br#"["a"]"#).await.unwrap();
        storage.put("s1", br#"["a","b"]"#).await.unwrap();

        let blob = storage.get("s1").await.unwrap().unwrap();
        assert_eq!(blob, br#"["a","b"]"#.to_vec());
    }

    #[tokio::test]
    async fn history_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("sessions.db");

        {
            let storage = SqliteHistoryStorage::open(&path).unwrap();
            storage.put("durable", br#"["kept"]"#).await.unwrap();
        }

        let reopened = SqliteHistoryStorage::open(&path).unwrap();
        let blob = reopened.get("durable").await.unwrap().unwrap();
        assert_eq!(blob, br#"["kept"]"#.to_vec());
    }

    #[tokio::test]
    async fn rejects_non_utf8_blob() {
        let (_tmp, storage) = temp_storage();
        let err = storage.put("s1", &[0xff, 0xfe]).await.unwrap_err();
        assert!(err.to_string().contains("UTF-8"));
    }

    #[tokio::test]
    async fn failed_update_rolls_back() {
        let (_tmp, storage) = temp_storage();
        storage.put("s1", br#"["a"]"#).await.unwrap();

        let result = storage
            .update(
                "s1",
                Box::new(|_: Option<&[u8]>| -> Result<Vec<u8>> { anyhow::bail!("rejected") }),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(storage.get("s1").await.unwrap().unwrap(), br#"["a"]"#.to_vec());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn two_connections_on_one_file_lose_no_appends() {
        use crate::sessions::SessionRegistry;
        use std::collections::HashSet;

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("shared.db");
        // Two storages over one file stand in for a gateway and a CLI process.
        let registries: Vec<Arc<SessionRegistry>> = (0..2)
            .map(|_| {
                let storage: Arc<dyn HistoryStorage> =
                    Arc::new(SqliteHistoryStorage::open(&path).unwrap());
                Arc::new(SessionRegistry::new(storage, 100))
            })
            .collect();

        let mut tasks = Vec::new();
        for (r, registry) in registries.iter().enumerate() {
            for i in 0..20 {
                let registry = Arc::clone(registry);
                tasks.push(tokio::spawn(async move {
                    registry.resolve("s").append(&format!("r{r}-m{i}")).await
                }));
            }
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let history = registries[0].resolve("s").history().await.unwrap();
        let unique: HashSet<_> = history.iter().collect();
        assert_eq!(history.len(), 40);
        assert_eq!(unique.len(), 40);
    }
}
