//! Keyed table of live session stores.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use super::store::SessionStore;
use super::traits::HistoryStorage;

/// Prune dead entries once the table grows past this many keys.
const PRUNE_THRESHOLD: usize = 256;

/// Resolves session ids to their single live [`SessionStore`].
///
/// The table only holds weak handles: a store lives as long as some request
/// holds it, and the next reference after that builds a fresh instance over
/// the same durable history. The table lock is never held across storage I/O.
pub struct SessionRegistry {
    storage: Arc<dyn HistoryStorage>,
    max_history: usize,
    stores: Mutex<HashMap<String, Weak<SessionStore>>>,
}

impl SessionRegistry {
    pub fn new(storage: Arc<dyn HistoryStorage>, max_history: usize) -> Self {
        Self {
            storage,
            max_history,
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Return the live store for `session_id`, creating it on first reference.
    pub fn resolve(&self, session_id: &str) -> Arc<SessionStore> {
        let mut stores = self.stores.lock();

        if let Some(existing) = stores.get(session_id).and_then(Weak::upgrade) {
            return existing;
        }

        if stores.len() >= PRUNE_THRESHOLD {
            stores.retain(|_, weak| weak.strong_count() > 0);
        }

        let store = Arc::new(SessionStore::new(
            session_id,
            Arc::clone(&self.storage),
            self.max_history,
        ));
        stores.insert(session_id.to_string(), Arc::downgrade(&store));
        store
    }

    /// Number of sessions with a live store right now.
    #[cfg(test)]
    fn live_sessions(&self) -> usize {
        self.stores
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    pub fn storage_name(&self) -> &str {
        self.storage.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::InMemoryHistoryStorage;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(Arc::new(InMemoryHistoryStorage::new()), 10)
    }

    #[test]
    fn same_key_resolves_to_same_instance() {
        let registry = registry();
        let a = registry.resolve("s1");
        let b = registry.resolve("s1");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.live_sessions(), 1);
    }

    #[test]
    fn different_keys_get_different_instances() {
        let registry = registry();
        let a = registry.resolve("a");
        let b = registry.resolve("b");
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a.key(), "a");
        assert_eq!(b.key(), "b");
    }

    #[test]
    fn dropped_stores_are_no_longer_live() {
        let registry = registry();
        drop(registry.resolve("gone"));
        assert_eq!(registry.live_sessions(), 0);
    }

    #[test]
    fn prune_keeps_live_entries() {
        let registry = registry();
        let keep = registry.resolve("keep");
        for i in 0..PRUNE_THRESHOLD + 5 {
            drop(registry.resolve(&format!("tmp-{i}")));
        }
        let again = registry.resolve("keep");
        assert!(Arc::ptr_eq(&keep, &again));
        assert!(registry.stores.lock().len() < PRUNE_THRESHOLD + 5);
    }

    #[tokio::test]
    async fn appends_to_one_session_do_not_touch_another() {
        let registry = registry();
        registry.resolve("a").append("for a").await.unwrap();
        registry.resolve("b").append("for b").await.unwrap();
        registry.resolve("a").append("again a").await.unwrap();

        assert_eq!(
            registry.resolve("a").history().await.unwrap(),
            vec!["for a", "again a"]
        );
        assert_eq!(registry.resolve("b").history().await.unwrap(), vec!["for b"]);
    }

    #[tokio::test]
    async fn history_outlives_the_live_instance() {
        let registry = registry();
        registry.resolve("s1").append("one").await.unwrap();
        assert_eq!(registry.live_sessions(), 0);

        let history = registry.resolve("s1").append("two").await.unwrap();
        assert_eq!(history, vec!["one", "two"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_resolves_serialize_through_one_store() {
        let registry = Arc::new(registry());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    registry.resolve("hot").append(&format!("m{i}")).await.unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(registry.resolve("hot").history().await.unwrap().len(), 8);
    }
}
