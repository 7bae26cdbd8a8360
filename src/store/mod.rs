//! Durable client key-value store.
//!
//! The session core treats this the way the original client treats browser
//! local storage: a small string-keyed map shared by every "tab" plus change
//! notifications other tabs can observe. Two implementations exist: an
//! in-memory store (tests, ephemeral sessions) and a JSON-file-backed store
//! (`file::FileStore`).

mod file;
pub mod tokens;

pub use file::{default_store_path, FileStore};
pub use tokens::TokenStore;

use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

use crate::error::StoreError;

/// Capacity of the change-notification channel. Slow subscribers observe a
/// `Lagged` error rather than blocking writers.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// A single key change, delivered to all subscribers of the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub key: String,
}

/// String key-value store with change notifications.
///
/// Individual operations are cheap and synchronous; all session-level
/// serialization happens above this layer, so implementations only need
/// internal consistency per call.
pub trait ClientStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    /// Write several keys as one atomic unit (one durable write, one
    /// notification per key).
    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
    fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError>;
    /// Subscribe to change notifications from every handle of this store.
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}

/// In-memory store. Sharing one instance between two session managers models
/// two tabs over the same browser storage.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    changes: broadcast::Sender<StoreChange>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            entries: Mutex::new(HashMap::new()),
            changes,
        }
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notify(&self, key: &str) {
        let _ = self.changes.send(StoreChange {
            key: key.to_string(),
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock_entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.lock_entries()
            .insert(key.to_string(), value.to_string());
        self.notify(key);
        Ok(())
    }

    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StoreError> {
        {
            let mut map = self.lock_entries();
            for (key, value) in entries {
                map.insert((*key).to_string(), value.clone());
            }
        }
        for (key, _) in entries {
            self.notify(key);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        if self.lock_entries().remove(key).is_some() {
            self.notify(key);
        }
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError> {
        let removed: Vec<&str> = {
            let mut map = self.lock_entries();
            keys.iter()
                .copied()
                .filter(|key| map.remove(*key).is_some())
                .collect()
        };
        for key in removed {
            self.notify(key);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trips_values() {
        let store = MemoryStore::new();
        assert_eq!(store.get("missing").unwrap(), None);
        store.set("access_token", "abc").unwrap();
        assert_eq!(store.get("access_token").unwrap().as_deref(), Some("abc"));
        store.remove("access_token").unwrap();
        assert_eq!(store.get("access_token").unwrap(), None);
    }

    #[tokio::test]
    async fn subscribers_observe_writes_and_removals() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe();

        store.set("logout_event", "1234").unwrap();
        store.remove("logout_event").unwrap();

        assert_eq!(rx.recv().await.unwrap().key, "logout_event");
        assert_eq!(rx.recv().await.unwrap().key, "logout_event");
    }

    #[tokio::test]
    async fn removing_a_missing_key_is_silent() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe();
        store.remove("never-set").unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn set_many_writes_all_keys_and_notifies_each() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe();
        store
            .set_many(&[("a", "1".to_string()), ("b", "2".to_string())])
            .unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));
        assert_eq!(store.get("b").unwrap().as_deref(), Some("2"));
        assert_eq!(rx.recv().await.unwrap().key, "a");
        assert_eq!(rx.recv().await.unwrap().key, "b");
    }
}
