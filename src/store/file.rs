//! JSON-file-backed client store.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::broadcast;

use super::{ClientStore, StoreChange, CHANGE_CHANNEL_CAPACITY};
use crate::error::StoreError;

/// Persistent store kept as a single pretty-printed JSON object.
///
/// Writes go through a temp file and rename so a crash mid-write never
/// leaves a truncated store behind. Change notifications reach in-process
/// subscribers only; cooperating session managers share one instance.
pub struct FileStore {
    path: PathBuf,
    io: Mutex<()>,
    changes: broadcast::Sender<StoreChange>,
}

/// Resolve the default store path.
///
/// Checks `SACRISTAN_STATE_DIR`, then `$XDG_STATE_HOME/sacristan`, then
/// `$HOME/.local/state/sacristan`.
pub fn default_store_path() -> PathBuf {
    if let Ok(dir) = std::env::var("SACRISTAN_STATE_DIR") {
        return PathBuf::from(dir).join("store.json");
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("sacristan").join("store.json");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".local/state/sacristan").join("store.json");
    }
    PathBuf::from(".sacristan").join("store.json")
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            path: path.into(),
            io: Mutex::new(()),
            changes,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(serde_json::to_string_pretty(entries)?.as_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn notify(&self, key: &str) {
        let _ = self.changes.send(StoreChange {
            key: key.to_string(),
        });
    }

    fn lock_io(&self) -> std::sync::MutexGuard<'_, ()> {
        self.io.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ClientStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.lock_io();
        Ok(self.load()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        {
            let _guard = self.lock_io();
            let mut entries = self.load()?;
            entries.insert(key.to_string(), value.to_string());
            self.persist(&entries)?;
        }
        self.notify(key);
        Ok(())
    }

    fn set_many(&self, batch: &[(&str, String)]) -> Result<(), StoreError> {
        {
            let _guard = self.lock_io();
            let mut entries = self.load()?;
            for (key, value) in batch {
                entries.insert((*key).to_string(), value.clone());
            }
            self.persist(&entries)?;
        }
        for (key, _) in batch {
            self.notify(key);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let removed = {
            let _guard = self.lock_io();
            let mut entries = self.load()?;
            let removed = entries.remove(key).is_some();
            if removed {
                self.persist(&entries)?;
            }
            removed
        };
        if removed {
            self.notify(key);
        }
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError> {
        let removed: Vec<&str> = {
            let _guard = self.lock_io();
            let mut entries = self.load()?;
            let removed: Vec<&str> = keys
                .iter()
                .copied()
                .filter(|key| entries.remove(*key).is_some())
                .collect();
            if !removed.is_empty() {
                self.persist(&entries)?;
            }
            removed
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
