//! Key-value JSON persistence consumed through load/save contracts.
//!
//! The engine owns none of the storage mechanism; it sees a flat string
//! store holding one JSON document per key. Reads always tolerate missing
//! or corrupt entries by falling back to in-code defaults.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// Persisted configuration profile list.
pub const PROFILES_KEY: &str = "configdata";
/// Persisted last weather snapshot.
pub const CURRENT_WEATHER_KEY: &str = "current";
/// Persisted weather fetch statistics.
pub const STATS_KEY: &str = "stats";
/// Persisted last known GPS fix.
pub const LAST_KNOWN_POSITION_KEY: &str = "lastKnownPosition";

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialize error: {0}")]
    Serialize(String),
}

/// Contract for the host's key-value JSON store.
pub trait PreferenceStore: Send + Sync + 'static {
    /// Read the raw JSON document under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write the raw JSON document under `key`.
    fn put(&self, key: &str, value: String) -> Result<(), StoreError>;
}

/// Load and decode a persisted value.
///
/// Missing entries, read failures and corrupt JSON all yield `None`; the
/// caller supplies the default. Corruption is logged, never propagated.
pub fn load_json<T: DeserializeOwned>(store: &dyn PreferenceStore, key: &str) -> Option<T> {
    match store.get(key) {
        Ok(Some(raw)) => match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Corrupt entry under '{}': {}", key, e);
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            tracing::error!("Failed to read '{}': {}", key, e);
            None
        }
    }
}

/// Encode and persist a value.
pub fn save_json<T: Serialize>(
    store: &dyn PreferenceStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value).map_err(|e| StoreError::Serialize(e.to_string()))?;
    store.put(key, raw)
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| StoreError::Io(e.to_string()))?;
        entries.insert(key.to_string(), value);
        Ok(())
    }
}

/// File-backed store: one JSON object mapping keys to documents.
///
/// Each `put` rewrites the whole file, which is fine at the write rates the
/// engine produces (position once a minute, weather a few times an hour).
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl JsonFileStore {
    /// Open a store at `path`, creating parent directories as needed.
    ///
    /// A corrupt or unreadable file starts the store empty rather than
    /// failing: persisted state is always recoverable from defaults.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
        }

        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(map) => map,
                Err(e) => {
                    tracing::warn!("Store file {} is corrupt, starting empty: {}", path.display(), e);
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Default store location under the platform data directory.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "vpower", "VPower")
            .map(|dirs| dirs.data_dir().join("store.json"))
            .unwrap_or_else(|| PathBuf::from("vpower-store.json"))
    }

    fn flush(&self, entries: &HashMap<String, String>) -> Result<(), StoreError> {
        let content =
            serde_json::to_string_pretty(entries).map_err(|e| StoreError::Serialize(e.to_string()))?;
        std::fs::write(&self.path, content).map_err(|e| StoreError::Io(e.to_string()))
    }
}

impl PreferenceStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| StoreError::Io(e.to_string()))?;
        entries.insert(key.to_string(), value);
        self.flush(&entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        value: i32,
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::new();

        assert!(load_json::<Sample>(&store, "missing").is_none());

        save_json(&store, "sample", &Sample { value: 7 }).unwrap();
        let loaded: Sample = load_json(&store, "sample").unwrap();
        assert_eq!(loaded, Sample { value: 7 });
    }

    #[test]
    fn test_corrupt_entry_falls_back_to_none() {
        let store = MemoryStore::new();
        store.put("sample", "not json {{{".to_string()).unwrap();

        assert!(load_json::<Sample>(&store, "sample").is_none());
    }

    #[test]
    fn test_file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        {
            let store = JsonFileStore::open(&path).unwrap();
            save_json(&store, "sample", &Sample { value: 42 }).unwrap();
        }

        let store = JsonFileStore::open(&path).unwrap();
        let loaded: Sample = load_json(&store, "sample").unwrap();
        assert_eq!(loaded, Sample { value: 42 });
    }

    #[test]
    fn test_file_store_tolerates_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "garbage").unwrap();

        let store = JsonFileStore::open(&path).unwrap();
        assert!(store.get("anything").unwrap().is_none());
    }
}
