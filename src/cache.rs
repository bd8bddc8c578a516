//! Local snapshot cache.
//!
//! Durable, write-through key-value store keyed by query name. The last
//! successfully fetched snapshot per query survives restarts and is served
//! when the remote source is unreachable. Absence is "no data", never an
//! error.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::types::Snapshot;

/// Injectable store interface. One entry per logical query.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Returns the cached snapshot for a query, or None when absent.
    async fn get(&self, key: &str) -> Option<Snapshot>;

    /// Insert or replace the cached snapshot for a query.
    async fn set(&self, key: &str, snapshot: &Snapshot) -> Result<(), String>;

    /// Drop a single entry. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), String>;

    /// Delete entries older than `max_age`. Returns how many were removed.
    async fn prune_older_than(&self, max_age: chrono::Duration) -> usize;
}

/// File-backed store: one JSON document holding all entries, rewritten on
/// every mutation. Entries carry RFC 3339 timestamps via serde.
pub struct JsonSnapshotStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, Snapshot>>,
}

impl JsonSnapshotStore {
    /// Open (or create) the store at `path`, loading any existing entries.
    ///
    /// A corrupt file is treated as empty rather than fatal — the cache is
    /// an availability aid, not a source of truth.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, String> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| format!("Failed to create cache dir: {}", e))?;
            }
        }

        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<HashMap<String, Snapshot>>(&content) {
                Ok(map) => map,
                Err(e) => {
                    log::warn!(
                        "Snapshot cache: {} unreadable ({}), starting empty",
                        path.display(),
                        e
                    );
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

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &HashMap<String, Snapshot>) -> Result<(), String> {
        let content = serde_json::to_string_pretty(entries)
            .map_err(|e| format!("Serialize error: {}", e))?;
        std::fs::write(&self.path, content).map_err(|e| format!("Write error: {}", e))
    }
}

#[async_trait]
impl SnapshotStore for JsonSnapshotStore {
    async fn get(&self, key: &str) -> Option<Snapshot> {
        self.entries.lock().get(key).cloned()
    }

    async fn set(&self, key: &str, snapshot: &Snapshot) -> Result<(), String> {
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), snapshot.clone());
        self.persist(&entries)
    }

    async fn remove(&self, key: &str) -> Result<(), String> {
        let mut entries = self.entries.lock();
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }

    async fn prune_older_than(&self, max_age: chrono::Duration) -> usize {
        let cutoff = chrono::Utc::now() - max_age;
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, snap| snap.retrieved_at >= cutoff);
        let removed = before - entries.len();
        if removed > 0 {
            if let Err(e) = self.persist(&entries) {
                log::warn!("Snapshot cache: prune persist failed: {}", e);
            }
        }
        removed
    }
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemorySnapshotStore {
    entries: Mutex<HashMap<String, Snapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn get(&self, key: &str) -> Option<Snapshot> {
        self.entries.lock().get(key).cloned()
    }

    async fn set(&self, key: &str, snapshot: &Snapshot) -> Result<(), String> {
        self.entries.lock().insert(key.to_string(), snapshot.clone());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), String> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn prune_older_than(&self, max_age: chrono::Duration) -> usize {
        let cutoff = chrono::Utc::now() - max_age;
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, snap| snap.retrieved_at >= cutoff);
        before - entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Snapshot;

    #[tokio::test]
    async fn test_get_absent_key_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::open(dir.path().join("snapshots.json")).unwrap();
        assert!(store.get("dashboard-metrics").await.is_none());
    }

    #[tokio::test]
    async fn test_set_then_get_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::open(dir.path().join("snapshots.json")).unwrap();

        let snap = Snapshot::now(serde_json::json!({"patientsSeenToday": 17}));
        store.set("dashboard-metrics", &snap).await.unwrap();

        let loaded = store.get("dashboard-metrics").await.unwrap();
        assert_eq!(loaded, snap);
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshots.json");

        let snap = Snapshot::now(serde_json::json!({"total": 42}));
        {
            let store = JsonSnapshotStore::open(&path).unwrap();
            store.set("dashboard-metrics", &snap).await.unwrap();
        }

        let reopened = JsonSnapshotStore::open(&path).unwrap();
        let loaded = reopened.get("dashboard-metrics").await.unwrap();
        assert_eq!(loaded.value, snap.value);
        assert_eq!(loaded.retrieved_at, snap.retrieved_at);
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshots.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = JsonSnapshotStore::open(&path).unwrap();
        assert!(store.get("dashboard-metrics").await.is_none());
    }

    #[tokio::test]
    async fn test_remove_missing_key_is_ok() {
        let store = MemorySnapshotStore::new();
        store.remove("never-set").await.unwrap();
    }

    #[tokio::test]
    async fn test_prune_removes_only_old_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::open(dir.path().join("snapshots.json")).unwrap();

        let fresh = Snapshot::now(serde_json::json!({"a": 1}));
        let old = Snapshot {
            value: serde_json::json!({"b": 2}),
            retrieved_at: chrono::Utc::now() - chrono::Duration::days(10),
        };
        store.set("fresh", &fresh).await.unwrap();
        store.set("old", &old).await.unwrap();

        let removed = store.prune_older_than(chrono::Duration::days(7)).await;
        assert_eq!(removed, 1);
        assert!(store.get("fresh").await.is_some());
        assert!(store.get("old").await.is_none());
    }
}
