//! Mock implementation of ArtifactStore for testing

use crate::storage::{Artifact, ArtifactKey, ArtifactKind, ArtifactStore, StoreError, SweepReport};
use chrono::{DateTime, Utc};
use log::info;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct StoredArtifact {
    data: Vec<u8>,
    kind: ArtifactKind,
    created_at: DateTime<Utc>,
}

/// In-memory artifact store with a controllable clock
pub struct MockArtifactStore {
    data: Arc<Mutex<HashMap<ArtifactKey, StoredArtifact>>>,
    now: Mutex<Option<DateTime<Utc>>>,
}

impl MockArtifactStore {
    pub fn new() -> Self {
        Self {
            data: Arc::new(Mutex::new(HashMap::new())),
            now: Mutex::new(None),
        }
    }

    /// Pin the store clock; `None` returns to wall-clock time
    pub fn set_now(&self, now: Option<DateTime<Utc>>) {
        *self.now.lock().unwrap() = now;
    }

    /// Move the pinned clock forward (pins it first if needed)
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        let current = now.unwrap_or_else(Utc::now);
        *now = Some(current + chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero()));
    }

    fn current_time(&self) -> DateTime<Utc> {
        self.now.lock().unwrap().unwrap_or_else(Utc::now)
    }

    /// Number of stored artifacts
    pub fn artifact_count(&self) -> usize {
        self.data.lock().unwrap().len()
    }

    pub fn kind_of(&self, key: &ArtifactKey) -> Option<ArtifactKind> {
        self.data.lock().unwrap().get(key).map(|stored| stored.kind)
    }

    /// All keys, sorted
    pub fn list_keys(&self) -> Vec<ArtifactKey> {
        let mut keys: Vec<_> = self.data.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn clear(&self) {
        self.data.lock().unwrap().clear();
    }
}

impl Default for MockArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactStore for MockArtifactStore {
    fn put(&self, key: &ArtifactKey, data: &[u8], kind: ArtifactKind) -> Result<Artifact, StoreError> {
        let created_at = self.current_time();
        let mut store = self.data.lock().unwrap();
        store.insert(
            key.clone(),
            StoredArtifact {
                data: data.to_vec(),
                kind,
                created_at,
            },
        );

        info!("Mock: Stored {:?} artifact {} ({} bytes)", kind, key, data.len());
        Ok(Artifact {
            key: key.clone(),
            kind,
            created_at,
            size: data.len() as u64,
        })
    }

    fn get(&self, key: &ArtifactKey) -> Result<Vec<u8>, StoreError> {
        let store = self.data.lock().unwrap();
        store
            .get(key)
            .map(|stored| stored.data.clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn exists(&self, key: &ArtifactKey) -> bool {
        self.data.lock().unwrap().contains_key(key)
    }

    fn locate(&self, key: &ArtifactKey) -> Result<PathBuf, StoreError> {
        if self.exists(key) {
            Ok(PathBuf::from("mock-store").join(key.as_str()))
        } else {
            Err(StoreError::NotFound(key.to_string()))
        }
    }

    fn delete(&self, key: &ArtifactKey) -> Result<(), StoreError> {
        if self.data.lock().unwrap().remove(key).is_some() {
            info!("Mock: Deleted artifact {}", key);
        }
        Ok(())
    }

    fn sweep_expired(&self, ttl: Duration) -> SweepReport {
        let now = self.current_time();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let mut store = self.data.lock().unwrap();

        let mut report = SweepReport {
            scanned: store.len(),
            ..SweepReport::default()
        };
        store.retain(|key, stored| {
            let expired = now - stored.created_at > ttl;
            if expired {
                report.removed.push(key.to_string());
            }
            !expired
        });
        report.removed.sort();
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: &str) -> ArtifactKey {
        ArtifactKey::parse(raw).unwrap()
    }

    #[test]
    fn test_mock_store_basic_operations() {
        let store = MockArtifactStore::new();
        let k = key("cat.png");
        assert_eq!(store.artifact_count(), 0);

        store.put(&k, b"Hello, Mock Storage!", ArtifactKind::Original).unwrap();
        assert_eq!(store.artifact_count(), 1);
        assert_eq!(store.kind_of(&k), Some(ArtifactKind::Original));
        assert_eq!(store.get(&k).unwrap(), b"Hello, Mock Storage!");
        assert_eq!(store.locate(&k).unwrap(), PathBuf::from("mock-store/cat.png"));

        store.delete(&k).unwrap();
        store.delete(&k).unwrap();
        assert!(!store.exists(&k));
        assert!(store.locate(&k).is_err());
    }

    #[test]
    fn test_mock_store_sweep_uses_pinned_clock() {
        let store = MockArtifactStore::new();
        store.set_now(Some(Utc::now()));
        store.put(&key("old.png"), b"old", ArtifactKind::Original).unwrap();

        store.advance(Duration::from_secs(5 * 60));
        store.put(&key("young.png"), b"young", ArtifactKind::DerivedBitPlane).unwrap();

        store.advance(Duration::from_secs(6 * 60));
        let report = store.sweep_expired(Duration::from_secs(10 * 60));

        assert_eq!(report.scanned, 2);
        assert_eq!(report.removed, vec!["old.png".to_string()]);
        assert_eq!(store.list_keys(), vec![key("young.png")]);
    }
}
