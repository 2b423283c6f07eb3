//! Optional periodic sweep worker
//!
//! Expiry normally rides on artifact reads. When the service sits idle that
//! means expired uploads stay on disk; this worker closes that gap by running
//! the same sweep on a fixed interval.

use crate::storage::{ArtifactStore, SweepReport};
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

/// Background TTL sweeper
pub struct SweepWorker {
    store: Arc<dyn ArtifactStore>,
    ttl: Duration,
    interval: Duration,
}

impl SweepWorker {
    pub fn new(store: Arc<dyn ArtifactStore>, ttl: Duration, interval: Duration) -> Self {
        Self { store, ttl, interval }
    }

    /// Start the sweeper as a background task (non-blocking)
    pub fn start_background(self) -> tokio::task::JoinHandle<()> {
        info!(
            "Starting sweep worker with {}s interval, ttl {}s",
            self.interval.as_secs(),
            self.ttl.as_secs()
        );

        tokio::spawn(async move {
            let mut interval = time::interval(self.interval);
            loop {
                interval.tick().await;
                if let Err(e) = self.run_once().await {
                    error!("Sweep task failed: {}", e);
                }
            }
        })
    }

    /// Run one sweep on the blocking pool
    pub async fn run_once(&self) -> Result<SweepReport, tokio::task::JoinError> {
        let store = Arc::clone(&self.store);
        let ttl = self.ttl;
        tokio::task::spawn_blocking(move || store.sweep_expired(ttl)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::mock_store::MockArtifactStore;
    use crate::storage::{ArtifactKey, ArtifactKind};

    #[tokio::test]
    async fn test_run_once_sweeps_expired() {
        let store = Arc::new(MockArtifactStore::new());
        store.set_now(Some(chrono::Utc::now()));
        store
            .put(&ArtifactKey::parse("old.png").unwrap(), b"x", ArtifactKind::Original)
            .unwrap();
        store.advance(Duration::from_secs(120));

        let worker = SweepWorker::new(store.clone(), Duration::from_secs(60), Duration::from_secs(1));
        let report = worker.run_once().await.unwrap();

        assert_eq!(report.removed, vec!["old.png".to_string()]);
        assert_eq!(store.artifact_count(), 0);
    }

    #[tokio::test]
    async fn test_background_worker_sweeps_on_tick() {
        let store = Arc::new(MockArtifactStore::new());
        store.set_now(Some(chrono::Utc::now()));
        store
            .put(&ArtifactKey::parse("old.png").unwrap(), b"x", ArtifactKind::Original)
            .unwrap();
        store.advance(Duration::from_secs(120));

        let handle = SweepWorker::new(store.clone(), Duration::from_secs(60), Duration::from_millis(10))
            .start_background();
        // First tick fires immediately
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert_eq!(store.artifact_count(), 0);
    }
}
