//! Backend selection for artifact storage

use crate::config::StorageConfig;
use crate::storage::{local_store::LocalArtifactStore, mock_store::MockArtifactStore, ArtifactStore, StoreError};
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Available artifact storage backends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum StorageBackend {
    #[default]
    Local,
    Mock,
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" | "filesystem" | "fs" => Ok(StorageBackend::Local),
            "mock" | "memory" => Ok(StorageBackend::Mock),
            _ => Err(format!("Unknown storage backend: {}", s)),
        }
    }
}

impl StorageConfig {
    /// Create a storage instance based on the configuration
    pub fn create_store(&self) -> Result<Arc<dyn ArtifactStore>, StoreError> {
        match self.backend {
            StorageBackend::Local => Ok(Arc::new(LocalArtifactStore::new(self)?)),
            StorageBackend::Mock => {
                info!("Using in-memory mock artifact store");
                Ok(Arc::new(MockArtifactStore::new()))
            }
        }
    }
}
