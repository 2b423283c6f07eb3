//! Application State Management
//!
//! This module provides the application state that contains all services
//! and their dependencies, following the dependency injection pattern.

use std::sync::Arc;

use log::info;

use crate::analysis::{CommandRunner, ProcessRunner};
use crate::config::AppConfig;
use crate::service::orchestrator::Orchestrator;
use crate::storage::{ArtifactStore, StoreError};

/// Application state containing all services and their dependencies
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub store: Arc<dyn ArtifactStore>,
    pub config: AppConfig,
}

impl AppState {
    /// Create application state from configuration
    pub fn from_config(config: AppConfig) -> Result<Self, StoreError> {
        info!("Initializing application state with configuration");

        let store = config.storage.create_store()?;
        let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner::new(config.tools.max_output_bytes));

        info!("Application state initialized successfully");
        Ok(Self::with_parts(store, runner, config))
    }

    /// Assemble state around explicit store and runner implementations
    pub fn with_parts(store: Arc<dyn ArtifactStore>, runner: Arc<dyn CommandRunner>, config: AppConfig) -> Self {
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&store),
            runner,
            &config.tools,
            &config.storage,
        ));
        Self {
            orchestrator,
            store,
            config,
        }
    }

    /// Create application state for testing with default configuration
    pub fn new_for_testing(store: Arc<dyn ArtifactStore>, runner: Arc<dyn CommandRunner>) -> Self {
        Self::with_parts(store, runner, AppConfig::default())
    }
}
