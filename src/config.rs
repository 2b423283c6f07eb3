//! Application Configuration
//!
//! This module provides configuration management for the application,
//! supporting a YAML configuration file with sensible defaults and the
//! `APP_*` environment overrides the deployment scripts rely on.

use crate::storage::config::StorageBackend;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default configuration file, overridable with `APP_CONFIG`
const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Artifact storage configuration
    pub storage: StorageConfig,
    /// External analysis tools
    pub tools: ToolsConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host
    pub host: String,
    /// Server port (`APP_PORT`)
    pub port: u16,
    /// Number of worker threads
    pub workers: usize,
    /// Maximum upload size in bytes (`APP_MAX_SIZE`)
    pub max_payload_size: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 80,
            workers: 4,
            max_payload_size: 16 * 1024 * 1024,
        }
    }
}

/// Artifact storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage backend type
    pub backend: StorageBackend,
    /// Directory holding uploads and derived artifacts
    pub base_path: String,
    /// Scratch directory for atomic writes, same filesystem as `base_path`
    pub temp_path: String,
    /// Artifact time-to-live in minutes (`APP_RM_FILE_TIME`)
    pub ttl_minutes: u64,
    /// Periodic sweep interval in seconds, 0 disables the background sweeper
    pub sweep_interval_secs: u64,
    /// Store uploads under a random name instead of the client filename
    pub randomize_upload_names: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            base_path: "./uploads".to_string(),
            temp_path: "./uploads/.tmp".to_string(),
            ttl_minutes: 10,
            sweep_interval_secs: 0,
            randomize_upload_names: false,
        }
    }
}

impl StorageConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_minutes * 60)
    }
}

/// Invocation settings for one external tool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolConfig {
    /// Program name or absolute path
    pub program: String,
    /// Hard deadline for one invocation
    pub timeout_secs: u64,
}

impl ToolConfig {
    pub fn new(program: &str, timeout_secs: u64) -> Self {
        Self {
            program: program.to_string(),
            timeout_secs,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// External analysis tools configuration.
///
/// Each tool entry may set only some of its fields; the rest keep that
/// tool's own defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "ToolsOverrides")]
pub struct ToolsConfig {
    pub zsteg: ToolConfig,
    pub binwalk: ToolConfig,
    pub steghide: ToolConfig,
    pub exiftool: ToolConfig,
    pub strings: ToolConfig,
    /// Minimum printable run length reported by the strings scan
    pub strings_min_length: usize,
    /// Cap on captured stdout/stderr per invocation
    pub max_output_bytes: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            // Exhaustive zsteg runs walk every channel/bit/order combination
            zsteg: ToolConfig::new("zsteg", 60),
            binwalk: ToolConfig::new("binwalk", 30),
            steghide: ToolConfig::new("steghide", 30),
            exiftool: ToolConfig::new("exiftool", 15),
            strings: ToolConfig::new("strings", 15),
            strings_min_length: 4,
            max_output_bytes: 10 * 1024 * 1024,
        }
    }
}

/// A tool entry as written in the config file
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ToolOverride {
    program: Option<String>,
    timeout_secs: Option<u64>,
}

impl ToolOverride {
    fn apply(self, tool: &mut ToolConfig) {
        if let Some(program) = self.program {
            tool.program = program;
        }
        if let Some(timeout_secs) = self.timeout_secs {
            tool.timeout_secs = timeout_secs;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ToolsOverrides {
    zsteg: ToolOverride,
    binwalk: ToolOverride,
    steghide: ToolOverride,
    exiftool: ToolOverride,
    strings: ToolOverride,
    strings_min_length: Option<usize>,
    max_output_bytes: Option<usize>,
}

impl From<ToolsOverrides> for ToolsConfig {
    fn from(overrides: ToolsOverrides) -> Self {
        let mut config = ToolsConfig::default();
        overrides.zsteg.apply(&mut config.zsteg);
        overrides.binwalk.apply(&mut config.binwalk);
        overrides.steghide.apply(&mut config.steghide);
        overrides.exiftool.apply(&mut config.exiftool);
        overrides.strings.apply(&mut config.strings);
        if let Some(min) = overrides.strings_min_length {
            config.strings_min_length = min;
        }
        if let Some(max) = overrides.max_output_bytes {
            config.max_output_bytes = max;
        }
        config
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Path to log4rs configuration file
    pub config_file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            config_file: "server_log.yaml".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file, use defaults if not found, then apply env overrides
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = env::var("APP_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::from_file(&config_path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Read a YAML file; a missing file yields the defaults
    pub fn from_file(config_path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        if Path::new(config_path).exists() {
            let content = fs::read_to_string(config_path)?;
            let config: AppConfig = serde_yaml::from_str(&content)?;
            info!("Loaded configuration from {}", config_path);
            Ok(config)
        } else {
            warn!("Config file {} not found, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Apply `APP_PORT`, `APP_RM_FILE_TIME`, `APP_MAX_SIZE` and `STORAGE_BACKEND`
    pub fn apply_env_overrides(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if let Ok(port) = env::var("APP_PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|e| format!("Invalid APP_PORT {:?}: {}", port, e))?;
        }
        if let Ok(minutes) = env::var("APP_RM_FILE_TIME") {
            self.storage.ttl_minutes = minutes
                .trim()
                .parse()
                .map_err(|e| format!("Invalid APP_RM_FILE_TIME {:?}: {}", minutes, e))?;
        }
        if let Ok(size) = env::var("APP_MAX_SIZE") {
            self.server.max_payload_size = size
                .trim()
                .parse()
                .map_err(|e| format!("Invalid APP_MAX_SIZE {:?}: {}", size, e))?;
        }
        if let Ok(backend) = env::var("STORAGE_BACKEND") {
            self.storage.backend = backend.parse()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for var in ["APP_PORT", "APP_RM_FILE_TIME", "APP_MAX_SIZE", "STORAGE_BACKEND", "APP_CONFIG"] {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_defaults_match_deployment_contract() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 80);
        assert_eq!(config.storage.ttl_minutes, 10);
        assert_eq!(config.storage.ttl(), Duration::from_secs(600));
        assert_eq!(config.server.max_payload_size, 16 * 1024 * 1024);
        assert_eq!(config.storage.sweep_interval_secs, 0);
        assert!(!config.storage.randomize_upload_names);
        assert_eq!(config.tools.strings_min_length, 4);
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        env::set_var("APP_PORT", "8080");
        env::set_var("APP_RM_FILE_TIME", "3");
        env::set_var("APP_MAX_SIZE", "1024");
        env::set_var("STORAGE_BACKEND", "mock");

        let mut config = AppConfig::default();
        config.apply_env_overrides().unwrap();
        clear_env();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.ttl_minutes, 3);
        assert_eq!(config.server.max_payload_size, 1024);
        assert_eq!(config.storage.backend, StorageBackend::Mock);
    }

    #[test]
    #[serial]
    fn test_invalid_env_override_is_rejected() {
        clear_env();
        env::set_var("APP_PORT", "eighty");
        let result = AppConfig::default().apply_env_overrides();
        clear_env();

        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn test_partial_yaml_keeps_defaults() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "server:\n  port: 9000\ntools:\n  zsteg:\n    program: /opt/zsteg\n    timeout_secs: 120\n",
        )
        .unwrap();
        env::set_var("APP_CONFIG", path.display().to_string());

        let config = AppConfig::load().unwrap();
        clear_env();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.max_payload_size, 16 * 1024 * 1024);
        assert_eq!(config.tools.zsteg, ToolConfig::new("/opt/zsteg", 120));
        assert_eq!(config.tools.binwalk, ToolConfig::new("binwalk", 30));
        assert_eq!(config.storage.base_path, "./uploads");
    }

    #[test]
    fn test_tool_entry_may_set_only_some_fields() {
        let config: AppConfig =
            serde_yaml::from_str("tools:\n  binwalk:\n    program: /opt/binwalk\n  exiftool:\n    timeout_secs: 5\n").unwrap();

        assert_eq!(config.tools.binwalk, ToolConfig::new("/opt/binwalk", 30));
        assert_eq!(config.tools.exiftool, ToolConfig::new("exiftool", 5));
        assert_eq!(config.tools.zsteg, ToolConfig::new("zsteg", 60));
        assert_eq!(config.tools.strings_min_length, 4);
    }

    #[test]
    fn test_unknown_tool_field_is_rejected() {
        let result: Result<AppConfig, _> = serde_yaml::from_str("tools:\n  binwalk:\n    progam: /opt/binwalk\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = AppConfig::from_file("/nonexistent/config.yaml").unwrap();
        assert_eq!(config.server.port, 80);
    }
}
