//! Artifact Storage Layer Abstraction
//!
//! Every file the service knows about (the original upload and everything
//! derived from it: bit-planes, carved payloads, extracted secrets) lives in a
//! flat, key-addressed store. A key maps to exactly one file directly under
//! the store root.
//!
//! Semantics shared by all backends:
//! - `put` is atomic from a reader's point of view and last-writer-wins.
//! - `delete` is idempotent; deleting a missing key is not an error.
//! - expiry is driven by `sweep_expired`, which the serving path calls on
//!   every artifact read. Under zero traffic nothing is evicted unless the
//!   optional [`sweeper::SweepWorker`] is running.

pub mod local_store;
pub mod mock_store;
pub mod config;
pub mod sweeper;


use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;
use thiserror::Error;

/// Longest key accepted, matching common filesystem name limits
const MAX_KEY_LEN: usize = 255;

/// Joins a source key and a derived suffix. Suffixes never contain it, so
/// the last occurrence always splits a derived key back into its parts.
pub const DERIVED_SEPARATOR: char = '~';

/// Errors raised by artifact storage backends
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid artifact key: {0:?}")]
    InvalidKey(String),

    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("storage I/O error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn io(key: impl Into<String>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound(key.into())
        } else {
            StoreError::Io { key: key.into(), source }
        }
    }
}

/// Validated artifact key.
///
/// Keys are plain file names: no separators, no parent references, no NUL and
/// no leading dot (dot-names are reserved for the store's own scratch space).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ArtifactKey(String);

impl ArtifactKey {
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let invalid = raw.is_empty()
            || raw.len() > MAX_KEY_LEN
            || raw.starts_with('.')
            || raw.contains(['/', '\\', '\0'])
            || raw.trim() != raw;

        if invalid {
            return Err(StoreError::InvalidKey(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-cased last extension, if any
    pub fn extension(&self) -> Option<String> {
        match self.0.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext.to_lowercase()),
            _ => None,
        }
    }

    /// Key of an artifact derived from this one: `<key>~<suffix>`.
    ///
    /// The whole source key is kept, so `cat.png` and `cat.bmp` never share
    /// derived keys, and no original upload can carry the separator.
    pub fn derive(&self, suffix: &str) -> Result<ArtifactKey, StoreError> {
        if suffix.is_empty() || suffix.contains(DERIVED_SEPARATOR) {
            return Err(StoreError::InvalidKey(suffix.to_string()));
        }
        ArtifactKey::parse(&format!("{}{}{}", self.0, DERIVED_SEPARATOR, suffix))
    }

    pub fn is_derived(&self) -> bool {
        self.0.contains(DERIVED_SEPARATOR)
    }

    /// Key this artifact was derived from, `None` for originals
    pub fn source(&self) -> Option<ArtifactKey> {
        self.0
            .rsplit_once(DERIVED_SEPARATOR)
            .map(|(source, _)| ArtifactKey(source.to_string()))
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ArtifactKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Provenance of a stored artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArtifactKind {
    Original,
    DerivedBitPlane,
    DerivedExtraction,
}

/// A stored artifact as returned by `put`
#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    pub key: ArtifactKey,
    pub kind: ArtifactKind,
    pub created_at: DateTime<Utc>,
    pub size: u64,
}

/// Outcome of a TTL sweep
#[derive(Debug, Default, Clone)]
pub struct SweepReport {
    /// Number of files inspected
    pub scanned: usize,
    /// File names removed by this sweep
    pub removed: Vec<String>,
    /// Files that could not be removed (logged, not fatal)
    pub failed: usize,
}

/// Trait defining the artifact storage interface
pub trait ArtifactStore: Send + Sync {
    /// Atomically store `data` under `key`, replacing any previous content
    fn put(&self, key: &ArtifactKey, data: &[u8], kind: ArtifactKind) -> Result<Artifact, StoreError>;

    /// Read the full content stored under `key`
    fn get(&self, key: &ArtifactKey) -> Result<Vec<u8>, StoreError>;

    fn exists(&self, key: &ArtifactKey) -> bool;

    /// On-disk location handed to external tools
    fn locate(&self, key: &ArtifactKey) -> Result<PathBuf, StoreError>;

    /// Remove `key`; succeeds when it is already gone
    fn delete(&self, key: &ArtifactKey) -> Result<(), StoreError>;

    /// Remove every artifact older than `ttl`, logging and skipping failures
    fn sweep_expired(&self, ttl: Duration) -> SweepReport;

    /// Serving-path read: sweep expired artifacts first, then read `key`
    fn read_fresh(&self, key: &ArtifactKey, ttl: Duration) -> Result<Vec<u8>, StoreError> {
        let report = self.sweep_expired(ttl);
        if !report.removed.is_empty() {
            debug!("Sweep before read of {} removed {} artifacts", key, report.removed.len());
        }
        self.get(key)
    }
}
