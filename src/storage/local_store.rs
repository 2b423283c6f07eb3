//! Local filesystem artifact storage implementation

use crate::config::StorageConfig;
use crate::storage::{Artifact, ArtifactKey, ArtifactKind, ArtifactStore, StoreError, SweepReport};
use chrono::Utc;
use log::{debug, info, warn};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::NamedTempFile;

/// Name of the scratch directory inside the store root when no temp path is configured
const DEFAULT_TEMP_DIR: &str = ".tmp";

/// Filesystem-backed artifact store.
///
/// Writes land in a temp file inside `temp_path` and are renamed into place,
/// so `temp_path` must live on the same filesystem as `root`.
pub struct LocalArtifactStore {
    root: PathBuf,
    temp_path: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(config: &StorageConfig) -> Result<Self, StoreError> {
        Self::with_paths(&config.base_path, &config.temp_path)
    }

    /// Store rooted at `root` with its scratch directory inside it
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref();
        Self::with_paths(root, root.join(DEFAULT_TEMP_DIR))
    }

    fn with_paths(root: impl AsRef<Path>, temp_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        let temp_path = temp_path.as_ref().to_path_buf();

        for dir in [&root, &temp_path] {
            fs::create_dir_all(dir).map_err(|e| StoreError::io(dir.display().to_string(), e))?;
        }
        info!("Using artifact store at {} (temp: {})", root.display(), temp_path.display());

        Ok(Self { root, temp_path })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &ArtifactKey) -> PathBuf {
        self.root.join(key.as_str())
    }

    fn write_atomically(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let mut tmp = NamedTempFile::new_in(&self.temp_path)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Remove expired regular files directly inside `dir`
    fn sweep_dir(&self, dir: &Path, ttl: Duration, now: SystemTime, report: &mut SweepReport) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot list {} for sweep: {}", dir.display(), e);
                return;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let metadata = match entry.metadata() {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => continue,
                // Removed by a concurrent sweep between listing and stat
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!("Cannot stat {} during sweep: {}", path.display(), e);
                    report.failed += 1;
                    continue;
                }
            };
            report.scanned += 1;

            let modified = match metadata.modified() {
                Ok(modified) => modified,
                Err(e) => {
                    warn!("No modification time for {}: {}", path.display(), e);
                    report.failed += 1;
                    continue;
                }
            };
            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if age <= ttl {
                continue;
            }

            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!("Removed expired artifact {} (age {}s)", path.display(), age.as_secs());
                    report.removed.push(entry.file_name().to_string_lossy().into_owned());
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Failed to remove expired artifact {}: {}", path.display(), e);
                    report.failed += 1;
                }
            }
        }
    }
}

impl ArtifactStore for LocalArtifactStore {
    fn put(&self, key: &ArtifactKey, data: &[u8], kind: ArtifactKind) -> Result<Artifact, StoreError> {
        let path = self.path_for(key);
        self.write_atomically(&path, data)
            .map_err(|e| StoreError::io(key.as_str(), e))?;

        debug!("Stored {:?} artifact {} ({} bytes)", kind, key, data.len());
        Ok(Artifact {
            key: key.clone(),
            kind,
            created_at: Utc::now(),
            size: data.len() as u64,
        })
    }

    fn get(&self, key: &ArtifactKey) -> Result<Vec<u8>, StoreError> {
        fs::read(self.path_for(key)).map_err(|e| StoreError::io(key.as_str(), e))
    }

    fn exists(&self, key: &ArtifactKey) -> bool {
        self.path_for(key).is_file()
    }

    fn locate(&self, key: &ArtifactKey) -> Result<PathBuf, StoreError> {
        let path = self.path_for(key);
        if path.is_file() {
            Ok(path)
        } else {
            Err(StoreError::NotFound(key.to_string()))
        }
    }

    fn delete(&self, key: &ArtifactKey) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => {
                info!("Deleted artifact {}", key);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(key.as_str(), e)),
        }
    }

    fn sweep_expired(&self, ttl: Duration) -> SweepReport {
        let now = SystemTime::now();
        let mut report = SweepReport::default();

        self.sweep_dir(&self.root, ttl, now, &mut report);
        // Leftovers of writes interrupted before their rename
        if self.temp_path != self.root {
            self.sweep_dir(&self.temp_path, ttl, now, &mut report);
        }

        if !report.removed.is_empty() || report.failed > 0 {
            info!(
                "Sweep scanned {} files, removed {}, failed {}",
                report.scanned,
                report.removed.len(),
                report.failed
            );
        }
        report
    }
}
