// Scratch directory - owns every temporary artifact the pipeline writes
//
// No locking: the sweep and ad-hoc deletes may race on the same file, so
// every removal treats "already gone" as success.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::fs;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::errors::ScratchError;
use super::models::TempArtifact;
use super::utils::now_epoch_millis;

/// Artifacts older than this are reclaimed by `sweep()`
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(60 * 60);

static ALLOCATION_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct ScratchDir {
    root: PathBuf,
    max_age: Duration,
}

impl ScratchDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_age: DEFAULT_MAX_AGE,
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_exists(&self) -> Result<(), ScratchError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| ScratchError::Create {
                path: self.root.display().to_string(),
                message: e.to_string(),
            })
    }

    /// Reserve a unique path. Nothing is written; the producer creates the file.
    pub async fn allocate(&self, prefix: &str, extension: &str) -> Result<TempArtifact, ScratchError> {
        self.ensure_exists().await?;

        let created = now_epoch_millis();
        let seq = ALLOCATION_COUNTER.fetch_add(1, Ordering::Relaxed);
        let file_name = format!(
            "{}-{}-{}-{}.{}",
            sanitize_prefix(prefix),
            created,
            std::process::id(),
            seq,
            extension.trim_start_matches('.')
        );
        let path = self.root.join(file_name);
        debug!(path = %path.display(), "Allocated scratch path");
        Ok(TempArtifact::new(path, created))
    }

    pub async fn exists(&self, artifact: &TempArtifact) -> bool {
        fs::metadata(artifact.path()).await.is_ok()
    }

    /// Size on disk, `None` when the file is gone
    pub async fn size_of(&self, artifact: &TempArtifact) -> Option<u64> {
        fs::metadata(artifact.path()).await.ok().map(|m| m.len())
    }

    /// Remove an artifact. Missing files are not an error.
    pub async fn delete(&self, artifact: &TempArtifact) -> Result<(), ScratchError> {
        remove_if_present(artifact.path()).await
    }

    /// Remove regular files older than the configured age
    pub async fn sweep(&self) -> Result<usize, ScratchError> {
        self.sweep_older_than(self.max_age).await
    }

    pub async fn sweep_older_than(&self, max_age: Duration) -> Result<usize, ScratchError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(ScratchError::Read {
                    path: self.root.display().to_string(),
                    message: e.to_string(),
                })
            }
        };

        let now = SystemTime::now();
        let mut removed = 0;

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Stopping sweep early");
                    break;
                }
            };

            // Entry may vanish between listing and stat
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }

            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or(Duration::ZERO);

            if age > max_age {
                match remove_if_present(&entry.path()).await {
                    Ok(()) => {
                        removed += 1;
                        debug!(
                            path = %entry.path().display(),
                            age_secs = age.as_secs(),
                            "Swept stale artifact"
                        );
                    }
                    Err(e) => warn!(error = %e, "Failed to sweep artifact"),
                }
            }
        }

        if removed > 0 {
            info!(removed, root = %self.root.display(), "Scratch sweep finished");
        }
        Ok(removed)
    }

    /// Sweep on a fixed interval until the handle is aborted
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep().await {
                    warn!(error = %e, "Scratch sweep failed");
                }
            }
        })
    }
}

async fn remove_if_present(path: &Path) -> Result<(), ScratchError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ScratchError::Delete {
            path: path.display().to_string(),
            message: e.to_string(),
        }),
    }
}

fn sanitize_prefix(prefix: &str) -> String {
    let cleaned: String = prefix
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(32)
        .collect();
    if cleaned.is_empty() {
        "artifact".to_string()
    } else {
        cleaned
    }
}
