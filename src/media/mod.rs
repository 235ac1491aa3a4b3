//! Short-lived media cache.
//!
//! Inbound media bytes are written under a generated name
//! (`<message id>_<timestamp micros>.<ext>`) and served back over
//! `GET /temp/<name>`. A periodic sweep removes every file whose age exceeds
//! the retention window. Age is taken from the file's mtime, so files that
//! are still being written are always younger than the threshold.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::Result;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::errors::BridgeError;
use crate::utils::{ensure_dir, safe_filename};

/// URL path segment under which cached files are served.
pub const PUBLIC_PREFIX: &str = "/temp";

/// Name generation retries if a file with the same name already exists.
const MAX_NAME_ATTEMPTS: i64 = 4;

/// A file written by [`MediaCache::store`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMedia {
    pub filename: String,
    pub path: PathBuf,
    /// Absolute URL the webhook receiver can fetch the file from.
    pub url: String,
}

/// Result of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: usize,
    pub failed: usize,
}

pub struct MediaCache {
    dir: PathBuf,
    public_base: String,
    retention: Duration,
    max_bytes: usize,
}

impl MediaCache {
    pub fn new(
        dir: impl Into<PathBuf>,
        public_base: &str,
        retention: Duration,
        max_bytes: usize,
    ) -> Result<Self> {
        let dir = ensure_dir(dir.into())?;
        Ok(Self {
            dir,
            public_base: public_base.trim_end_matches('/').to_string(),
            retention,
            max_bytes,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.media.resolve_dir()?,
            &config.gateway.public_base_url(),
            config.media.retention(),
            config.media.max_bytes,
        )
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn url_for(&self, filename: &str) -> String {
        format!("{}{}/{}", self.public_base, PUBLIC_PREFIX, filename)
    }

    /// Persist `bytes` and return where the webhook can fetch them.
    ///
    /// Files are created exclusively, so a generated name is never reused.
    pub async fn store(
        &self,
        bytes: &[u8],
        mime: &str,
        message_id: &str,
    ) -> Result<StoredMedia, BridgeError> {
        if bytes.is_empty() {
            return Err(BridgeError::Storage("empty media data".into()));
        }
        if bytes.len() > self.max_bytes {
            return Err(BridgeError::Storage(format!(
                "media too large: {} bytes (max {})",
                bytes.len(),
                self.max_bytes
            )));
        }

        let ext = extension_for_mime(mime);
        let stamp = chrono::Utc::now().timestamp_micros();

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let filename = generated_name(message_id, stamp + attempt, &ext);
            let path = self.dir.join(&filename);
            let mut file = match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(f) => f,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!("media name collision on {}, retrying", filename);
                    continue;
                }
                Err(e) => {
                    return Err(BridgeError::Storage(format!(
                        "failed to create {}: {}",
                        path.display(),
                        e
                    )));
                }
            };

            let written = async {
                file.write_all(bytes).await?;
                file.flush().await
            }
            .await;
            if let Err(e) = written {
                if let Err(rm) = tokio::fs::remove_file(&path).await {
                    warn!("failed to remove partial media {}: {}", path.display(), rm);
                }
                return Err(BridgeError::Storage(format!(
                    "failed to write {}: {}",
                    path.display(),
                    e
                )));
            }

            let url = self.url_for(&filename);
            debug!("media cached: {} ({} bytes)", filename, bytes.len());
            return Ok(StoredMedia {
                filename,
                path,
                url,
            });
        }

        Err(BridgeError::Storage(format!(
            "could not allocate a unique name for message {}",
            message_id
        )))
    }

    /// Map a requested file name to a path inside the cache directory.
    /// Rejects anything that could escape it.
    pub fn resolve(&self, filename: &str) -> Option<PathBuf> {
        if filename.is_empty()
            || filename.starts_with('.')
            || filename.contains("..")
            || filename.contains('/')
            || filename.contains('\\')
        {
            return None;
        }
        Some(self.dir.join(filename))
    }

    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(SystemTime::now()).await
    }

    /// Remove every file older than the retention window as of `now`.
    /// Failures are logged and skipped.
    pub async fn sweep_at(&self, now: SystemTime) -> SweepReport {
        let mut report = SweepReport::default();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    "media sweep: cannot read {}: {}",
                    self.dir.display(),
                    e
                );
                return report;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("media sweep: directory iteration failed: {}", e);
                    break;
                }
            };
            let path = entry.path();
            let modified = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta.modified(),
                Ok(_) => continue,
                Err(e) => Err(e),
            };
            report.scanned += 1;

            let modified = match modified {
                Ok(m) => m,
                Err(e) => {
                    warn!("media sweep: cannot stat {}: {}", path.display(), e);
                    report.failed += 1;
                    continue;
                }
            };

            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if age <= self.retention {
                continue;
            }

            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    report.removed += 1;
                    debug!("media sweep: removed {}", path.display());
                }
                Err(e) => {
                    warn!("media sweep: failed to remove {}: {}", path.display(), e);
                    report.failed += 1;
                }
            }
        }

        if report.removed > 0 || report.failed > 0 {
            info!(
                "media sweep: scanned={}, removed={}, failed={}",
                report.scanned, report.removed, report.failed
            );
        }
        report
    }

    /// Run [`sweep`](Self::sweep) every `interval`, first pass after one interval.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                ticker.tick().await;
                self.sweep().await;
            }
        })
    }
}

/// File extension taken from the MIME subtype (`image/jpeg` → `jpeg`).
/// Parameters are dropped; anything unusable becomes `bin`.
pub fn extension_for_mime(mime: &str) -> String {
    let subtype = mime
        .split(';')
        .next()
        .and_then(|essence| essence.split_once('/'))
        .map(|(_, sub)| sub.trim())
        .unwrap_or("");
    let ext: String = subtype
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '.'))
        .collect();
    if ext.is_empty() || ext.starts_with('.') || ext.contains("..") {
        "bin".to_string()
    } else {
        ext.to_ascii_lowercase()
    }
}

/// Every name produced here must pass [`MediaCache::resolve`], so dots in
/// the id are flattened.
fn generated_name(message_id: &str, stamp_micros: i64, ext: &str) -> String {
    let id = safe_filename(message_id).replace('.', "_");
    format!("{}_{}.{}", id, stamp_micros, ext)
}
