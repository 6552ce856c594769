use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use uuid::Uuid;

use crate::error::AppResult;

/// Longest extension kept from an uploaded file name
const MAX_EXTENSION_LEN: usize = 8;

/// An uploaded image written to transient storage
#[derive(Debug, Clone)]
pub struct StoredUpload {
    /// Generated file name, `{uuid}` or `{uuid}.{ext}`
    pub id: String,
    pub path: PathBuf,
}

/// Transient storage for uploaded images
///
/// Files are named with a random UUID and keep the extension of the original
/// upload. Nothing is deleted on the request path; [`UploadStore::sweep_expired`]
/// removes files older than the retention period and is driven by
/// [`spawn_sweeper`].
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    retention: Option<Duration>,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>, retention: Option<Duration>) -> Self {
        Self {
            dir: dir.into(),
            retention,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `bytes` under a fresh name, creating the directory if needed
    pub async fn save(&self, original_name: Option<&str>, bytes: &[u8]) -> AppResult<StoredUpload> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let id = match original_name.and_then(sanitized_extension) {
            Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
            None => Uuid::new_v4().to_string(),
        };
        let path = self.dir.join(&id);

        tokio::fs::write(&path, bytes).await?;

        tracing::debug!(image_id = %id, bytes = bytes.len(), "Stored upload");

        Ok(StoredUpload { id, path })
    }

    /// Deletes regular files last modified before `now - retention`.
    /// Returns the number of files removed.
    pub async fn sweep_expired(&self, now: SystemTime) -> AppResult<usize> {
        let Some(retention) = self.retention else {
            return Ok(0);
        };
        let Some(cutoff) = now.checked_sub(retention) else {
            return Ok(0);
        };

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = match entry.metadata().await {
                Ok(metadata) if metadata.is_file() => metadata,
                _ => continue,
            };

            let expired = metadata
                .modified()
                .map(|modified| modified <= cutoff)
                .unwrap_or(false);

            if expired {
                match tokio::fs::remove_file(entry.path()).await {
                    Ok(()) => removed += 1,
                    Err(e) => {
                        tracing::warn!(error = %e, path = %entry.path().display(), "Failed to remove expired upload")
                    }
                }
            }
        }

        Ok(removed)
    }
}

/// Periodically sweeps expired uploads. Does nothing when retention is disabled.
pub fn spawn_sweeper(store: UploadStore, interval: Duration) -> Option<tokio::task::JoinHandle<()>> {
    store.retention?;

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match store.sweep_expired(SystemTime::now()).await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "Swept expired uploads"),
                Err(e) => tracing::warn!(error = %e, "Upload sweep failed"),
            }
        }
    }))
}

fn sanitized_extension(file_name: &str) -> Option<String> {
    let ext = Path::new(file_name).extension()?.to_str()?;
    let valid = !ext.is_empty()
        && ext.len() <= MAX_EXTENSION_LEN
        && ext.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then(|| ext.to_string())
}
