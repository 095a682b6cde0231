//! File-backed session persistence
//!
//! One JSON file per session (`sess_<id>`) under a save directory. Expiry is
//! judged from the file modification time.

use crate::backend::{validate_session_id, SessionAttributes, SessionBackend};
use crate::error::SessionResult;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

const FILE_PREFIX: &str = "sess_";

#[derive(Debug, Clone)]
pub struct FileBackend {
    save_path: PathBuf,
    lifetime: Duration,
}

impl FileBackend {
    /// Create the backend, creating the save directory if it doesn't exist
    pub fn new<P: AsRef<Path>>(save_path: P, lifetime: Duration) -> SessionResult<Self> {
        let save_path = save_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&save_path)?;
        info!("Session files stored at: {}", save_path.display());
        Ok(Self {
            save_path,
            lifetime,
        })
    }

    pub fn save_path(&self) -> &Path {
        &self.save_path
    }

    fn session_file(&self, id: &str) -> SessionResult<PathBuf> {
        validate_session_id(id)?;
        Ok(self.save_path.join(format!("{}{}", FILE_PREFIX, id)))
    }

    fn is_expired(&self, modified: SystemTime) -> bool {
        match SystemTime::now().duration_since(modified) {
            Ok(age) => age > self.lifetime,
            // Modified in the future: clock skew, treat as fresh.
            Err(_) => false,
        }
    }
}

#[async_trait]
impl SessionBackend for FileBackend {
    fn name(&self) -> &'static str {
        "files"
    }

    async fn read(&self, id: &str) -> SessionResult<Option<SessionAttributes>> {
        let path = self.session_file(id)?;

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if self.is_expired(metadata.modified()?) {
            debug!("Session file {} has expired", path.display());
            return Ok(None);
        }

        let content = tokio::fs::read_to_string(&path).await?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn write(&self, id: &str, attributes: &SessionAttributes) -> SessionResult<()> {
        let path = self.session_file(id)?;
        let content = serde_json::to_string(attributes)?;
        tokio::fs::write(&path, content).await?;
        Ok(())
    }

    async fn destroy(&self, id: &str) -> SessionResult<()> {
        let path = self.session_file(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn gc(&self) -> SessionResult<u64> {
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.save_path).await?;

        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if !name.starts_with(FILE_PREFIX) {
                continue;
            }

            let modified = entry.metadata().await?.modified()?;
            if self.is_expired(modified) {
                match tokio::fs::remove_file(entry.path()).await {
                    Ok(()) => removed += 1,
                    Err(e) => warn!("Failed to remove expired session file {}: {}", name, e),
                }
            }
        }

        if removed > 0 {
            info!(removed, "Removed expired session files");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_read_destroy() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path(), Duration::from_secs(3600)).unwrap();

        let mut attributes = SessionAttributes::new();
        attributes.insert("guid".to_string(), json!(12));
        backend.write("abc123", &attributes).await.unwrap();

        assert!(dir.path().join("sess_abc123").exists());
        assert_eq!(backend.read("abc123").await.unwrap(), Some(attributes));

        backend.destroy("abc123").await.unwrap();
        assert!(backend.read("abc123").await.unwrap().is_none());
        // Destroying twice is fine.
        backend.destroy("abc123").await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_lifetime_expires_everything() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path(), Duration::ZERO).unwrap();
        backend
            .write("abc", &SessionAttributes::new())
            .await
            .unwrap();
        std::fs::write(dir.path().join("unrelated.txt"), "keep").unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(backend.read("abc").await.unwrap().is_none());
        assert_eq!(backend.gc().await.unwrap(), 1);
        assert!(dir.path().join("unrelated.txt").exists());
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path(), Duration::from_secs(60)).unwrap();
        assert!(backend.read("../escape").await.is_err());
    }
}
