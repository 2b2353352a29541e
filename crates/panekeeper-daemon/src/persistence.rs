use async_trait::async_trait;
use chrono::{DateTime, Utc};
use panekeeper_types::{PanekeeperError, PanekeeperResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// What is kept about a pane's session across a restart.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub pane_id: String,
    pub session_id: String,
    pub working_directory: PathBuf,
    pub restart_count: u32,
    pub saved_at: DateTime<Utc>,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save(&self, pane_id: &str, snapshot: &SessionSnapshot) -> PanekeeperResult<()>;

    async fn load(&self, pane_id: &str) -> PanekeeperResult<Option<SessionSnapshot>>;
}

/// One JSON file per pane under a directory.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, pane_id: &str) -> PathBuf {
        let name: String = pane_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

#[async_trait]
impl SessionStore for JsonFileStore {
    async fn save(&self, pane_id: &str, snapshot: &SessionSnapshot) -> PanekeeperResult<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| PanekeeperError::Persistence(format!("Failed to create {:?}: {}", self.dir, e)))?;

        let json = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| PanekeeperError::Serialization(e.to_string()))?;

        let path = self.path_for(pane_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| PanekeeperError::Persistence(format!("Failed to write {:?}: {}", tmp, e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| PanekeeperError::Persistence(format!("Failed to replace {:?}: {}", path, e)))?;

        debug!("Saved session snapshot for {} to {:?}", pane_id, path);
        Ok(())
    }

    async fn load(&self, pane_id: &str) -> PanekeeperResult<Option<SessionSnapshot>> {
        let path = self.path_for(pane_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(PanekeeperError::Persistence(format!(
                    "Failed to read {:?}: {}",
                    path, e
                )))
            }
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| PanekeeperError::Serialization(format!("{:?}: {}", path, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(pane: &str) -> SessionSnapshot {
        SessionSnapshot {
            pane_id: pane.into(),
            session_id: "abc-123".into(),
            working_directory: PathBuf::from("/work/dev1"),
            restart_count: 2,
            saved_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("sessions"));

        assert!(store.load("dev1").await.unwrap().is_none());

        let snap = snapshot("dev1");
        store.save("dev1", &snap).await.unwrap();
        assert_eq!(store.load("dev1").await.unwrap(), Some(snap));
    }

    #[test]
    fn test_pane_ids_sanitized() {
        let store = JsonFileStore::new("/data/sessions");
        assert_eq!(
            store.path_for("../etc/passwd"),
            PathBuf::from("/data/sessions/___etc_passwd.json")
        );
    }

    #[tokio::test]
    async fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        std::fs::write(store.path_for("dev2"), b"{ not json").unwrap();
        assert!(matches!(
            store.load("dev2").await,
            Err(PanekeeperError::Serialization(_))
        ));
    }
}
