//! JSON snapshot backend
//!
//! The snapshot is the canonical form of the state tree, written to a
//! temp file and renamed into place so a crash never leaves a torn
//! file behind.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::{AppState, StatePersistence, StoreResult};

pub struct JsonSnapshotBackend {
    path: PathBuf,
}

impl JsonSnapshotBackend {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StatePersistence for JsonSnapshotBackend {
    async fn load(&self) -> StoreResult<Option<AppState>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let state: AppState = serde_json::from_slice(&bytes)?;
                Ok(Some(state))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, state: &AppState) -> StoreResult<()> {
        let value = serde_json::to_value(state)?;
        let bytes = swapring_canonical::canonical_bytes(&value)?;

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        info!(path = %self.path.display(), bytes = bytes.len(), "state snapshot written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swapring_types::IdempotencyRecord;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("swapring_snapshot_{}_{}.json", name, std::process::id()))
    }

    #[tokio::test]
    async fn test_load_missing_file_is_none() {
        let backend = JsonSnapshotBackend::new(temp_path("missing"));
        assert!(backend.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let path = temp_path("roundtrip");
        let backend = JsonSnapshotBackend::new(&path);

        let mut state = AppState::default();
        state.webhook_seen.insert("evt_1".to_string());
        state.idempotency.insert(
            "op|k|user:u1".to_string(),
            IdempotencyRecord {
                scope_key: "op|k|user:u1".to_string(),
                payload_hash: "abc".to_string(),
                result_envelope: serde_json::json!({"ok": true}),
                created_at: chrono::Utc::now(),
            },
        );
        backend.save(&state).await.unwrap();

        let loaded = backend.load().await.unwrap().unwrap();
        assert!(loaded.webhook_seen.contains("evt_1"));
        assert_eq!(loaded.idempotency.len(), 1);

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_no_tmp_file_left_behind() {
        let path = temp_path("tmpcheck");
        let backend = JsonSnapshotBackend::new(&path);
        backend.save(&AppState::default()).await.unwrap();
        assert!(!path.with_extension("tmp").exists());
        let _ = tokio::fs::remove_file(&path).await;
    }
}
