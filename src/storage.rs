//! Durable snapshot store for credentials and room history
//!
//! Two independent JSON snapshots live in the data directory:
//! `users.json` (username -> password hash) and `chat.json` (room name ->
//! ordered `"sender: text"` lines). Both are overwritten wholesale on every
//! flush and loaded wholesale at startup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tracing::{info, warn};

use crate::error::{ChatError, Result};

/// Credentials snapshot: username -> password hash
pub type CredentialSnapshot = HashMap<String, String>;

/// History snapshot: room name -> ordered message lines
pub type HistorySnapshot = HashMap<String, Vec<String>>;

const USERS_FILE: &str = "users.json";
const CHAT_FILE: &str = "chat.json";

/// Snapshot store rooted at a data directory
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    users_path: PathBuf,
    chat_path: PathBuf,
}

impl SnapshotStore {
    /// Open the store, creating the data directory if needed
    ///
    /// An inaccessible directory is fatal; missing snapshot files are not.
    pub async fn open(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir).await.map_err(|e| {
            ChatError::persistence(format!(
                "Cannot access data directory {}: {}",
                data_dir.display(),
                e
            ))
        })?;

        Ok(Self {
            users_path: data_dir.join(USERS_FILE),
            chat_path: data_dir.join(CHAT_FILE),
        })
    }

    /// Load both snapshots
    ///
    /// A missing or undecodable file is logged and treated as empty initial
    /// state, never fatal.
    pub async fn load(&self) -> (CredentialSnapshot, HistorySnapshot) {
        let credentials = load_snapshot(&self.users_path).await;
        let history = load_snapshot(&self.chat_path).await;
        (credentials, history)
    }

    /// Overwrite both durable snapshots
    pub async fn flush(
        &self,
        credentials: &CredentialSnapshot,
        history: &HistorySnapshot,
    ) -> Result<()> {
        write_snapshot(&self.users_path, credentials).await?;
        write_snapshot(&self.chat_path, history).await?;
        Ok(())
    }
}

async fn load_snapshot<T: DeserializeOwned + Default>(path: &Path) -> T {
    let data = match fs::read(path).await {
        Ok(data) => data,
        Err(e) => {
            info!(
                "No snapshot at {}, starting empty: {}",
                path.display(),
                e
            );
            return T::default();
        }
    };

    match serde_json::from_slice(&data) {
        Ok(value) => value,
        Err(e) => {
            warn!(
                "Failed to decode snapshot {}, starting empty: {}",
                path.display(),
                e
            );
            T::default()
        }
    }
}

/// Write the snapshot to a temp file, then rename it into place so a crash
/// mid-write never leaves a torn snapshot.
async fn write_snapshot<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_vec(value)?;

    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, &data).await.map_err(|e| {
        ChatError::persistence(format!("Failed to write {}: {}", tmp_path.display(), e))
    })?;
    fs::rename(&tmp_path, path).await.map_err(|e| {
        ChatError::persistence(format!("Failed to replace {}: {}", path.display(), e))
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_flush_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).await.unwrap();

        let mut credentials = CredentialSnapshot::new();
        credentials.insert("alice".to_string(), "hash1".to_string());

        let mut history = HistorySnapshot::new();
        history.insert(
            "general".to_string(),
            vec!["alice: hi".to_string(), "bob: hello".to_string()],
        );

        store.flush(&credentials, &history).await.unwrap();

        let (loaded_credentials, loaded_history) = store.load().await;
        assert_eq!(loaded_credentials, credentials);
        assert_eq!(loaded_history, history);
    }

    #[tokio::test]
    async fn test_load_missing_files_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).await.unwrap();

        let (credentials, history) = store.load().await;
        assert!(credentials.is_empty());
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_load_corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).await.unwrap();

        fs::write(dir.path().join("users.json"), b"not json at all")
            .await
            .unwrap();
        fs::write(dir.path().join("chat.json"), b"{\"general\": 42}")
            .await
            .unwrap();

        let (credentials, history) = store.load().await;
        assert!(credentials.is_empty());
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_flush_overwrites_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).await.unwrap();

        let mut history = HistorySnapshot::new();
        history.insert("old".to_string(), vec!["x: y".to_string()]);
        store.flush(&CredentialSnapshot::new(), &history).await.unwrap();

        let mut replacement = HistorySnapshot::new();
        replacement.insert("new".to_string(), vec!["a: b".to_string()]);
        store
            .flush(&CredentialSnapshot::new(), &replacement)
            .await
            .unwrap();

        let (_, loaded) = store.load().await;
        assert_eq!(loaded, replacement);
        assert!(!loaded.contains_key("old"));
    }
}
