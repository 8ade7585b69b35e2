//! Durable per-user pending-flow state.
//!
//! Each flow handler owns one [`PendingStore<T>`], addressed by a single JSON
//! file under the configured data directory. Every mutation is flushed to
//! disk synchronously under the store's own lock before the call returns, so
//! a reply that tells the user "say continue" is only ever sent once the
//! record it depends on has survived a crash.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// A durable map from user id to a flow-specific pending record.
///
/// Rehydrated lazily from its backing file on first access; a missing or
/// malformed file yields an empty map rather than an error, since a pending
/// flow store is inherently best-effort state — losing it just means the
/// affected users have to restate their request.
pub struct PendingStore<T> {
    path: PathBuf,
    records: Mutex<Option<HashMap<i64, T>>>,
}

impl<T> PendingStore<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn ensure_loaded<'a>(
        guard: &'a mut Option<HashMap<i64, T>>,
        path: &Path,
    ) -> &'a mut HashMap<i64, T> {
        if guard.is_none() {
            let loaded = match tokio::fs::read_to_string(path).await {
                Ok(raw) => serde_json::from_str::<HashMap<i64, T>>(&raw).unwrap_or_else(|err| {
                    tracing::warn!(path = %path.display(), error = %err, "corrupt pending-state file, starting empty");
                    HashMap::new()
                }),
                Err(_) => HashMap::new(),
            };
            *guard = Some(loaded);
        }
        guard.as_mut().expect("just populated")
    }

    pub async fn get(&self, user_id: i64) -> Option<T> {
        let mut guard = self.records.lock().await;
        let map = Self::ensure_loaded(&mut guard, &self.path).await;
        map.get(&user_id).cloned()
    }

    pub async fn set(&self, user_id: i64, record: T) -> Result<()> {
        let mut guard = self.records.lock().await;
        let map = Self::ensure_loaded(&mut guard, &self.path).await;
        map.insert(user_id, record);
        if let Err(err) = Self::flush(map, &self.path).await {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to flush pending state, keeping in-memory value");
        }
        Ok(())
    }

    pub async fn clear(&self, user_id: i64) -> Result<()> {
        let mut guard = self.records.lock().await;
        let map = Self::ensure_loaded(&mut guard, &self.path).await;
        map.remove(&user_id);
        if let Err(err) = Self::flush(map, &self.path).await {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to flush pending state after clear");
        }
        Ok(())
    }

    /// Atomically replace the backing file: write to a `.tmp` sibling,
    /// fsync, then rename over the original. A crash before the rename
    /// leaves the previous file untouched; a crash after leaves a
    /// consistent new file.
    async fn flush(map: &HashMap<i64, T>, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp_path = {
            let filename = path
                .file_name()
                .map(|f| f.to_string_lossy().to_string())
                .unwrap_or_else(|| "pending.json".to_string());
            path.with_file_name(format!("{filename}.tmp"))
        };

        let write_result: Result<()> = async {
            let rendered = serde_json::to_string_pretty(map)?;
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)
                .await?;
            file.write_all(rendered.as_bytes()).await?;
            file.flush().await?;
            file.sync_all().await?;
            Ok(())
        }
        .await;

        if let Err(err) = write_result {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(err);
        }

        if let Err(err) = tokio::fs::rename(&tmp_path, path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Dummy {
        step: u32,
        note: String,
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = PendingStore::<Dummy>::new(dir.path().join("pending_dummy.json"));

        store
            .set(
                42,
                Dummy {
                    step: 1,
                    note: "hi".into(),
                },
            )
            .await
            .unwrap();

        let got = store.get(42).await.unwrap();
        assert_eq!(got.step, 1);
        assert_eq!(got.note, "hi");
    }

    #[tokio::test]
    async fn clear_removes_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = PendingStore::<Dummy>::new(dir.path().join("pending_dummy.json"));

        store
            .set(
                1,
                Dummy {
                    step: 0,
                    note: String::new(),
                },
            )
            .await
            .unwrap();
        store.clear(1).await.unwrap();

        assert!(store.get(1).await.is_none());
    }

    #[tokio::test]
    async fn survives_reload_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending_dummy.json");

        {
            let store = PendingStore::<Dummy>::new(&path);
            store
                .set(
                    7,
                    Dummy {
                        step: 3,
                        note: "persisted".into(),
                    },
                )
                .await
                .unwrap();
        }

        let reloaded = PendingStore::<Dummy>::new(&path);
        let got = reloaded.get(7).await.unwrap();
        assert_eq!(got.note, "persisted");
    }

    #[tokio::test]
    async fn missing_file_yields_none_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = PendingStore::<Dummy>::new(dir.path().join("does_not_exist.json"));
        assert!(store.get(1).await.is_none());
    }

    #[tokio::test]
    async fn corrupt_file_yields_empty_map() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending_dummy.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let store = PendingStore::<Dummy>::new(&path);
        assert!(store.get(1).await.is_none());
    }
}
