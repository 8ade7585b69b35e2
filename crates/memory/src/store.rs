//! Append-only conversation log plus a single upserted long-term summary
//! row per user, backed by a JSONL file and a small JSON side file.
//!
//! The append path opens for append, writes one line, flushes, and fsyncs.
//! The summary path mirrors the pending-state store's atomic
//! write-tmp-then-rename, since it is read far more often than it is
//! written and must never be observed half-written.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub user_id: i64,
    pub role: TurnRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// The two operations the orchestrator depends on (§6): append a turn,
/// fetch the most recent N for a user, and upsert/read the rolling summary.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn append(&self, turn: ConversationTurn) -> anyhow::Result<()>;
    async fn recent(&self, user_id: i64, n: usize) -> anyhow::Result<Vec<ConversationTurn>>;
    async fn get_summary(&self, user_id: i64) -> anyhow::Result<Option<String>>;
    async fn upsert_summary(&self, user_id: i64, summary: String) -> anyhow::Result<()>;
}

pub struct JsonlMemoryStore {
    log_path: PathBuf,
    summary_path: PathBuf,
    summaries: Mutex<Option<HashMap<i64, String>>>,
}

impl JsonlMemoryStore {
    pub fn new(log_path: impl Into<PathBuf>, summary_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
            summary_path: summary_path.into(),
            summaries: Mutex::new(None),
        }
    }

    async fn load_summaries(path: &Path) -> HashMap<i64, String> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                tracing::warn!(path = %path.display(), error = %err, "corrupt long-term summary file, starting empty");
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        }
    }

    async fn flush_summaries(map: &HashMap<i64, String>, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp_path = {
            let filename = path
                .file_name()
                .map(|f| f.to_string_lossy().to_string())
                .unwrap_or_else(|| "summaries.json".to_string());
            path.with_file_name(format!("{filename}.tmp"))
        };

        let rendered = serde_json::to_string_pretty(map)?;
        tokio::fs::write(&tmp_path, rendered.as_bytes()).await?;
        if let Err(err) = tokio::fs::rename(&tmp_path, path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }
        Ok(())
    }
}

#[async_trait]
impl MemoryStore for JsonlMemoryStore {
    async fn append(&self, turn: ConversationTurn) -> anyhow::Result<()> {
        if let Some(parent) = self.log_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await?;
        let line = serde_json::to_string(&turn)?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }

    async fn recent(&self, user_id: i64, n: usize) -> anyhow::Result<Vec<ConversationTurn>> {
        let file = match tokio::fs::File::open(&self.log_path).await {
            Ok(file) => file,
            Err(_) => return Ok(Vec::new()),
        };
        let mut lines = tokio::io::BufReader::new(file).lines();
        let mut matched = Vec::new();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ConversationTurn>(&line) {
                Ok(turn) if turn.user_id == user_id => matched.push(turn),
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "skipping corrupt conversation log line");
                }
            }
        }
        let start = matched.len().saturating_sub(n);
        Ok(matched.split_off(start))
    }

    async fn get_summary(&self, user_id: i64) -> anyhow::Result<Option<String>> {
        let mut guard = self.summaries.lock().await;
        if guard.is_none() {
            *guard = Some(Self::load_summaries(&self.summary_path).await);
        }
        Ok(guard.as_ref().and_then(|m| m.get(&user_id).cloned()))
    }

    async fn upsert_summary(&self, user_id: i64, summary: String) -> anyhow::Result<()> {
        let mut guard = self.summaries.lock().await;
        if guard.is_none() {
            *guard = Some(Self::load_summaries(&self.summary_path).await);
        }
        let map = guard.as_mut().expect("just populated");
        map.insert(user_id, summary);
        if let Err(err) = Self::flush_summaries(map, &self.summary_path).await {
            tracing::warn!(error = %err, "failed to flush long-term summary");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(user_id: i64, role: TurnRole, content: &str) -> ConversationTurn {
        ConversationTurn {
            user_id,
            role,
            content: content.to_string(),
            metadata: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn append_then_recent_returns_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlMemoryStore::new(dir.path().join("log.jsonl"), dir.path().join("summaries.json"));

        store.append(turn(1, TurnRole::User, "hi")).await.unwrap();
        store.append(turn(1, TurnRole::Assistant, "hello")).await.unwrap();
        store.append(turn(2, TurnRole::User, "other user")).await.unwrap();

        let recent = store.recent(1, 10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "hi");
        assert_eq!(recent[1].content, "hello");
    }

    #[tokio::test]
    async fn recent_caps_at_n_keeping_latest() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlMemoryStore::new(dir.path().join("log.jsonl"), dir.path().join("summaries.json"));
        for i in 0..5 {
            store
                .append(turn(1, TurnRole::User, &format!("msg {i}")))
                .await
                .unwrap();
        }

        let recent = store.recent(1, 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "msg 3");
        assert_eq!(recent[1].content, "msg 4");
    }

    #[tokio::test]
    async fn summary_upserts_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlMemoryStore::new(dir.path().join("log.jsonl"), dir.path().join("summaries.json"));

        assert!(store.get_summary(1).await.unwrap().is_none());
        store.upsert_summary(1, "first".into()).await.unwrap();
        assert_eq!(store.get_summary(1).await.unwrap().as_deref(), Some("first"));
        store.upsert_summary(1, "second".into()).await.unwrap();
        assert_eq!(store.get_summary(1).await.unwrap().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn missing_log_yields_empty_recent() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlMemoryStore::new(dir.path().join("missing.jsonl"), dir.path().join("summaries.json"));
        assert!(store.recent(1, 10).await.unwrap().is_empty());
    }
}
