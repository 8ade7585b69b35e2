//! Voice-note transcription, kept behind a contract (§1 out-of-scope: the
//! transcription implementation itself). The ingress calls this once per
//! voice update to turn the attached file into text before the turn ever
//! reaches the orchestrator.

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Fetches and transcribes the platform file referenced by `file_id`.
    async fn transcribe(&self, file_id: &str) -> Result<String>;
}
