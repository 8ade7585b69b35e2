//! The normalized shape every ingress adapter reduces a platform update to
//! before handing it to the turn orchestrator.

use serde::{Deserialize, Serialize};

/// How the raw platform update arrived. Only `Text` and `Voice` ever carry
/// text worth routing; the rest exist so the ingress can still acknowledge
/// (and log) updates it has no handler for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginType {
    Text,
    Voice,
    Command,
    Caption,
    Audio,
    Photo,
    Video,
    Document,
    Unknown,
}

/// A single marker prefixed onto transcribed voice-note content so
/// downstream flow parsers and the LLM system prompt can tell a turn
/// originated as speech.
pub const VOICE_NOTE_MARKER: &str = "[voice note] ";

/// A normalized, platform-agnostic user turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnInput {
    pub user_id: i64,
    pub chat_id: String,
    pub origin: OriginType,
    pub message: String,
    pub file_id: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub correlation_id: String,
}

impl TurnInput {
    pub fn is_voice(&self) -> bool {
        self.origin == OriginType::Voice
    }

    /// The message text with the voice-note marker stripped, if present.
    pub fn content(&self) -> &str {
        self.message
            .strip_prefix(VOICE_NOTE_MARKER)
            .unwrap_or(&self.message)
    }
}
