//! Normalizes a raw messaging-platform webhook payload into the
//! orchestrator's [`TurnInput`] (§3, §6), and the two drop gates that sit in
//! front of it: the monotonic `update_id` gate and the process-start
//! timestamp gate.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use orchestrator_services::turn::OriginType;

/// The update envelope every webhook call delivers. Shaped after the
/// Telegram `Update` object, which is representative of the messaging
/// platforms this ingress targets; a different platform's connector would
/// translate into this same shape before reaching [`normalize`].
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookUpdate {
    pub update_id: i64,
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub message_id: i64,
    pub from: Option<FromUser>,
    pub chat: Chat,
    /// Unix seconds, as the platform reports it.
    pub date: i64,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub voice: Option<MediaRef>,
    pub audio: Option<MediaRef>,
    pub photo: Option<Vec<MediaRef>>,
    pub video: Option<MediaRef>,
    pub document: Option<MediaRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FromUser {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaRef {
    pub file_id: String,
}

impl IncomingMessage {
    /// The origin-type classification (§3): text, voice, command, caption,
    /// audio, photo, video, document, or unknown.
    pub fn origin_type(&self) -> OriginType {
        if let Some(text) = &self.text {
            if text.starts_with('/') {
                return OriginType::Command;
            }
            return OriginType::Text;
        }
        if self.voice.is_some() {
            return OriginType::Voice;
        }
        if self.audio.is_some() {
            return OriginType::Audio;
        }
        if self.photo.is_some() {
            return OriginType::Photo;
        }
        if self.video.is_some() {
            return OriginType::Video;
        }
        if self.document.is_some() {
            return OriginType::Document;
        }
        if self.caption.is_some() {
            return OriginType::Caption;
        }
        OriginType::Unknown
    }

    /// The platform file id for a voice note or other media attachment, if
    /// this update carries one — needed to fetch the file for transcription.
    pub fn file_id(&self) -> Option<&str> {
        self.voice
            .as_ref()
            .or(self.audio.as_ref())
            .or(self.video.as_ref())
            .or(self.document.as_ref())
            .map(|m| m.file_id.as_str())
            .or_else(|| self.photo.as_ref().and_then(|p| p.last()).map(|m| m.file_id.as_str()))
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.date, 0)
    }
}

/// Builds the normalized [`TurnInput`] once the caller has resolved the
/// final message text (transcribing a voice note, or falling back to the
/// caption/text already present).
pub fn normalize(
    message: &IncomingMessage,
    origin: OriginType,
    content: String,
    correlation_id: String,
) -> orchestrator_services::turn::TurnInput {
    let user_id = message.from.as_ref().map(|f| f.id).unwrap_or(message.chat.id);
    orchestrator_services::turn::TurnInput {
        user_id,
        chat_id: message.chat.id.to_string(),
        origin,
        message: content,
        file_id: message.file_id().map(ToString::to_string),
        timestamp: message.timestamp().unwrap_or_else(Utc::now),
        correlation_id,
    }
}

/// The two drop gates applied before a turn ever reaches the orchestrator
/// (§6, §8 invariants 7/8): a duplicate `update_id` (monotonic, per
/// process — see REDESIGN FLAGS open question 4 on multi-replica
/// deployments) and any message whose timestamp predates process start.
pub struct IngressGate {
    last_seen_update_id: Mutex<i64>,
    started_at: DateTime<Utc>,
}

impl IngressGate {
    pub fn new() -> Self {
        Self { last_seen_update_id: Mutex::new(0), started_at: Utc::now() }
    }

    #[cfg(test)]
    fn with_start_time(started_at: DateTime<Utc>) -> Self {
        Self { last_seen_update_id: Mutex::new(0), started_at }
    }

    /// Returns `true` if this update should be processed, `false` if it
    /// should be silently dropped.
    pub fn admit(&self, update_id: i64, message_timestamp: DateTime<Utc>) -> bool {
        if message_timestamp < self.started_at {
            return false;
        }
        let mut last_seen = self.last_seen_update_id.lock().unwrap();
        if update_id <= *last_seen {
            return false;
        }
        *last_seen = update_id;
        true
    }
}

impl Default for IngressGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn admits_strictly_increasing_update_ids() {
        let gate = IngressGate::new();
        let now = Utc::now();
        assert!(gate.admit(5, now));
        assert!(!gate.admit(5, now));
        assert!(!gate.admit(3, now));
        assert!(gate.admit(6, now));
    }

    #[test]
    fn drops_messages_predating_process_start() {
        let start = Utc::now();
        let gate = IngressGate::with_start_time(start);
        assert!(!gate.admit(1, start - Duration::seconds(5)));
        assert!(gate.admit(1, start + Duration::seconds(1)));
    }

    #[test]
    fn origin_type_prefers_text_and_falls_back_to_unknown() {
        let msg = IncomingMessage {
            message_id: 1,
            from: None,
            chat: Chat { id: 1 },
            date: 0,
            text: Some("hello".into()),
            caption: None,
            voice: None,
            audio: None,
            photo: None,
            video: None,
            document: None,
        };
        assert_eq!(msg.origin_type(), OriginType::Text);

        let blank = IncomingMessage { text: None, ..msg };
        assert_eq!(blank.origin_type(), OriginType::Unknown);
    }

    #[test]
    fn slash_prefixed_text_is_a_command() {
        let msg = IncomingMessage {
            message_id: 1,
            from: None,
            chat: Chat { id: 1 },
            date: 0,
            text: Some("/start".into()),
            caption: None,
            voice: None,
            audio: None,
            photo: None,
            video: None,
            document: None,
        };
        assert_eq!(msg.origin_type(), OriginType::Command);
    }
}
