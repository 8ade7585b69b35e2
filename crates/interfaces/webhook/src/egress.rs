//! Outbound delivery (§6 egress): two verbs, send-text and send-voice, plus
//! the voice-response tag detection that decides which one a given reply
//! uses.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;

/// What the messaging platform's send API looks like from the egress
/// side's point of view. Implemented once per platform connector.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<()>;
    async fn send_voice(&self, chat_id: &str, audio_path: &Path) -> Result<()>;
}

/// Text-to-speech, kept behind a contract (§1 out-of-scope: synthesis
/// internals). Returns the local path of the rendered audio file.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<PathBuf>;
}

fn voice_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // Accepts `[VOICERESPONSEREQUESTED]`, `[VOICE_RESPONSE_REQUESTED]`, and
    // `[VOICE RESPONSE REQUESTED]` (any case, any mix of `_`/space between
    // words), anchored to the end of the reply (§8 invariant 6: the tag
    // never survives into outbound text).
    PATTERN.get_or_init(|| Regex::new(r"(?i)\s*\[\s*voice[_\s]*response[_\s]*requested\s*\]\s*$").unwrap())
}

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"https?://\S+").unwrap())
}

/// Strips a trailing voice-response tag, if present, returning the
/// remaining text and whether the tag was found.
pub fn strip_voice_tag(text: &str) -> (String, bool) {
    if voice_tag_pattern().is_match(text) {
        (voice_tag_pattern().replace(text, "").trim_end().to_string(), true)
    } else {
        (text.to_string(), false)
    }
}

/// Pulls every `http(s)://` URL out of a string, in order of appearance.
pub fn extract_urls(text: &str) -> Vec<String> {
    url_pattern().find_iter(text).map(|m| m.as_str().trim_end_matches(['.', ',', ')']).to_string()).collect()
}

/// Delivers one assistant reply: text normally, or synthesized voice
/// followed by a text message of any URLs when the reply asked for voice
/// and a synthesizer is configured (§6 egress).
pub async fn deliver_reply(
    client: &dyn MessagingClient,
    synthesizer: Option<&dyn SpeechSynthesizer>,
    chat_id: &str,
    reply: &str,
) -> Result<()> {
    let (stripped, wants_voice) = strip_voice_tag(reply);

    if wants_voice {
        if let Some(synthesizer) = synthesizer {
            let urls = extract_urls(&stripped);
            let audio_path = synthesizer.synthesize(&stripped).await?;
            client.send_voice(chat_id, &audio_path).await?;
            if !urls.is_empty() {
                client.send_text(chat_id, &urls.join("\n")).await?;
            }
            return Ok(());
        }
    }

    client.send_text(chat_id, &stripped).await
}
