//! A concrete [`MessagingClient`] for the Telegram Bot API. The ingress
//! payload shapes in [`crate::ingress`] are already modeled after Telegram's
//! `Update`/`Message` objects, so this adapter just has to speak the two
//! outbound verbs back to the same API.

use std::path::Path;

use anyhow::{bail, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::egress::MessagingClient;

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    description: Option<String>,
    #[serde(default)]
    result: Option<T>,
}

pub struct TelegramMessagingClient {
    client: Client,
    base_url: String,
}

impl TelegramMessagingClient {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self { client: Client::new(), base_url: format!("https://api.telegram.org/bot{}", bot_token.into()) }
    }
}

#[async_trait::async_trait]
impl MessagingClient for TelegramMessagingClient {
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<()> {
        let url = format!("{}/sendMessage", self.base_url);
        let body = SendMessageRequest { chat_id, text, disable_web_page_preview: true };
        let response = self.client.post(url).json(&body).send().await?.error_for_status()?;
        let payload: TelegramResponse<serde_json::Value> = response.json().await?;
        if !payload.ok {
            bail!(payload.description.unwrap_or_else(|| "telegram sendMessage failed".to_string()));
        }
        Ok(())
    }

    async fn send_voice(&self, chat_id: &str, audio_path: &Path) -> Result<()> {
        let url = format!("{}/sendVoice", self.base_url);
        let bytes = tokio::fs::read(audio_path).await?;
        let file_name = audio_path.file_name().and_then(|n| n.to_str()).unwrap_or("voice.ogg").to_string();
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name).mime_str("audio/ogg")?;
        let form = reqwest::multipart::Form::new().text("chat_id", chat_id.to_string()).part("voice", part);
        let response = self.client.post(url).multipart(form).send().await?.error_for_status()?;
        let payload: TelegramResponse<serde_json::Value> = response.json().await?;
        if !payload.ok {
            bail!(payload.description.unwrap_or_else(|| "telegram sendVoice failed".to_string()));
        }
        Ok(())
    }
}
