//! The axum HTTP server: one `POST /webhook` route that normalizes,
//! gates, rate-limits, and dispatches an update to the orchestrator, then
//! relays its reply back out (§4.9, §6).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Json;
use axum::routing::post;
use axum::Router;
use serde_json::{json, Value};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

use orchestrator_config::AppConfig;
use orchestrator_runtime::Orchestrator;
use orchestrator_services::turn::{OriginType, VOICE_NOTE_MARKER};

use crate::egress::{deliver_reply, MessagingClient, SpeechSynthesizer};
use crate::ingress::{normalize, IngressGate, IncomingMessage, WebhookUpdate};
use crate::rate_limit::RateLimiter;
use crate::transcription::Transcriber;

/// Keeps at most one turn in flight per user, so two updates from the same
/// user arriving close together are processed in order rather than
/// concurrently (§5 ordering guarantees).
#[derive(Default)]
struct UserSerializer {
    locks: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

impl UserSerializer {
    fn lock_for(&self, user_id: i64) -> Arc<AsyncMutex<()>> {
        self.locks.lock().unwrap().entry(user_id).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub orchestrator: Arc<Orchestrator>,
    pub messaging: Arc<dyn MessagingClient>,
    pub synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    pub transcriber: Option<Arc<dyn Transcriber>>,
    gate: Arc<IngressGate>,
    rate_limiter: Arc<RateLimiter>,
    serializer: Arc<UserSerializer>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        orchestrator: Arc<Orchestrator>,
        messaging: Arc<dyn MessagingClient>,
        synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
        transcriber: Option<Arc<dyn Transcriber>>,
    ) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(config.ingress.rate_limit_messages, config.ingress.rate_limit_window_secs));
        Self {
            config: Arc::new(config),
            orchestrator,
            messaging,
            synthesizer,
            transcriber,
            gate: Arc::new(IngressGate::new()),
            rate_limiter,
            serializer: Arc::new(UserSerializer::default()),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new().route("/webhook", post(handle_webhook)).with_state(state)
}

pub async fn run(state: AppState) -> anyhow::Result<()> {
    let bind_addr = state.config.ingress.bind_addr.clone();
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(%bind_addr, "webhook ingress listening");
    axum::serve(listener, router).await?;
    Ok(())
}

/// Always answers 200 with `{"status":"ok"}` (§6): the webhook's own
/// response carries no information about whether the update was admitted,
/// rate-limited, or actually produced a reply — all of that is observable
/// only through the side effect of the outbound message.
async fn handle_webhook(State(state): State<AppState>, headers: HeaderMap, Json(update): Json<WebhookUpdate>) -> Json<Value> {
    if !state.config.ingress.webhook_token.is_empty() {
        let provided = headers.get("x-webhook-token").and_then(|v| v.to_str().ok()).unwrap_or("");
        if provided != state.config.ingress.webhook_token {
            warn!("rejected webhook update carrying an invalid or missing token");
            return Json(json!({"status": "ok"}));
        }
    }

    let Some(message) = update.message else {
        return Json(json!({"status": "ok"}));
    };
    let Some(timestamp) = message.timestamp() else {
        warn!(update_id = update.update_id, "update carried an unparseable timestamp, dropping");
        return Json(json!({"status": "ok"}));
    };

    if !state.gate.admit(update.update_id, timestamp) {
        debug!(update_id = update.update_id, "dropped duplicate or stale update");
        return Json(json!({"status": "ok"}));
    }

    let user_id = message.from.as_ref().map(|f| f.id).unwrap_or(message.chat.id);
    if !state.rate_limiter.check(user_id) {
        let chat_id = message.chat.id.to_string();
        let messaging = state.messaging.clone();
        tokio::spawn(async move {
            if let Err(err) = messaging.send_text(&chat_id, "You're sending messages a bit fast — please wait a moment and try again.").await {
                warn!(error = %err, "failed to deliver rate-limit cooldown notice");
            }
        });
        return Json(json!({"status": "ok"}));
    }

    tokio::spawn(process_update(state, message, update.update_id));
    Json(json!({"status": "ok"}))
}

async fn process_update(state: AppState, message: IncomingMessage, update_id: i64) {
    let origin = message.origin_type();
    let chat_id = message.chat.id.to_string();
    let user_id = message.from.as_ref().map(|f| f.id).unwrap_or(message.chat.id);

    let content = match resolve_content(&state, &message, origin).await {
        Ok(content) => content,
        Err(err) => {
            warn!(error = %err, update_id, "failed to resolve message content, dropping update");
            return;
        }
    };

    let turn = normalize(&message, origin, content, format!("update-{update_id}"));

    let user_lock = state.serializer.lock_for(user_id);
    let _guard = user_lock.lock().await;

    let reply = match state.orchestrator.handle_turn(&turn).await {
        Ok(reply) => reply,
        Err(err) => {
            error!(error = %err, user_id, "turn orchestrator failed");
            "Something went wrong handling that. Please try again.".to_string()
        }
    };

    if let Err(err) = deliver_reply(state.messaging.as_ref(), state.synthesizer.as_deref(), &chat_id, &reply).await {
        error!(error = %err, user_id, "failed to deliver reply");
    }
}

/// Resolves the final message text the orchestrator will see: the raw text
/// for a text/command update, or a transcription prefixed with the voice
/// marker for a voice note. Other media types without accompanying text
/// fall back to their caption, or an empty string if there truly is none to
/// route on — the LLM tool loop will ask a clarifying question in that case.
async fn resolve_content(state: &AppState, message: &IncomingMessage, origin: OriginType) -> anyhow::Result<String> {
    if origin == OriginType::Voice {
        let file_id = message.file_id().ok_or_else(|| anyhow::anyhow!("voice update carried no file id"))?;
        let transcriber = state.transcriber.as_ref().ok_or_else(|| anyhow::anyhow!("no transcriber configured"))?;
        let text = transcriber.transcribe(file_id).await?;
        return Ok(format!("{VOICE_NOTE_MARKER}{text}"));
    }

    Ok(message.text.clone().or_else(|| message.caption.clone()).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingress::Chat;

    fn message(text: &str) -> IncomingMessage {
        IncomingMessage {
            message_id: 1,
            from: Some(crate::ingress::FromUser { id: 42 }),
            chat: Chat { id: 42 },
            date: chrono::Utc::now().timestamp(),
            text: Some(text.to_string()),
            caption: None,
            voice: None,
            audio: None,
            photo: None,
            video: None,
            document: None,
        }
    }

    #[tokio::test]
    async fn resolve_content_passes_text_through() {
        struct NoopMessaging;
        #[async_trait::async_trait]
        impl MessagingClient for NoopMessaging {
            async fn send_text(&self, _chat_id: &str, _text: &str) -> anyhow::Result<()> {
                Ok(())
            }
            async fn send_voice(&self, _chat_id: &str, _audio_path: &std::path::Path) -> anyhow::Result<()> {
                Ok(())
            }
        }

        let state = AppState::new(
            AppConfig::default(),
            crate::tests_support::noop_orchestrator().await,
            Arc::new(NoopMessaging),
            None,
            None,
        );
        let content = resolve_content(&state, &message("hi there"), OriginType::Text).await.unwrap();
        assert_eq!(content, "hi there");
    }
}
