//! HTTP webhook ingress/egress for the turn orchestrator (§4.9, §6).
//!
//! Normalizes a messaging-platform update into a [`TurnInput`], applies the
//! duplicate-`update_id` and process-start-timestamp gates plus a per-user
//! rate limit, hands the turn to [`orchestrator_runtime::Orchestrator`], and
//! relays the reply back out — as text, or as synthesized voice when the
//! assistant's reply carries the voice-response tag.

pub mod egress;
pub mod ingress;
pub mod rate_limit;
pub mod server;
pub mod telegram;
pub mod transcription;

pub use egress::{MessagingClient, SpeechSynthesizer};
pub use server::{build_router, run, AppState};
pub use telegram::TelegramMessagingClient;
pub use transcription::Transcriber;
