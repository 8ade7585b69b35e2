//! System-prompt assembly for the main LLM call (§4.7 step 2).
//!
//! Kept as a pure function of config + a few strings so it can be unit
//! tested without spinning up an orchestrator.

use chrono::Utc;
use orchestrator_config::AppConfig;

/// The literal tag the assistant appends to request a synthesized-voice
/// reply instead of plain text (§6 egress). Canonicalization of the
/// separator variants a model might emit happens on the egress side; the
/// system prompt only ever asks for this exact form.
pub const VOICE_RESPONSE_TAG: &str = "[VOICERESPONSEREQUESTED]";

/// Builds the fixed system prompt: identity, formatting rules, the
/// voice-mode tag, deletion-safety, time-awareness, and long-term-memory
/// discipline (§4.7).
pub fn build_system_prompt(config: &AppConfig) -> String {
    let now = current_time_in_zone(&config.agent.timezone);
    format!(
        "You are {name}, a conversational assistant that acts on the owner's \
mail, calendar, and task board through tool calls.\n\
\n\
FORMATTING: reply in plain conversational text. Do not use markdown tables, \
headers, or code fences unless the user explicitly asks for code. Keep \
replies short — a few sentences, not an essay.\n\
\n\
VOICE MODE: if the user's message arrived as a voice note (marked \
\"[voice note]\"), or they otherwise ask to hear your answer spoken back, end \
your reply with the exact tag {voice_tag} on its own line with nothing after \
it. Only add this tag when a spoken reply is wanted — never include it \
otherwise, and never mention the tag itself to the user.\n\
\n\
DELETION SAFETY: never delete, trash, or otherwise destructively modify mail, \
calendar events, or task-board cards without the user's explicit prior \
confirmation. If a tool tells you it needs confirmation, relay its question \
verbatim and wait.\n\
\n\
TIME AWARENESS: the current time is {now} ({tz}). Resolve relative dates \
(\"tomorrow\", \"next Friday\") against this instant, not your training data.\n\
\n\
MEMORY DISCIPLINE: you are given a long-term summary and the last few turns \
of this conversation below. Treat the summary as background, not a script — \
don't restate it, and don't repeat an answer you already gave unless asked \
to.",
        name = config.agent.name,
        voice_tag = VOICE_RESPONSE_TAG,
        now = now,
        tz = config.agent.timezone,
    )
}

fn current_time_in_zone(tz_name: &str) -> String {
    match tz_name.parse::<chrono_tz::Tz>() {
        Ok(tz) => Utc::now().with_timezone(&tz).format("%Y-%m-%d %H:%M %Z").to_string(),
        Err(_) => Utc::now().format("%Y-%m-%d %H:%M UTC").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_names_the_agent_and_voice_tag() {
        let config = AppConfig::default();
        let prompt = build_system_prompt(&config);
        assert!(prompt.contains(&config.agent.name));
        assert!(prompt.contains(VOICE_RESPONSE_TAG));
    }

    #[test]
    fn falls_back_gracefully_on_an_unknown_timezone() {
        let mut config = AppConfig::default();
        config.agent.timezone = "Not/AZone".to_string();
        let prompt = build_system_prompt(&config);
        assert!(prompt.contains("UTC"));
    }
}
