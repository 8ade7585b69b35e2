//! Pure keyword classifier for bulk-operation control messages (§4.2).
//! Case-insensitive substring matching against two ordered keyword sets;
//! continue is checked before cancel; no fuzzy matching, no LLM call.

const CONTINUE_WORDS: &[&str] = &[
    "continue", "yes", "proceed", "go", "next", "keep going", "resume", "ok", "okay", "sure", "yep", "yeah",
];

const CANCEL_WORDS: &[&str] = &[
    "cancel", "stop", "abort", "no", "halt", "quit", "end", "don't", "do not", "never mind", "nevermind",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Continue,
    Cancel,
    Unknown,
}

pub fn classify(message: &str) -> Intent {
    let lowered = message.to_lowercase();
    if CONTINUE_WORDS.iter().any(|word| lowered.contains(word)) {
        return Intent::Continue;
    }
    if CANCEL_WORDS.iter().any(|word| lowered.contains(word)) {
        return Intent::Cancel;
    }
    Intent::Unknown
}
