//! Durable pending-flow records (§3). Each is a tagged enum over its
//! distinct phases rather than one untyped bag of booleans, so a handler
//! can only ever be in a state its own type admits.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which of the three named mail operations (§4.5.1/§4.5.2) a
/// [`MailScanRecord`] is driving, and the label mutation its EXECUTE phase
/// applies to each 500-id batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MailScanAction {
    DeleteTrash,
    DeletePermanent,
    MarkRead { sender: String },
}

/// Pending state shared by mail-delete and mail-mark-read (§4.5.1/§4.5.2):
/// both scan up to `MAX_SCAN` ids across as many 500-id pages as it takes
/// during DRY_RUN, buffer every id found, and drain the buffer in
/// `MAX_PER_TURN`-sized slices of 500-id batches across however many
/// EXECUTE turns it takes. `scanned` is the DRY_RUN total (prefixed
/// "at-least" in user-facing text when `capped`); `processed` only ever
/// grows, and `buffer.len() + processed == scanned` always holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailScanRecord {
    pub query: String,
    pub descriptor: String,
    pub action: MailScanAction,
    pub buffer: VecDeque<String>,
    pub scanned: u64,
    pub capped: bool,
    pub processed: u64,
    pub samples: Vec<String>,
}

/// Which spam-clean sub-action (§4.5.3) a [`MailSpamRecord`] is driving.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpamAction {
    MoveToTrash,
    PermanentDelete,
}

/// Pending state for spam-clean (§4.5.3): DRY_RUN fetches exactly one list
/// page up front (buffered here along with its cursor), and EXECUTE drains
/// every remaining id in one turn, one page at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailSpamRecord {
    pub query: String,
    pub action: SpamAction,
    pub buffer: VecDeque<String>,
    pub page_token: Option<String>,
    pub exhausted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailSendConfirmRecord {
    pub tool_name: String,
    pub args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSummary {
    pub event_id: String,
    pub title: String,
    pub start: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CalendarCancelRecord {
    AwaitingSelection { candidates: Vec<CandidateSummary>, query_title: String },
    AwaitingScope { event_id: String },
    AwaitingConfirmation { event_id: String, series: bool },
    Confirmed { event_id: String, series: bool },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CalendarNoteRecord {
    AwaitingSelection { candidates: Vec<CandidateSummary>, query_title: String },
    AwaitingNote { event_id: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskBoardDispatchRecord {
    pub awaiting: String,
    pub args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenericToolConfirmRecord {
    pub tool_name: String,
    pub args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceClarifyRecord {
    pub tool_name: String,
    pub args: Value,
    pub awaiting: String,
    pub question: String,
}
