//! Durable per-user flow state machines (§3, §4.5): the pending-flow
//! records, the keyword intent classifier bulk control messages use, the
//! tool-call rewrite rules the LLM loop applies before dispatch, the
//! dedicated mail scan/spam engines, and the handlers that gate each flow.

pub mod handlers;
pub mod intent;
pub mod mail_scan;
pub mod mail_spam;
pub mod records;
pub mod rewrite;

pub use handlers::Flows;
pub use intent::{classify, Intent};
pub use mail_scan::MailLimits;
pub use records::{
    CalendarCancelRecord, CalendarNoteRecord, CandidateSummary, ConfidenceClarifyRecord,
    GenericToolConfirmRecord, MailScanAction, MailScanRecord, MailSendConfirmRecord,
    MailSpamRecord, SpamAction, TaskBoardDispatchRecord,
};
pub use rewrite::rewrite_tool_call;
