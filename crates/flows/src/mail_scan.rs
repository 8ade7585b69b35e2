//! The scan/execute engine behind mail-delete and mail-mark-read (§4.5.1,
//! §4.5.2). Both flows scan up to `MAX_SCAN` ids and process up to
//! `MAX_PER_TURN` of them per turn — far beyond what the generic §4.6
//! bulk pipeline's 200-item ceiling allows — so they drive `MailService`
//! directly instead of going through `orchestrator-bulk`.

use std::collections::VecDeque;

use orchestrator_services::error::ErrorKind;
use orchestrator_services::mail::MailService;
use orchestrator_services::ServiceResult;

use crate::records::{MailScanAction, MailScanRecord};

const SAMPLE_COUNT: usize = 5;

/// Knobs carried over from `AppConfig` (`mail.max_scan`,
/// `mail.list_page_size`, `bulk.mail_max_per_turn_delete`,
/// `bulk.mail_max_per_turn_mark_read`). The same 500-id figure backs both
/// the DRY_RUN list-page size and the EXECUTE batch-chunk size, per spec.
#[derive(Debug, Clone, Copy)]
pub struct MailLimits {
    pub list_page_size: u32,
    pub max_scan: usize,
    pub max_per_turn_delete: usize,
    pub max_per_turn_mark_read: usize,
}

struct Scan {
    ids: VecDeque<String>,
    scanned: u64,
    capped: bool,
}

async fn scan_all(mail: &dyn MailService, query: &str, page_size: u32, max_scan: usize) -> ServiceResult<Scan> {
    let mut ids = VecDeque::new();
    let mut token: Option<String> = None;
    let mut capped = false;
    loop {
        let page = mail.list_message_ids_page(query, page_size, token.as_deref()).await?;
        ids.extend(page.message_ids);
        if ids.len() >= max_scan {
            capped = true;
            break;
        }
        match page.next_page_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }
    let scanned = ids.len() as u64;
    Ok(Scan { ids, scanned, capped })
}

async fn build_samples(mail: &dyn MailService, ids: &VecDeque<String>) -> Vec<String> {
    let mut lines = Vec::new();
    for id in ids.iter().take(SAMPLE_COUNT) {
        let line = match mail.get_message_headers(id).await {
            Ok(headers) => {
                let subject =
                    headers.get("Subject").or_else(|| headers.get("subject")).cloned().unwrap_or_else(|| "(no subject)".to_string());
                match headers.get("From").or_else(|| headers.get("from")) {
                    Some(from) => format!("- {subject} (from {from})"),
                    None => format!("- {subject}"),
                }
            }
            // Falls back to a bare id line rather than dropping the sample
            // entirely, so a capped total is never shown with fewer than
            // min(5, total) sample lines.
            Err(_) => format!("- {id}"),
        };
        lines.push(line);
    }
    lines
}

#[derive(Debug)]
pub enum ScanStart {
    Empty,
    Started(MailScanRecord),
}

/// DRY_RUN: scans up to `limits.max_scan` ids, fetches up to 5 sample
/// headers, and returns the record EXECUTE will drain. No items are
/// modified here.
pub async fn start_scan(
    mail: &dyn MailService,
    limits: MailLimits,
    query: String,
    descriptor: String,
    action: MailScanAction,
) -> ServiceResult<ScanStart> {
    let scan = scan_all(mail, &query, limits.list_page_size, limits.max_scan).await?;
    if scan.scanned == 0 {
        return Ok(ScanStart::Empty);
    }
    let samples = build_samples(mail, &scan.ids).await;
    Ok(ScanStart::Started(MailScanRecord {
        query,
        descriptor,
        action,
        buffer: scan.ids,
        scanned: scan.scanned,
        capped: scan.capped,
        processed: 0,
        samples,
    }))
}

#[derive(Debug)]
pub enum ScanContinue {
    Progressed(MailScanRecord),
    Completed { processed: u64, action: MailScanAction },
    PhaseError { processed: u64, details: String, auth: bool },
}

/// EXECUTE: drains up to `max_per_turn` buffered ids in `batch_chunk`-sized
/// batch-modify/batch-delete calls. A batch failure aborts the rest of the
/// turn; whatever succeeded before it stays counted in `processed`.
pub async fn continue_scan(
    mail: &dyn MailService,
    mut record: MailScanRecord,
    max_per_turn: usize,
    batch_chunk: usize,
) -> ScanContinue {
    let mut processed_this_turn = 0usize;
    while processed_this_turn < max_per_turn && !record.buffer.is_empty() {
        let take = batch_chunk.min(record.buffer.len()).min(max_per_turn - processed_this_turn);
        let batch: Vec<String> = (0..take).filter_map(|_| record.buffer.pop_front()).collect();
        let result = match &record.action {
            MailScanAction::DeleteTrash => mail.batch_modify_labels(&batch, &["TRASH".to_string()], &["INBOX".to_string()]).await,
            MailScanAction::DeletePermanent => mail.batch_delete_messages(&batch).await,
            MailScanAction::MarkRead { .. } => mail.batch_modify_labels(&batch, &[], &["UNREAD".to_string()]).await,
        };
        match result {
            Ok(()) => {
                record.processed += take as u64;
                processed_this_turn += take;
            }
            Err(err) => {
                let auth = err.kind() == ErrorKind::Auth;
                return ScanContinue::PhaseError { processed: record.processed, details: err.to_string(), auth };
            }
        }
    }
    if record.buffer.is_empty() {
        ScanContinue::Completed { processed: record.processed, action: record.action }
    } else {
        ScanContinue::Progressed(record)
    }
}

pub fn render_scan_confirm(record: &MailScanRecord) -> String {
    let count_text = if record.capped { format!("at-least {}", record.scanned) } else { record.scanned.to_string() };
    let (noun, ask) = match &record.action {
        MailScanAction::DeleteTrash => ("emails", "Say YES to move them to Trash, or CANCEL."),
        MailScanAction::DeletePermanent => ("emails", "Say YES to permanently delete them, or CANCEL."),
        MailScanAction::MarkRead { .. } => ("unread messages", "Say YES to mark them as read, or CANCEL."),
    };
    let mut message = format!("I found {count_text} {noun} {} (query: {}). {ask}", record.descriptor, record.query);
    for line in &record.samples {
        message.push('\n');
        message.push_str(line);
    }
    message
}

pub fn render_scan_empty(action: &MailScanAction) -> String {
    match action {
        MailScanAction::MarkRead { sender } => format!("I found 0 unread messages from {sender}."),
        MailScanAction::DeleteTrash | MailScanAction::DeletePermanent => "I found no emails matching that request.".to_string(),
    }
}

pub fn render_scan_progress(record: &MailScanRecord) -> String {
    format!(
        "Processed {} of about {} emails, {} remaining. Reply CONTINUE to process more, or CANCEL to stop.",
        record.processed,
        record.scanned,
        record.buffer.len()
    )
}

pub fn render_scan_completion(action: &MailScanAction, processed: u64) -> String {
    match action {
        MailScanAction::DeleteTrash => format!("Done. Moved {processed} emails to Trash."),
        MailScanAction::DeletePermanent => format!("Done. Permanently deleted {processed} emails."),
        MailScanAction::MarkRead { sender } => format!("Done. Marked all unread messages from {sender} as read."),
    }
}

pub fn render_phase_error(processed: u64, details: &str, auth: bool) -> String {
    if auth {
        "I lost permission to do this partway through. Please reauthorize.".to_string()
    } else {
        format!("Error during EXECUTE\nProcessed: {processed}\nDetails: {details}\nNothing else was changed.")
    }
}

pub fn render_scan_cancelled(record: &MailScanRecord) -> String {
    format!(
        "Cancelled. Processed {} of about {} before stopping; {} left untouched.",
        record.processed,
        record.scanned,
        record.buffer.len()
    )
}
