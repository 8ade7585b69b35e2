//! The flow handlers themselves (§4.5): one async method per pending-flow
//! kind, each taking the raw next-turn text and returning `Some(reply)` if
//! the flow was active and consumed the turn, `None` if it wasn't and the
//! message should fall through (eventually to the LLM tool loop).

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::Utc;
use serde_json::Value;

use orchestrator_confidence::decision::{rank_candidates, CandidateEvent, RankResult};
use orchestrator_services::calendar::CalendarService;
use orchestrator_services::mail::MailService;
use orchestrator_services::task_board::TaskBoardService;
use orchestrator_store::PendingStore;
use orchestrator_tools::{Tool, ToolEnvelope, ToolRegistry};

use crate::intent::{self, Intent};
use crate::mail_scan::{self, MailLimits};
use crate::mail_spam::{self, SpamExecOutcome, SpamStart};
use crate::records::{
    CalendarCancelRecord, CalendarNoteRecord, CandidateSummary, ConfidenceClarifyRecord,
    GenericToolConfirmRecord, MailScanAction, MailScanRecord, MailSendConfirmRecord,
    MailSpamRecord, SpamAction, TaskBoardDispatchRecord,
};

/// Batch-chunk size for both DRY_RUN list pages and EXECUTE
/// batch-modify/batch-delete calls across every mail flow (§4.5.1-3).
const MAIL_BATCH_CHUNK: usize = 500;
const CANDIDATE_WINDOW_DAYS: i64 = 30;

/// Bundles every pending-flow store alongside the services and tool
/// registry the handlers need to act. One instance per running process,
/// keyed internally by `data_dir`-scoped `PendingStore` file paths.
pub struct Flows {
    pub tool_confirm: PendingStore<GenericToolConfirmRecord>,
    pub confidence_clarify: PendingStore<ConfidenceClarifyRecord>,
    pub task_board_dispatch: PendingStore<TaskBoardDispatchRecord>,
    pub mail_delete: PendingStore<MailScanRecord>,
    pub mail_mark_read: PendingStore<MailScanRecord>,
    pub mail_spam_clean: PendingStore<MailSpamRecord>,
    pub mail_send: PendingStore<MailSendConfirmRecord>,
    pub calendar_note: PendingStore<CalendarNoteRecord>,
    pub calendar_cancel: PendingStore<CalendarCancelRecord>,

    mail: Arc<dyn MailService>,
    mail_limits: MailLimits,
    calendar: Arc<dyn CalendarService>,
    task_board: Arc<dyn TaskBoardService>,
    tools: Arc<ToolRegistry>,
}

impl Flows {
    pub fn new(
        data_dir: impl AsRef<std::path::Path>,
        mail: Arc<dyn MailService>,
        mail_limits: MailLimits,
        calendar: Arc<dyn CalendarService>,
        task_board: Arc<dyn TaskBoardService>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        let dir = data_dir.as_ref();
        Self {
            tool_confirm: PendingStore::new(dir.join("pending_tool_confirm.json")),
            confidence_clarify: PendingStore::new(dir.join("pending_confidence_clarify.json")),
            task_board_dispatch: PendingStore::new(dir.join("pending_trello_dispatch.json")),
            mail_delete: PendingStore::new(dir.join("pending_gmail_delete.json")),
            mail_mark_read: PendingStore::new(dir.join("pending_gmail_mark_read.json")),
            mail_spam_clean: PendingStore::new(dir.join("pending_gmail_spam_clean.json")),
            mail_send: PendingStore::new(dir.join("pending_gmail_send.json")),
            calendar_note: PendingStore::new(dir.join("pending_calendar_note.json")),
            calendar_cancel: PendingStore::new(dir.join("pending_calendar_cancel.json")),
            mail,
            mail_limits,
            calendar,
            task_board,
            tools,
        }
    }

    /// Runs every pending-flow gate in precedence order (§4.5). The first
    /// flow that is active for this user consumes the turn; if none are,
    /// returns `None` so the caller proceeds to the LLM tool loop.
    pub async fn handle_pending(&self, user_id: i64, message: &str) -> Result<Option<String>> {
        if let Some(reply) = self.handle_tool_confirm(user_id, message).await? {
            return Ok(Some(reply));
        }
        if let Some(reply) = self.handle_confidence_clarify(user_id, message).await? {
            return Ok(Some(reply));
        }
        if let Some(reply) = self.handle_task_board_dispatch(user_id, message).await? {
            return Ok(Some(reply));
        }
        if let Some(reply) = self.handle_mail_delete(user_id, message).await? {
            return Ok(Some(reply));
        }
        if let Some(reply) = self.handle_mail_mark_read(user_id, message).await? {
            return Ok(Some(reply));
        }
        if let Some(reply) = self.handle_mail_spam_clean(user_id, message).await? {
            return Ok(Some(reply));
        }
        if let Some(reply) = self.handle_mail_send(user_id, message).await? {
            return Ok(Some(reply));
        }
        if let Some(reply) = self.handle_calendar_note(user_id, message).await? {
            return Ok(Some(reply));
        }
        if let Some(reply) = self.handle_calendar_cancel(user_id, message).await? {
            return Ok(Some(reply));
        }
        Ok(None)
    }

    // ---- generic tool confirmation (any risky tool call awaiting a yes/no) ----

    async fn handle_tool_confirm(&self, user_id: i64, message: &str) -> Result<Option<String>> {
        let Some(record) = self.tool_confirm.get(user_id).await else {
            return Ok(None);
        };
        match intent::classify(message) {
            Intent::Cancel => {
                self.tool_confirm.clear(user_id).await?;
                Ok(Some("Cancelled.".to_string()))
            }
            Intent::Continue => {
                self.tool_confirm.clear(user_id).await?;
                let mut args = record.args;
                set_bool_field(&mut args, "confirm", true);
                Ok(Some(self.run_and_render(&record.tool_name, args).await?))
            }
            Intent::Unknown => Ok(Some("Reply YES to proceed, or CANCEL to stop.".to_string())),
        }
    }

    // ---- confidence-gated clarification (a single follow-up question) ----

    async fn handle_confidence_clarify(&self, user_id: i64, message: &str) -> Result<Option<String>> {
        let Some(record) = self.confidence_clarify.get(user_id).await else {
            return Ok(None);
        };
        self.confidence_clarify.clear(user_id).await?;
        let mut args = record.args;
        splice_field(&mut args, &record.awaiting, message);
        Ok(Some(self.run_and_render(&record.tool_name, args).await?))
    }

    // ---- task board dispatch continuation (one missing field at a time) ----

    async fn handle_task_board_dispatch(&self, user_id: i64, message: &str) -> Result<Option<String>> {
        let Some(record) = self.task_board_dispatch.get(user_id).await else {
            return Ok(None);
        };
        if intent::classify(message) == Intent::Cancel {
            self.task_board_dispatch.clear(user_id).await?;
            return Ok(Some("Cancelled.".to_string()));
        }
        self.task_board_dispatch.clear(user_id).await?;
        let mut args = record.args;
        splice_field(&mut args, &record.awaiting, message);

        let tool = self
            .tools
            .get("task_board_dispatch")
            .ok_or_else(|| anyhow!("task_board_dispatch tool not registered"))?;
        let envelope = tool.run(args).await?;
        match envelope {
            ToolEnvelope::DispatchRequired { awaiting, data } => {
                self.task_board_dispatch
                    .set(user_id, TaskBoardDispatchRecord { awaiting: awaiting.clone(), args: data })
                    .await?;
                Ok(Some(question_for_dispatch_field(&awaiting)))
            }
            ToolEnvelope::CommentRequired { data } => {
                self.task_board_dispatch
                    .set(user_id, TaskBoardDispatchRecord { awaiting: "comment".to_string(), args: data })
                    .await?;
                Ok(Some("What would you like the comment to say?".to_string()))
            }
            other => Ok(Some(render_envelope(&other))),
        }
    }

    // ---- mail bulk flows: delete, mark-read, spam-clean (§4.5.1-3) ----

    async fn handle_mail_delete(&self, user_id: i64, message: &str) -> Result<Option<String>> {
        if let Some(record) = self.mail_delete.get(user_id).await {
            return self
                .continue_mail_scan(user_id, &self.mail_delete, record, message, self.mail_limits.max_per_turn_delete)
                .await
                .map(Some);
        }
        let Some(request) = parse_delete_request(message) else {
            return Ok(None);
        };
        let query = build_delete_query(&request);
        let descriptor = delete_descriptor(&request);
        let action = if request.permanent { MailScanAction::DeletePermanent } else { MailScanAction::DeleteTrash };
        self.start_mail_scan(user_id, &self.mail_delete, query, descriptor, action).await.map(Some)
    }

    async fn handle_mail_mark_read(&self, user_id: i64, message: &str) -> Result<Option<String>> {
        if let Some(record) = self.mail_mark_read.get(user_id).await {
            return self
                .continue_mail_scan(user_id, &self.mail_mark_read, record, message, self.mail_limits.max_per_turn_mark_read)
                .await
                .map(Some);
        }
        let Some(sender) = parse_mark_read_request(message) else {
            return Ok(None);
        };
        let query = format!("from:{sender} is:unread");
        let descriptor = format!("from {sender}");
        self.start_mail_scan(user_id, &self.mail_mark_read, query, descriptor, MailScanAction::MarkRead { sender }).await.map(Some)
    }

    async fn handle_mail_spam_clean(&self, user_id: i64, message: &str) -> Result<Option<String>> {
        if let Some(record) = self.mail_spam_clean.get(user_id).await {
            return self.continue_mail_spam(user_id, record, message).await.map(Some);
        }
        let lowered = message.to_lowercase();
        let wants_trash_empty =
            lowered.contains("trash") && (lowered.contains("empty") || lowered.contains("permanent") || lowered.contains("delete"));
        let wants_spam_clean = !wants_trash_empty
            && lowered.contains("spam")
            && (lowered.contains("clean") || lowered.contains("empty") || lowered.contains("clear"));
        if !wants_trash_empty && !wants_spam_clean {
            return Ok(None);
        }

        let (query, action) =
            if wants_trash_empty { ("in:trash".to_string(), SpamAction::PermanentDelete) } else { ("in:spam".to_string(), SpamAction::MoveToTrash) };
        match mail_spam::start_spam(self.mail.as_ref(), self.mail_limits, query, action).await? {
            SpamStart::Empty => Ok(Some(mail_spam::render_spam_empty(action))),
            SpamStart::Started { record, estimate } => {
                let reply = mail_spam::render_spam_confirm(action, estimate);
                self.mail_spam_clean.set(user_id, record).await?;
                Ok(Some(reply))
            }
        }
    }

    async fn start_mail_scan(
        &self,
        user_id: i64,
        store: &PendingStore<MailScanRecord>,
        query: String,
        descriptor: String,
        action: MailScanAction,
    ) -> Result<String> {
        let action_for_empty = action.clone();
        match mail_scan::start_scan(self.mail.as_ref(), self.mail_limits, query, descriptor, action).await? {
            mail_scan::ScanStart::Empty => Ok(mail_scan::render_scan_empty(&action_for_empty)),
            mail_scan::ScanStart::Started(record) => {
                let reply = mail_scan::render_scan_confirm(&record);
                store.set(user_id, record).await?;
                Ok(reply)
            }
        }
    }

    async fn continue_mail_scan(
        &self,
        user_id: i64,
        store: &PendingStore<MailScanRecord>,
        record: MailScanRecord,
        message: &str,
        max_per_turn: usize,
    ) -> Result<String> {
        match intent::classify(message) {
            Intent::Cancel => {
                let reply = mail_scan::render_scan_cancelled(&record);
                store.clear(user_id).await?;
                Ok(reply)
            }
            Intent::Continue => match mail_scan::continue_scan(self.mail.as_ref(), record, max_per_turn, MAIL_BATCH_CHUNK).await {
                mail_scan::ScanContinue::Progressed(r) => {
                    let reply = mail_scan::render_scan_progress(&r);
                    store.set(user_id, r).await?;
                    Ok(reply)
                }
                mail_scan::ScanContinue::Completed { processed, action } => {
                    store.clear(user_id).await?;
                    Ok(mail_scan::render_scan_completion(&action, processed))
                }
                mail_scan::ScanContinue::PhaseError { processed, details, auth } => {
                    store.clear(user_id).await?;
                    Ok(mail_scan::render_phase_error(processed, &details, auth))
                }
            },
            Intent::Unknown => Ok("Reply CONTINUE to process more, or CANCEL to stop.".to_string()),
        }
    }

    async fn continue_mail_spam(&self, user_id: i64, record: MailSpamRecord, message: &str) -> Result<String> {
        match intent::classify(message) {
            Intent::Cancel => {
                self.mail_spam_clean.clear(user_id).await?;
                Ok("Cancelled.".to_string())
            }
            Intent::Continue => {
                self.mail_spam_clean.clear(user_id).await?;
                match mail_spam::execute_spam(self.mail.as_ref(), record, self.mail_limits).await {
                    SpamExecOutcome::Completed { count, action } => Ok(mail_spam::render_spam_completion(action, count)),
                    SpamExecOutcome::Error { count: _, details, auth } => Ok(mail_spam::render_spam_error(&details, auth)),
                }
            }
            Intent::Unknown => Ok("Reply YES to proceed, or CANCEL to stop.".to_string()),
        }
    }

    // ---- mail send confirmation ----

    async fn handle_mail_send(&self, user_id: i64, message: &str) -> Result<Option<String>> {
        let Some(record) = self.mail_send.get(user_id).await else {
            return Ok(None);
        };
        match intent::classify(message) {
            Intent::Cancel => {
                self.mail_send.clear(user_id).await?;
                Ok(Some("Cancelled, I won't send that.".to_string()))
            }
            Intent::Continue => {
                self.mail_send.clear(user_id).await?;
                let mut args = record.args;
                set_bool_field(&mut args, "confirm", true);
                Ok(Some(self.run_and_render(&record.tool_name, args).await?))
            }
            Intent::Unknown => Ok(Some("Reply YES to send, or CANCEL to stop.".to_string())),
        }
    }

    // ---- calendar cancel ----

    async fn handle_calendar_cancel(&self, user_id: i64, message: &str) -> Result<Option<String>> {
        if let Some(record) = self.calendar_cancel.get(user_id).await {
            return self.continue_calendar_cancel(user_id, record, message).await.map(Some);
        }
        let Some(title) = parse_cancel_request(message) else {
            return Ok(None);
        };
        let now = Utc::now();
        let window_end = now + chrono::Duration::days(CANDIDATE_WINDOW_DAYS);
        let candidates = self.calendar.list_events(now, window_end, Some(&title)).await?;
        if candidates.is_empty() {
            return Ok(Some(format!("I couldn't find any event called \"{title}\".")));
        }
        let ranked = rank_candidates(
            &title,
            None,
            None,
            &candidates
                .iter()
                .map(|e| CandidateEvent { id: e.id.clone(), title: e.title.clone(), start: e.start, end: e.end })
                .collect::<Vec<_>>(),
        );
        match ranked {
            RankResult::Top(event_id) => self.proceed_calendar_cancel(user_id, &event_id).await.map(Some),
            RankResult::Ambiguous => {
                let summaries: Vec<CandidateSummary> = candidates
                    .iter()
                    .map(|e| CandidateSummary { event_id: e.id.clone(), title: e.title.clone(), start: e.start })
                    .collect();
                self.calendar_cancel
                    .set(user_id, CalendarCancelRecord::AwaitingSelection { candidates: summaries.clone(), query_title: title })
                    .await?;
                Ok(Some(render_candidate_list(&summaries)))
            }
        }
    }

    async fn proceed_calendar_cancel(&self, user_id: i64, event_id: &str) -> Result<String> {
        let event = self.calendar.get_event(event_id).await?;
        if event.recurring_event_id.is_some() {
            self.calendar_cancel
                .set(user_id, CalendarCancelRecord::AwaitingScope { event_id: event_id.to_string() })
                .await?;
            return Ok("This is part of a recurring series. Cancel just this occurrence, or the whole series?".to_string());
        }
        self.calendar.delete_event(event_id, true).await?;
        self.calendar_cancel.clear(user_id).await?;
        Ok(format!("Cancelled \"{}\".", event.title))
    }

    async fn continue_calendar_cancel(&self, user_id: i64, record: CalendarCancelRecord, message: &str) -> Result<String> {
        if intent::classify(message) == Intent::Cancel {
            self.calendar_cancel.clear(user_id).await?;
            return Ok("Okay, leaving it as-is.".to_string());
        }
        match record {
            CalendarCancelRecord::AwaitingSelection { candidates, .. } => match parse_selection(message, candidates.len()) {
                Some(indices) if indices.len() == 1 => {
                    let event_id = candidates[indices[0]].event_id.clone();
                    self.proceed_calendar_cancel(user_id, &event_id).await
                }
                Some(indices) => {
                    let mut cancelled = 0;
                    for idx in indices {
                        if let Some(c) = candidates.get(idx) {
                            self.calendar.delete_event(&c.event_id, true).await?;
                            cancelled += 1;
                        }
                    }
                    self.calendar_cancel.clear(user_id).await?;
                    Ok(format!("Cancelled {cancelled} events."))
                }
                None => Ok(render_candidate_list(&candidates)),
            },
            CalendarCancelRecord::AwaitingScope { event_id } => {
                let series = message.to_lowercase().contains("series") || message.to_lowercase().contains("all");
                self.calendar_cancel
                    .set(user_id, CalendarCancelRecord::AwaitingConfirmation { event_id, series })
                    .await?;
                Ok(format!("Cancel {}? Reply YES to confirm.", if series { "the whole series" } else { "just this occurrence" }))
            }
            CalendarCancelRecord::AwaitingConfirmation { event_id, series } => {
                if intent::classify(message) == Intent::Continue {
                    self.calendar.delete_event(&event_id, true).await?;
                    self.calendar_cancel.clear(user_id).await?;
                    Ok(if series { "Cancelled the whole series.".to_string() } else { "Cancelled this occurrence.".to_string() })
                } else {
                    Ok("Reply YES to confirm, or CANCEL to stop.".to_string())
                }
            }
            CalendarCancelRecord::Confirmed { event_id, series } => {
                self.calendar.delete_event(&event_id, true).await?;
                self.calendar_cancel.clear(user_id).await?;
                Ok(if series { "Cancelled the whole series.".to_string() } else { "Cancelled.".to_string() })
            }
        }
    }

    // ---- calendar note ----

    async fn handle_calendar_note(&self, user_id: i64, message: &str) -> Result<Option<String>> {
        if let Some(record) = self.calendar_note.get(user_id).await {
            return self.continue_calendar_note(user_id, record, message).await.map(Some);
        }
        let Some((title, note)) = parse_note_request(message) else {
            return Ok(None);
        };
        let now = Utc::now();
        let window_end = now + chrono::Duration::days(CANDIDATE_WINDOW_DAYS);
        let candidates = self.calendar.list_events(now, window_end, Some(&title)).await?;
        if candidates.is_empty() {
            return Ok(Some(format!("I couldn't find any event called \"{title}\".")));
        }
        let ranked = rank_candidates(
            &title,
            None,
            None,
            &candidates
                .iter()
                .map(|e| CandidateEvent { id: e.id.clone(), title: e.title.clone(), start: e.start, end: e.end })
                .collect::<Vec<_>>(),
        );
        match ranked {
            RankResult::Top(event_id) => match note {
                Some(note) => self.apply_calendar_note(user_id, &event_id, &note).await.map(Some),
                None => {
                    self.calendar_note.set(user_id, CalendarNoteRecord::AwaitingNote { event_id }).await?;
                    Ok(Some("What would you like the note to say?".to_string()))
                }
            },
            RankResult::Ambiguous => {
                let summaries: Vec<CandidateSummary> = candidates
                    .iter()
                    .map(|e| CandidateSummary { event_id: e.id.clone(), title: e.title.clone(), start: e.start })
                    .collect();
                self.calendar_note
                    .set(user_id, CalendarNoteRecord::AwaitingSelection { candidates: summaries.clone(), query_title: title })
                    .await?;
                Ok(Some(render_candidate_list(&summaries)))
            }
        }
    }

    async fn apply_calendar_note(&self, user_id: i64, event_id: &str, note: &str) -> Result<String> {
        let event = self.calendar.get_event(event_id).await?;
        let description = match &event.description {
            Some(current) if !current.is_empty() => format!("{current}\n{note}"),
            _ => note.to_string(),
        };
        let patch = orchestrator_services::calendar::EventPatch { description: Some(description), ..Default::default() };
        self.calendar.patch_event(event_id, &patch, false).await?;
        self.calendar_note.clear(user_id).await?;
        Ok(format!("Added your note to \"{}\".", event.title))
    }

    async fn continue_calendar_note(&self, user_id: i64, record: CalendarNoteRecord, message: &str) -> Result<String> {
        if intent::classify(message) == Intent::Cancel {
            self.calendar_note.clear(user_id).await?;
            return Ok("Okay, I won't add that note.".to_string());
        }
        match record {
            CalendarNoteRecord::AwaitingSelection { candidates, .. } => match parse_selection(message, candidates.len()) {
                Some(indices) if indices.len() == 1 => {
                    let event_id = candidates[indices[0]].event_id.clone();
                    self.calendar_note.set(user_id, CalendarNoteRecord::AwaitingNote { event_id }).await?;
                    Ok("What would you like the note to say?".to_string())
                }
                _ => Ok(render_candidate_list(&candidates)),
            },
            CalendarNoteRecord::AwaitingNote { event_id } => self.apply_calendar_note(user_id, &event_id, message).await,
        }
    }

    // ---- shared tool-execution plumbing ----

    async fn run_and_render(&self, tool_name: &str, args: Value) -> Result<String> {
        let tool = self.tools.get(tool_name).ok_or_else(|| anyhow!("unknown tool {tool_name}"))?;
        let envelope = tool.run(args).await?;
        Ok(render_envelope(&envelope))
    }
}

fn render_envelope(envelope: &ToolEnvelope) -> String {
    match envelope {
        ToolEnvelope::Ok { data } => format!("Done. {data}"),
        ToolEnvelope::ConfirmationRequired { .. } => "This still needs confirmation.".to_string(),
        ToolEnvelope::DispatchRequired { awaiting, .. } => format!("I still need {awaiting}."),
        ToolEnvelope::CommentRequired { .. } => "What should the comment say?".to_string(),
    }
}

fn set_bool_field(args: &mut Value, field: &str, value: bool) {
    if let Value::Object(map) = args {
        map.insert(field.to_string(), Value::Bool(value));
    }
}

fn splice_field(args: &mut Value, field: &str, text: &str) {
    if let Value::Object(map) = args {
        map.insert(field.to_string(), Value::String(text.trim().to_string()));
    }
}

fn question_for_dispatch_field(field: &str) -> String {
    match field {
        "card_name" => "Which card do you mean?".to_string(),
        "board_name" => "Which board is that card on?".to_string(),
        "to_list_name" => "Which list should it move to?".to_string(),
        "title" => "What should the card be called?".to_string(),
        "comment" => "What would you like the comment to say?".to_string(),
        other => format!("I still need {other}."),
    }
}

fn render_candidate_list(candidates: &[CandidateSummary]) -> String {
    let mut out = "Which one did you mean?\n".to_string();
    for (i, c) in candidates.iter().enumerate() {
        out.push_str(&format!("{}. {} ({})\n", i + 1, c.title, c.start.format("%Y-%m-%d %H:%M")));
    }
    out
}

fn parse_selection(message: &str, count: usize) -> Option<Vec<usize>> {
    let lowered = message.to_lowercase();
    if ["cancel all", "all events", "all of them", "cancel them all"].iter().any(|p| lowered.contains(p)) {
        return Some((0..count).collect());
    }
    let mut indices = Vec::new();
    for token in lowered.split(|c: char| c == ',' || c.is_whitespace()) {
        if let Ok(n) = token.parse::<usize>() {
            if n >= 1 && n <= count {
                indices.push(n - 1);
            }
        }
    }
    if indices.is_empty() {
        None
    } else {
        Some(indices)
    }
}

struct DeleteRequest {
    days: u32,
    sender: Option<String>,
    subject: Option<String>,
    label: Option<String>,
    permanent: bool,
}

fn parse_delete_request(message: &str) -> Option<DeleteRequest> {
    let lowered = message.to_lowercase();
    let has_verb = ["delete", "remove", "purge", "trash"].iter().any(|v| lowered.contains(v));
    if !has_verb {
        return None;
    }
    let days = extract_days(&lowered)?;
    if days == 0 {
        return None;
    }
    let sender = extract_email_after(&lowered, "from:").or_else(|| extract_email_after(&lowered, "from "));
    let subject = extract_quoted(message, "subject");
    let label = extract_quoted(message, "label");
    let permanent = lowered.contains("permanent") || lowered.contains("forever");
    Some(DeleteRequest { days, sender, subject, label, permanent })
}

fn build_delete_query(req: &DeleteRequest) -> String {
    let mut q = format!("older_than:{}d", req.days);
    if let Some(sender) = &req.sender {
        q.push_str(&format!(" from:{sender}"));
    }
    if let Some(subject) = &req.subject {
        q.push_str(&format!(" subject:{}", quote_if_needed(subject)));
    }
    if let Some(label) = &req.label {
        q.push_str(&format!(" label:{}", quote_if_needed(label)));
    }
    q
}

/// The human-readable clause DRY_RUN quotes back ("older than 30 days,
/// from x@y.com"), built from the same filters that went into the query.
fn delete_descriptor(req: &DeleteRequest) -> String {
    let mut parts = vec![format!("older than {} days", req.days)];
    if let Some(sender) = &req.sender {
        parts.push(format!("from {sender}"));
    }
    if let Some(subject) = &req.subject {
        parts.push(format!("with subject \"{subject}\""));
    }
    if let Some(label) = &req.label {
        parts.push(format!("labeled \"{label}\""));
    }
    parts.join(", ")
}

fn quote_if_needed(value: &str) -> String {
    if value.contains(' ') {
        format!("\"{value}\"")
    } else {
        value.to_string()
    }
}

fn extract_days(lowered: &str) -> Option<u32> {
    let marker = "older than";
    let idx = lowered.find(marker)?;
    let rest = lowered[idx + marker.len()..].trim_start();
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

fn extract_email_after(lowered: &str, marker: &str) -> Option<String> {
    let idx = lowered.find(marker)?;
    let rest = lowered[idx + marker.len()..].trim_start();
    let token: String = rest.chars().take_while(|c| !c.is_whitespace()).collect();
    let token = token.trim_matches(|c: char| !c.is_alphanumeric() && c != '@' && c != '.').to_string();
    if token.contains('@') {
        Some(token)
    } else {
        None
    }
}

fn extract_quoted(message: &str, keyword: &str) -> Option<String> {
    let lowered = message.to_lowercase();
    let idx = lowered.find(keyword)?;
    let rest = &message[idx + keyword.len()..];
    let start = rest.find('"')?;
    let after = &rest[start + 1..];
    let end = after.find('"')?;
    Some(after[..end].to_string())
}

fn parse_mark_read_request(message: &str) -> Option<String> {
    let lowered = message.to_lowercase();
    for tok in ["mark", "read", "all", "from"] {
        if !lowered.contains(tok) {
            return None;
        }
    }
    lowered
        .split_whitespace()
        .find(|t| t.contains('@'))
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric() && c != '@' && c != '.').to_string())
}

fn parse_cancel_request(message: &str) -> Option<String> {
    let lowered = message.to_lowercase();
    if !lowered.contains("cancel") {
        return None;
    }
    if !(lowered.contains("meeting") || lowered.contains("event") || lowered.contains("calendar")) {
        return None;
    }
    extract_title(message)
}

fn parse_note_request(message: &str) -> Option<(String, Option<String>)> {
    let lowered = message.to_lowercase();
    if !lowered.contains("note") {
        return None;
    }
    if !(lowered.contains("meeting") || lowered.contains("event") || lowered.contains("calendar")) {
        return None;
    }
    let title = extract_title(message)?;
    let note = ["note:", "saying", "that says"].iter().find_map(|marker| {
        let idx = lowered.find(marker)?;
        Some(message[idx + marker.len()..].trim().trim_matches('"').to_string())
    });
    Some((title, note.filter(|n| !n.is_empty())))
}

fn extract_title(message: &str) -> Option<String> {
    if let Some(start) = message.find('"') {
        let rest = &message[start + 1..];
        if let Some(end) = rest.find('"') {
            return Some(rest[..end].to_string());
        }
    }
    let lowered = message.to_lowercase();
    if let Some(idx) = lowered.find("called ") {
        return Some(message[idx + "called ".len()..].trim().to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_delete_request_with_sender_and_permanence() {
        let req = parse_delete_request("delete emails older than 30 days from: newsletter@example.com permanently").unwrap();
        assert_eq!(req.days, 30);
        assert_eq!(req.sender.as_deref(), Some("newsletter@example.com"));
        assert!(req.permanent);
    }

    #[test]
    fn rejects_delete_request_without_a_day_window() {
        assert!(parse_delete_request("delete my drafts").is_none());
    }

    #[test]
    fn builds_query_with_all_filters() {
        let req = DeleteRequest {
            days: 14,
            sender: Some("a@b.com".to_string()),
            subject: Some("weekly digest".to_string()),
            label: None,
            permanent: false,
        };
        assert_eq!(build_delete_query(&req), "older_than:14d from:a@b.com subject:\"weekly digest\"");
    }

    #[test]
    fn descriptor_lists_every_active_filter() {
        let req = DeleteRequest { days: 30, sender: None, subject: None, label: None, permanent: false };
        assert_eq!(delete_descriptor(&req), "older than 30 days");

        let req = DeleteRequest { days: 14, sender: Some("a@b.com".to_string()), subject: None, label: None, permanent: true };
        assert_eq!(delete_descriptor(&req), "older than 14 days, from a@b.com");
    }

    #[test]
    fn parses_mark_read_sender() {
        assert_eq!(
            parse_mark_read_request("mark all messages from bob@example.com as read"),
            Some("bob@example.com".to_string())
        );
        assert_eq!(parse_mark_read_request("read the news"), None);
        assert_eq!(parse_mark_read_request("mark that one from bob@example.com as read"), None);
    }

    #[test]
    fn parses_cancel_request_title_from_quotes() {
        assert_eq!(parse_cancel_request(r#"cancel my meeting called "Weekly Sync""#), Some("Weekly Sync".to_string()));
        assert_eq!(parse_cancel_request("cancel the event \"1:1\""), Some("1:1".to_string()));
        assert_eq!(parse_cancel_request("hello there"), None);
    }

    #[test]
    fn parses_note_request_with_inline_text() {
        let (title, note) = parse_note_request(r#"add a note to the "Weekly Sync" meeting saying running 10 min late"#).unwrap();
        assert_eq!(title, "Weekly Sync");
        assert_eq!(note.as_deref(), Some("running 10 min late"));
    }

    #[test]
    fn parse_selection_recognizes_ordinal_and_all() {
        assert_eq!(parse_selection("the second one", 3), None);
        assert_eq!(parse_selection("2", 3), Some(vec![1]));
        assert_eq!(parse_selection("cancel all of them", 3), Some(vec![0, 1, 2]));
    }
}
