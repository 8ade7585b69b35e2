//! The DRY_RUN-one-page / EXECUTE-drain-everything engine behind
//! spam-clean (§4.5.3). Unlike mail-delete/mail-mark-read, this flow has no
//! `MAX_SCAN`/`MAX_PER_TURN` ceiling at all: DRY_RUN estimates the size
//! from a single list page, and EXECUTE empties the query entirely within
//! one turn, paging through the upstream list as it goes.

use orchestrator_services::error::ErrorKind;
use orchestrator_services::mail::MailService;
use orchestrator_services::ServiceResult;

use crate::mail_scan::MailLimits;
use crate::records::{MailSpamRecord, SpamAction};

pub enum SpamStart {
    Empty,
    Started { record: MailSpamRecord, estimate: u64 },
}

/// DRY_RUN: exactly one list-page call. If it comes back empty the action
/// is reported "already empty" and nothing is persisted.
pub async fn start_spam(mail: &dyn MailService, limits: MailLimits, query: String, action: SpamAction) -> ServiceResult<SpamStart> {
    let page = mail.list_message_ids_page(&query, limits.list_page_size, None).await?;
    if page.message_ids.is_empty() {
        return Ok(SpamStart::Empty);
    }
    let estimate = page.result_size_estimate.unwrap_or(page.message_ids.len() as u64);
    let exhausted = page.next_page_token.is_none();
    let record = MailSpamRecord { query, action, buffer: page.message_ids.into(), page_token: page.next_page_token, exhausted };
    Ok(SpamStart::Started { record, estimate })
}

pub fn render_spam_confirm(action: SpamAction, estimate: u64) -> String {
    match action {
        SpamAction::MoveToTrash => format!("I found about {estimate} spam emails. Say YES to move them to Trash, or CANCEL."),
        SpamAction::PermanentDelete => format!("I found about {estimate} emails in Trash. Say YES to permanently delete them, or CANCEL."),
    }
}

pub fn render_spam_empty(action: SpamAction) -> String {
    match action {
        SpamAction::MoveToTrash => "Spam folder is already empty.".to_string(),
        SpamAction::PermanentDelete => "Trash is already empty.".to_string(),
    }
}

/// A single message's label-modify failed even after the whole-batch call
/// did; retried individually up to 3 times, a 403 on retry is treated as
/// locked and skipped rather than aborting the whole drain.
async fn move_to_trash_with_retry(mail: &dyn MailService, ids: &[String]) -> usize {
    match mail.batch_modify_labels(ids, &["TRASH".to_string()], &["SPAM".to_string()]).await {
        Ok(()) => ids.len(),
        Err(_) => {
            let mut moved = 0;
            for id in ids {
                let single = std::slice::from_ref(id);
                let mut attempt = 0;
                loop {
                    attempt += 1;
                    match mail.batch_modify_labels(single, &["TRASH".to_string()], &["SPAM".to_string()]).await {
                        Ok(()) => {
                            moved += 1;
                            break;
                        }
                        Err(err) => {
                            if err.kind() == ErrorKind::Auth || attempt >= 3 {
                                break;
                            }
                        }
                    }
                }
            }
            moved
        }
    }
}

#[derive(Debug)]
pub enum SpamExecOutcome {
    Completed { count: u64, action: SpamAction },
    Error { count: u64, details: String, auth: bool },
}

/// EXECUTE: drains every remaining id in this one turn, fetching
/// subsequent pages as the buffer empties, batching in whatever size the
/// upstream list call handed back.
pub async fn execute_spam(mail: &dyn MailService, mut record: MailSpamRecord, limits: MailLimits) -> SpamExecOutcome {
    let mut count: u64 = 0;
    loop {
        if !record.buffer.is_empty() {
            let batch: Vec<String> = record.buffer.drain(..).collect();
            let moved = match record.action {
                SpamAction::MoveToTrash => Ok(move_to_trash_with_retry(mail, &batch).await as u64),
                SpamAction::PermanentDelete => match mail.batch_delete_messages(&batch).await {
                    Ok(()) => Ok(batch.len() as u64),
                    Err(err) => Err(err),
                },
            };
            match moved {
                Ok(n) => count += n,
                Err(err) => {
                    let auth = err.kind() == ErrorKind::Auth;
                    return SpamExecOutcome::Error { count, details: err.to_string(), auth };
                }
            }
        }
        if record.exhausted {
            break;
        }
        match mail.list_message_ids_page(&record.query, limits.list_page_size, record.page_token.as_deref()).await {
            Ok(page) => {
                record.exhausted = page.next_page_token.is_none();
                record.page_token = page.next_page_token;
                record.buffer.extend(page.message_ids);
            }
            Err(err) => {
                let auth = err.kind() == ErrorKind::Auth;
                return SpamExecOutcome::Error { count, details: err.to_string(), auth };
            }
        }
    }
    SpamExecOutcome::Completed { count, action: record.action }
}

pub fn render_spam_completion(action: SpamAction, count: u64) -> String {
    match action {
        SpamAction::MoveToTrash => format!("Moved {count} spam emails to Trash."),
        SpamAction::PermanentDelete => format!("Permanently deleted {count} emails."),
    }
}

pub fn render_spam_error(details: &str, auth: bool) -> String {
    if auth {
        "I lost permission to do this partway through. Please reauthorize.".to_string()
    } else {
        format!("I ran into a problem cleaning that up: {details}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use orchestrator_services::mail::{LabelId, MessageListPage};
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    struct FakeMail {
        pages: Mutex<VecDeque<MessageListPage>>,
    }

    #[async_trait]
    impl MailService for FakeMail {
        async fn list_message_ids_page(&self, _q: &str, _max: u32, _token: Option<&str>) -> ServiceResult<MessageListPage> {
            Ok(self.pages.lock().unwrap().pop_front().unwrap_or_default())
        }
        async fn batch_modify_labels(&self, _ids: &[String], _add: &[String], _remove: &[String]) -> ServiceResult<()> {
            Ok(())
        }
        async fn batch_delete_messages(&self, _ids: &[String]) -> ServiceResult<()> {
            Ok(())
        }
        async fn get_message_headers(&self, _id: &str) -> ServiceResult<HashMap<String, String>> {
            Ok(HashMap::new())
        }
        async fn resolve_label_id(&self, name: &str) -> ServiceResult<LabelId> {
            Ok(LabelId { id: "l1".into(), name: name.into() })
        }
        async fn send_message(&self, _to: &str, _cc: &[String], _subject: &str, _body: &str) -> ServiceResult<String> {
            Ok("m1".into())
        }
    }

    fn page(ids: &[&str], next: Option<&str>, estimate: Option<u64>) -> MessageListPage {
        MessageListPage {
            message_ids: ids.iter().map(|s| s.to_string()).collect(),
            next_page_token: next.map(str::to_string),
            result_size_estimate: estimate,
        }
    }

    fn limits() -> MailLimits {
        MailLimits { list_page_size: 500, max_scan: 5000, max_per_turn_delete: 1000, max_per_turn_mark_read: 2000 }
    }

    #[tokio::test]
    async fn scenario_drains_two_pages_and_reports_moved_count() {
        let mut pages = VecDeque::new();
        pages.push_back(page(&["a", "b"], Some("t1"), Some(3)));
        pages.push_back(page(&["c"], None, None));
        let mail = FakeMail { pages: Mutex::new(pages) };

        let start = start_spam(&mail, limits(), "in:spam".into(), SpamAction::MoveToTrash).await.unwrap();
        let (record, estimate) = match start {
            SpamStart::Started { record, estimate } => (record, estimate),
            SpamStart::Empty => panic!("expected Started"),
        };
        assert_eq!(estimate, 3);
        assert_eq!(render_spam_confirm(SpamAction::MoveToTrash, estimate), "I found about 3 spam emails. Say YES to move them to Trash, or CANCEL.");

        match execute_spam(&mail, record, limits()).await {
            SpamExecOutcome::Completed { count, action } => {
                assert_eq!(count, 3);
                assert_eq!(render_spam_completion(action, count), "Moved 3 spam emails to Trash.");
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_first_page_reports_already_empty_without_persisting() {
        let mail = FakeMail { pages: Mutex::new(VecDeque::from([page(&[], None, None)])) };
        let outcome = start_spam(&mail, limits(), "in:spam".into(), SpamAction::MoveToTrash).await.unwrap();
        assert!(matches!(outcome, SpamStart::Empty));
        assert_eq!(render_spam_empty(SpamAction::MoveToTrash), "Spam folder is already empty.");
    }
}
