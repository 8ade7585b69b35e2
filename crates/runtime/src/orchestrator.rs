//! The turn orchestrator (§4.7): the top-level per-turn pipeline that
//! either hands a turn to a pending flow, or falls through to the bounded
//! LLM tool loop, then schedules memory writes in the background so the
//! reply is never held up by them.

use std::sync::Arc;

use anyhow::Result;
use tracing::{instrument, warn};

use orchestrator_config::AppConfig;
use orchestrator_flows::Flows;
use orchestrator_llm::{ChatMessage, LlmClient};
use orchestrator_memory::{ConversationTurn, MemoryStore, TurnRole};
use orchestrator_services::turn::TurnInput;
use orchestrator_tools::ToolRegistry;

use crate::prompt::build_system_prompt;
use crate::tool_loop;

/// Bundles everything a running process needs to answer one user turn.
/// One instance lives for the lifetime of the binary; all state it touches
/// (pending-flow stores, the memory log) is behind its own lock so turns
/// for different users run concurrently.
pub struct Orchestrator {
    config: AppConfig,
    flows: Flows,
    llm: Arc<dyn LlmClient>,
    tools: Arc<ToolRegistry>,
    memory: Arc<dyn MemoryStore>,
}

impl Orchestrator {
    pub fn new(
        config: AppConfig,
        flows: Flows,
        llm: Arc<dyn LlmClient>,
        tools: Arc<ToolRegistry>,
        memory: Arc<dyn MemoryStore>,
    ) -> Self {
        Self { config, flows, llm, tools, memory }
    }

    /// Runs the full per-turn pipeline and returns the text to relay to the
    /// user. Background memory writes are fired-and-forgotten before this
    /// returns (§4.7 step 1/4, §5 ordering guarantees: they happen causally
    /// after the reply, never before it).
    #[instrument(skip(self, turn), fields(user_id = turn.user_id, correlation_id = %turn.correlation_id))]
    pub async fn handle_turn(&self, turn: &TurnInput) -> Result<String> {
        let content = turn.content().to_string();

        if let Some(reply) = self.flows.handle_pending(turn.user_id, &content).await? {
            self.spawn_background_writes(turn.user_id, content, reply.clone());
            return Ok(reply);
        }

        let mut messages = self.build_messages(turn.user_id, &content).await;
        let reply = tool_loop::run(self.llm.as_ref(), &mut messages, &self.tools, &self.flows, turn.user_id).await?;

        self.spawn_background_writes(turn.user_id, content, reply.clone());
        Ok(reply)
    }

    /// Assembles the message list for the LLM call: system prompt, the
    /// long-term summary (if any), the last N turns, then the current
    /// message (§4.7 step 2). The summary and recent-turn fetches run in
    /// parallel; either degrading to empty on failure rather than failing
    /// the turn.
    async fn build_messages(&self, user_id: i64, content: &str) -> Vec<ChatMessage> {
        let (summary, recent) = tokio::join!(
            self.memory.get_summary(user_id),
            self.memory.recent(user_id, self.config.memory.recent_turns),
        );

        let summary = summary.unwrap_or_else(|err| {
            warn!(error = %err, "long-term summary fetch failed, continuing without it");
            None
        });
        let recent = recent.unwrap_or_else(|err| {
            warn!(error = %err, "recent-turn fetch failed, continuing with empty history");
            Vec::new()
        });

        let mut messages = vec![ChatMessage::system(build_system_prompt(&self.config))];
        if let Some(summary) = summary {
            messages.push(ChatMessage::system(format!("Long-term memory summary: {summary}")));
        }
        for turn in &recent {
            messages.push(turn_to_chat_message(turn));
        }
        messages.push(ChatMessage::user(content));
        messages
    }

    /// Schedules the append-user/append-assistant/recompute-summary writes
    /// (§4.7 step 4) without blocking the reply. Failures are logged, never
    /// surfaced — the conversation log is best-effort durability, not a
    /// turn precondition.
    fn spawn_background_writes(&self, user_id: i64, user_text: String, assistant_text: String) {
        let memory = self.memory.clone();
        let llm = self.llm.clone();
        let summary_window = self.config.memory.summary_window_turns;

        tokio::spawn(async move {
            let now = chrono::Utc::now();
            if let Err(err) = memory
                .append(ConversationTurn { user_id, role: TurnRole::User, content: user_text, metadata: None, created_at: now })
                .await
            {
                warn!(user_id, error = %err, "failed to append user turn to memory");
            }
            if let Err(err) = memory
                .append(ConversationTurn { user_id, role: TurnRole::Assistant, content: assistant_text, metadata: None, created_at: now })
                .await
            {
                warn!(user_id, error = %err, "failed to append assistant turn to memory");
            }

            if let Err(err) = recompute_summary(llm.as_ref(), memory.as_ref(), user_id, summary_window).await {
                warn!(user_id, error = %err, "long-term summary recompute failed, leaving prior summary in place");
            }
        });
    }
}

fn turn_to_chat_message(turn: &ConversationTurn) -> ChatMessage {
    match turn.role {
        TurnRole::User => ChatMessage::user(&turn.content),
        TurnRole::Assistant => ChatMessage::assistant(&turn.content),
        // A historical tool result has no live `tool_call_id` to pair with;
        // folding it into an assistant-authored note keeps the transcript a
        // valid message sequence instead of a dangling tool-role entry.
        TurnRole::Tool => ChatMessage::assistant(format!("[tool result] {}", turn.content)),
    }
}

/// Recomputes the rolling long-term summary from the last `window` turns
/// and upserts it (§4.7 step 4, §3 lifecycles: "recomputed periodically
/// from the latest N turns"). A plain LLM call with no tools.
async fn recompute_summary(llm: &dyn LlmClient, memory: &dyn MemoryStore, user_id: i64, window: usize) -> Result<()> {
    let recent = memory.recent(user_id, window).await?;
    if recent.is_empty() {
        return Ok(());
    }

    let transcript = recent
        .iter()
        .map(|t| format!("{:?}: {}", t.role, t.content))
        .collect::<Vec<_>>()
        .join("\n");

    let prompt = format!(
        "Summarize the durable facts worth remembering about this user from the \
following conversation, in two or three sentences. Do not include pleasantries \
or anything transient (what they just asked for). If nothing durable stands \
out, reply with an empty string.\n\n{transcript}"
    );
    let messages = vec![ChatMessage::system("You produce terse long-term memory summaries."), ChatMessage::user(prompt)];
    let response = llm.chat(&messages, None).await?;
    let summary = response.content.trim();
    if !summary.is_empty() {
        memory.upsert_summary(user_id, summary.to_string()).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use orchestrator_llm::ChatResponse;
    use orchestrator_memory::JsonlMemoryStore;
    use orchestrator_tools::ToolRegistry;
    use std::sync::Mutex as StdMutex;

    struct ScriptedLlm {
        responses: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn chat(&self, _messages: &[ChatMessage], _tools: Option<serde_json::Value>) -> Result<ChatResponse> {
            let content = self.responses.lock().unwrap().remove(0);
            Ok(ChatResponse { content, tool_calls: vec![], finish_reason: "stop".into() })
        }
    }

    fn test_turn(user_id: i64, message: &str) -> TurnInput {
        TurnInput {
            user_id,
            chat_id: user_id.to_string(),
            origin: orchestrator_services::turn::OriginType::Text,
            message: message.to_string(),
            file_id: None,
            timestamp: chrono::Utc::now(),
            correlation_id: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn plain_turn_falls_through_to_the_llm_and_appends_memory() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm { responses: StdMutex::new(vec!["hello there".to_string()]) });
        let memory = Arc::new(JsonlMemoryStore::new(dir.path().join("log.jsonl"), dir.path().join("summaries.json")));
        let config = AppConfig::default();
        let flows = Flows::new(
            dir.path().join("flows"),
            Arc::new(NoopMail),
            orchestrator_flows::MailLimits { list_page_size: 500, max_scan: 5000, max_per_turn_delete: 1000, max_per_turn_mark_read: 2000 },
            Arc::new(NoopCalendar),
            Arc::new(NoopBoard),
            Arc::new(ToolRegistry::default()),
        );
        let orchestrator = Orchestrator::new(config, flows, llm, Arc::new(ToolRegistry::default()), memory.clone());

        let reply = orchestrator.handle_turn(&test_turn(1, "hi")).await.unwrap();
        assert_eq!(reply, "hello there");

        // Background writes are fire-and-forget; give the spawned task a
        // chance to run before asserting on the log.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let recent = memory.recent(1, 10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "hi");
        assert_eq!(recent[1].content, "hello there");
    }

    struct NoopMail;
    #[async_trait]
    impl orchestrator_services::mail::MailService for NoopMail {
        async fn list_message_ids_page(&self, _q: &str, _max: u32, _token: Option<&str>) -> orchestrator_services::ServiceResult<orchestrator_services::mail::MessageListPage> {
            unreachable!()
        }
        async fn batch_modify_labels(&self, _ids: &[String], _add: &[String], _remove: &[String]) -> orchestrator_services::ServiceResult<()> {
            unreachable!()
        }
        async fn batch_delete_messages(&self, _ids: &[String]) -> orchestrator_services::ServiceResult<()> {
            unreachable!()
        }
        async fn get_message_headers(&self, _id: &str) -> orchestrator_services::ServiceResult<std::collections::HashMap<String, String>> {
            unreachable!()
        }
        async fn resolve_label_id(&self, _name: &str) -> orchestrator_services::ServiceResult<orchestrator_services::mail::LabelId> {
            unreachable!()
        }
        async fn send_message(&self, _to: &str, _cc: &[String], _subject: &str, _body: &str) -> orchestrator_services::ServiceResult<String> {
            unreachable!()
        }
    }

    struct NoopCalendar;
    #[async_trait]
    impl orchestrator_services::calendar::CalendarService for NoopCalendar {
        async fn list_events(&self, _time_min: chrono::DateTime<chrono::Utc>, _time_max: chrono::DateTime<chrono::Utc>, _query: Option<&str>) -> orchestrator_services::ServiceResult<Vec<orchestrator_services::calendar::CalendarEvent>> {
            unreachable!()
        }
        async fn get_event(&self, _event_id: &str) -> orchestrator_services::ServiceResult<orchestrator_services::calendar::CalendarEvent> {
            unreachable!()
        }
        async fn patch_event(&self, _event_id: &str, _patch: &orchestrator_services::calendar::EventPatch, _notify_attendees: bool) -> orchestrator_services::ServiceResult<orchestrator_services::calendar::CalendarEvent> {
            unreachable!()
        }
        async fn delete_event(&self, _event_id: &str, _notify_attendees: bool) -> orchestrator_services::ServiceResult<()> {
            unreachable!()
        }
        async fn create_event(&self, _new_event: &orchestrator_services::calendar::NewEvent, _notify_attendees: bool) -> orchestrator_services::ServiceResult<orchestrator_services::calendar::CalendarEvent> {
            unreachable!()
        }
    }

    struct NoopBoard;
    #[async_trait]
    impl orchestrator_services::task_board::TaskBoardService for NoopBoard {
        async fn list_boards(&self) -> orchestrator_services::ServiceResult<Vec<orchestrator_services::task_board::Board>> {
            unreachable!()
        }
        async fn find_board_by_name(&self, _name: &str) -> orchestrator_services::ServiceResult<Option<orchestrator_services::task_board::Board>> {
            unreachable!()
        }
        async fn list_lists(&self, _board_id: &str) -> orchestrator_services::ServiceResult<Vec<orchestrator_services::task_board::TaskList>> {
            unreachable!()
        }
        async fn find_list_by_name(&self, _board_id: &str, _name: &str) -> orchestrator_services::ServiceResult<Option<orchestrator_services::task_board::TaskList>> {
            unreachable!()
        }
        async fn find_cards_by_name(&self, _query: &str) -> orchestrator_services::ServiceResult<Vec<orchestrator_services::task_board::Card>> {
            unreachable!()
        }
        async fn get_card(&self, _card_id: &str) -> orchestrator_services::ServiceResult<orchestrator_services::task_board::Card> {
            unreachable!()
        }
        async fn create_card(&self, _list_id: &str, _name: &str, _description: Option<&str>) -> orchestrator_services::ServiceResult<orchestrator_services::task_board::Card> {
            unreachable!()
        }
        async fn update_card(&self, _card_id: &str, _patch: &orchestrator_services::task_board::CardPatch) -> orchestrator_services::ServiceResult<orchestrator_services::task_board::Card> {
            unreachable!()
        }
        async fn add_comment(&self, _card_id: &str, _text: &str) -> orchestrator_services::ServiceResult<()> {
            unreachable!()
        }
        async fn archive_card(&self, _card_id: &str, _archived: bool) -> orchestrator_services::ServiceResult<orchestrator_services::task_board::Card> {
            unreachable!()
        }
    }
}
