//! Bounded LLM tool-calling loop (§4.8). Sends chat messages plus tool
//! schemas to the LLM, executes any requested tool (applying the
//! task-board rewrite first), gates low-confidence calls behind a
//! clarification question, persists whichever pending-flow state a tool's
//! envelope demands, and feeds successful results back as tool-role
//! messages. Stops on plain assistant text or the step cap.

use anyhow::Result;
use tracing::{debug, info, warn};

use orchestrator_confidence::score_tool_call;
use orchestrator_flows::records::{ConfidenceClarifyRecord, GenericToolConfirmRecord, TaskBoardDispatchRecord};
use orchestrator_flows::{rewrite_tool_call, Flows};
use orchestrator_llm::{ChatMessage, LlmClient, ToolCall};
use orchestrator_tools::{ToolEnvelope, ToolRegistry};

/// Hard cap on tool-call round-trips within one turn (§4.8).
pub const MAX_STEPS: usize = 10;

/// Tool-result content past this length is truncated with a marker before
/// being fed back to the LLM (§4.8).
pub const MAX_TOOL_CONTENT_CHARS: usize = 8000;

/// Confidence below this threshold pauses the call for a clarifying
/// question instead of executing it (§4.3, §4.5.9).
const CONFIDENCE_THRESHOLD: u8 = 70;

/// The outcome of running a single LLM-requested tool call.
enum StepOutcome {
    /// A tool needs something from the user (confirmation, a missing
    /// field, or a clarification); this is the reply and the loop ends.
    AwaitingUser(String),
    /// The tool ran to completion; feed this text back as the tool result
    /// and let the loop continue.
    ToolResult(String),
}

/// Runs the bounded tool loop for one turn, mutating `messages` in place as
/// tool calls are resolved. Returns the final text to relay to the user.
pub async fn run(
    llm: &dyn LlmClient,
    messages: &mut Vec<ChatMessage>,
    tools: &ToolRegistry,
    flows: &Flows,
    user_id: i64,
) -> Result<String> {
    let tools_json = orchestrator_tools::specs_to_openai_tools(&tools.list_specs());
    let tools_json = if tools_json.as_array().map(|a| a.is_empty()).unwrap_or(true) {
        None
    } else {
        Some(tools_json)
    };

    for step in 0..MAX_STEPS {
        debug!(step, "tool loop iteration");
        let response = llm.chat(messages, tools_json.clone()).await?;

        if response.tool_calls.is_empty() {
            return Ok(response.content);
        }

        // Every iteration advances exactly one tool invocation (§4.8); a
        // model that asks for several at once only gets the first honored.
        let call = response.tool_calls[0].clone();
        messages.push(ChatMessage::assistant_tool_calls(vec![call.clone()]));

        match run_one_call(&call, tools, flows, user_id).await? {
            StepOutcome::AwaitingUser(text) => return Ok(text),
            StepOutcome::ToolResult(text) => {
                messages.push(ChatMessage::tool_result(&call.id, text));
            }
        }
    }

    warn!("tool loop hit the step cap without a final answer");
    Ok("I got stuck working on that. Could you rephrase your request?".to_string())
}

async fn run_one_call(call: &ToolCall, tools: &ToolRegistry, flows: &Flows, user_id: i64) -> Result<StepOutcome> {
    let (name, args) = rewrite_tool_call(&call.function.name, call.function.arguments.clone());

    let Some(tool) = tools.get(&name) else {
        warn!(tool = %name, "LLM requested an unknown tool");
        return Ok(StepOutcome::AwaitingUser("I don't have a way to do that.".to_string()));
    };

    let required = tool.spec().required_fields();
    let assessment = score_tool_call(&name, &args, &required);
    if assessment.score < CONFIDENCE_THRESHOLD {
        if let (Some(awaiting), Some(question)) = (assessment.awaiting, assessment.question) {
            flows
                .confidence_clarify
                .set(user_id, ConfidenceClarifyRecord { tool_name: name, args, awaiting, question: question.clone() })
                .await?;
            return Ok(StepOutcome::AwaitingUser(question));
        }
    }

    info!(tool = %name, "executing tool call");
    let envelope = tool.run(args.clone()).await?;
    match envelope {
        ToolEnvelope::Ok { data } => Ok(StepOutcome::ToolResult(truncate(&data.to_string()))),
        ToolEnvelope::ConfirmationRequired { data } => {
            flows.tool_confirm.set(user_id, GenericToolConfirmRecord { tool_name: name, args: data }).await?;
            Ok(StepOutcome::AwaitingUser("This needs your confirmation. Reply YES to proceed, or CANCEL to stop.".to_string()))
        }
        ToolEnvelope::DispatchRequired { awaiting, data } => {
            flows.task_board_dispatch.set(user_id, TaskBoardDispatchRecord { awaiting: awaiting.clone(), args: data }).await?;
            Ok(StepOutcome::AwaitingUser(format!("I still need {awaiting}.")))
        }
        ToolEnvelope::CommentRequired { data } => {
            flows
                .task_board_dispatch
                .set(user_id, TaskBoardDispatchRecord { awaiting: "comment".to_string(), args: data })
                .await?;
            Ok(StepOutcome::AwaitingUser("What would you like the comment to say?".to_string()))
        }
    }
}

fn truncate(content: &str) -> String {
    if content.len() <= MAX_TOOL_CONTENT_CHARS {
        content.to_string()
    } else {
        format!("{}…[truncated]", &content[..MAX_TOOL_CONTENT_CHARS])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use orchestrator_llm::{ChatResponse, ToolCallFunction};
    use orchestrator_tools::{Tool, ToolParam, ToolSpec};
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::Mutex;

    struct ScriptedLlm {
        responses: Mutex<Vec<ChatResponse>>,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn chat(&self, _messages: &[ChatMessage], _tools: Option<serde_json::Value>) -> Result<ChatResponse> {
            Ok(self.responses.lock().unwrap().remove(0))
        }
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn spec(&self) -> ToolSpec {
            ToolSpec { name: "echo".into(), description: "echoes input".into(), params: vec![ToolParam::required("text", "text")] }
        }
        async fn run(&self, args: serde_json::Value) -> Result<ToolEnvelope> {
            Ok(ToolEnvelope::ok(args))
        }
    }

    fn flows(dir: &std::path::Path) -> Flows {
        Flows::new(
            dir,
            Arc::new(NoopMail),
            orchestrator_flows::MailLimits { list_page_size: 500, max_scan: 5000, max_per_turn_delete: 1000, max_per_turn_mark_read: 2000 },
            Arc::new(NoopCalendar),
            Arc::new(NoopBoard),
            Arc::new({
                let mut reg = ToolRegistry::default();
                reg.register(Box::new(EchoTool));
                reg
            }),
        )
    }

    struct NoopMail;
    #[async_trait]
    impl orchestrator_services::mail::MailService for NoopMail {
        async fn list_message_ids_page(
            &self,
            _q: &str,
            _max: u32,
            _token: Option<&str>,
        ) -> orchestrator_services::ServiceResult<orchestrator_services::mail::MessageListPage> {
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
        async fn list_events(
            &self,
            _time_min: chrono::DateTime<chrono::Utc>,
            _time_max: chrono::DateTime<chrono::Utc>,
            _query: Option<&str>,
        ) -> orchestrator_services::ServiceResult<Vec<orchestrator_services::calendar::CalendarEvent>> {
            unreachable!()
        }
        async fn get_event(&self, _event_id: &str) -> orchestrator_services::ServiceResult<orchestrator_services::calendar::CalendarEvent> {
            unreachable!()
        }
        async fn patch_event(
            &self,
            _event_id: &str,
            _patch: &orchestrator_services::calendar::EventPatch,
            _notify_attendees: bool,
        ) -> orchestrator_services::ServiceResult<orchestrator_services::calendar::CalendarEvent> {
            unreachable!()
        }
        async fn delete_event(&self, _event_id: &str, _notify_attendees: bool) -> orchestrator_services::ServiceResult<()> {
            unreachable!()
        }
        async fn create_event(
            &self,
            _new_event: &orchestrator_services::calendar::NewEvent,
            _notify_attendees: bool,
        ) -> orchestrator_services::ServiceResult<orchestrator_services::calendar::CalendarEvent> {
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
        async fn create_card(
            &self,
            _list_id: &str,
            _name: &str,
            _description: Option<&str>,
        ) -> orchestrator_services::ServiceResult<orchestrator_services::task_board::Card> {
            unreachable!()
        }
        async fn update_card(
            &self,
            _card_id: &str,
            _patch: &orchestrator_services::task_board::CardPatch,
        ) -> orchestrator_services::ServiceResult<orchestrator_services::task_board::Card> {
            unreachable!()
        }
        async fn add_comment(&self, _card_id: &str, _text: &str) -> orchestrator_services::ServiceResult<()> {
            unreachable!()
        }
        async fn archive_card(&self, _card_id: &str, _archived: bool) -> orchestrator_services::ServiceResult<orchestrator_services::task_board::Card> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn plain_text_response_ends_the_loop_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let llm = ScriptedLlm {
            responses: Mutex::new(vec![ChatResponse { content: "hi there".into(), tool_calls: vec![], finish_reason: "stop".into() }]),
        };
        let flows = flows(dir.path());
        let mut messages = vec![ChatMessage::user("hello")];
        let result = run(&llm, &mut messages, &flows_registry(&flows), &flows, 1).await.unwrap();
        assert_eq!(result, "hi there");
    }

    fn flows_registry(flows: &Flows) -> ToolRegistry {
        let mut reg = ToolRegistry::default();
        reg.register(Box::new(EchoTool));
        let _ = flows;
        reg
    }

    #[tokio::test]
    async fn tool_call_then_text_round_trips_through_one_iteration() {
        let dir = tempfile::tempdir().unwrap();
        let llm = ScriptedLlm {
            responses: Mutex::new(vec![
                ChatResponse {
                    content: String::new(),
                    tool_calls: vec![ToolCall {
                        id: "call_1".into(),
                        r#type: "function".into(),
                        function: ToolCallFunction { name: "echo".into(), arguments: json!({"text": "hi"}) },
                    }],
                    finish_reason: "tool_calls".into(),
                },
                ChatResponse { content: "done".into(), tool_calls: vec![], finish_reason: "stop".into() },
            ]),
        };
        let flows = flows(dir.path());
        let registry = flows_registry(&flows);
        let mut messages = vec![ChatMessage::user("echo hi")];
        let result = run(&llm, &mut messages, &registry, &flows, 1).await.unwrap();
        assert_eq!(result, "done");
        assert!(messages.iter().any(|m| m.tool_call_id.as_deref() == Some("call_1")));
    }
}
