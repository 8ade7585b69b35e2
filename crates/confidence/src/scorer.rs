//! Deterministic confidence scoring for a proposed tool call (§4.3).
//!
//! No network calls. The score is a weighted sum of four sub-scores the
//! scorer computes purely from the tool's name, its candidate arguments,
//! and the set of fields the tool declares required.

use serde_json::Value;

const WEIGHT_INTENT: f64 = 0.25;
const WEIGHT_COMPLETENESS: f64 = 0.30;
const WEIGHT_UNIQUENESS: f64 = 0.25;
const WEIGHT_FEASIBILITY: f64 = 0.20;

const BASELINE_INTENT: f64 = 0.85;
const BASELINE_COMPLETENESS: f64 = 0.85;
const BASELINE_UNIQUENESS: f64 = 0.85;
const BASELINE_FEASIBILITY: f64 = 0.90;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfidenceAssessment {
    pub score: u8,
    pub awaiting: Option<String>,
    pub question: Option<String>,
    pub missing: Option<Vec<String>>,
}

/// The fixed set of tool families the scorer has specific rules for.
/// Anything else falls back to the baseline sub-scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolFamily {
    TaskBoardDispatch,
    TaskLookup,
    TaskListing,
    MailSendOrDraft,
    CalendarCreate,
    CalendarModify,
    Other,
}

impl ToolFamily {
    pub fn classify(tool_name: &str) -> Self {
        match tool_name {
            "task_board_dispatch" => ToolFamily::TaskBoardDispatch,
            "task_board_lookup" | "task_board_get_card_status" => ToolFamily::TaskLookup,
            "task_board_list" | "task_board_list_cards" => ToolFamily::TaskListing,
            "mail_send" | "mail_draft" => ToolFamily::MailSendOrDraft,
            "calendar_create" => ToolFamily::CalendarCreate,
            "calendar_modify" => ToolFamily::CalendarModify,
            _ => ToolFamily::Other,
        }
    }
}

fn is_present(args: &Value, field: &str) -> bool {
    match args.get(field) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(_) => true,
    }
}

fn is_valid_email(args: &Value, field: &str) -> bool {
    args.get(field)
        .and_then(|v| v.as_str())
        .map(|s| s.contains('@') && s.split('@').count() == 2 && s.split('@').nth(1).is_some_and(|d| d.contains('.')))
        .unwrap_or(false)
}

fn has_24_hex_identifier(args: &Value) -> bool {
    let Some(obj) = args.as_object() else {
        return false;
    };
    obj.values().any(|v| {
        v.as_str()
            .map(|s| s.len() == 24 && s.chars().all(|c| c.is_ascii_hexdigit()))
            .unwrap_or(false)
    })
}

fn question_for_field(field: &str) -> String {
    match field {
        "card_name" => "Which task/card should I use?".to_string(),
        "board_name" => "Which Trello board is this on?".to_string(),
        "to_list_name" => "Which Trello list should I move it to?".to_string(),
        "title" => "What should I call this?".to_string(),
        "to" => "Who should this email go to?".to_string(),
        "start" | "start_time" => "What time should this start?".to_string(),
        "event_id" => "Which event do you mean?".to_string(),
        other => format!("Please provide {other}."),
    }
}

/// Score a proposed tool call. `required_fields` should be the tool's
/// `ToolSpec::required_fields()`.
pub fn score_tool_call(tool_name: &str, args: &Value, required_fields: &[String]) -> ConfidenceAssessment {
    let family = ToolFamily::classify(tool_name);

    let mut intent = BASELINE_INTENT;
    let mut completeness = BASELINE_COMPLETENESS;
    let mut uniqueness = BASELINE_UNIQUENESS;
    let mut feasibility = BASELINE_FEASIBILITY;

    let mut missing: Vec<String> = required_fields
        .iter()
        .filter(|f| !is_present(args, f))
        .cloned()
        .collect();

    match family {
        ToolFamily::TaskBoardDispatch => {
            // A resolved card_id makes the card_name field moot.
            if is_present(args, "card_id") {
                missing.retain(|m| m != "card_name");
            }
            if has_24_hex_identifier(args) {
                uniqueness = 0.98;
            }
        }
        ToolFamily::TaskLookup => {
            if has_24_hex_identifier(args) {
                uniqueness = 0.97;
            }
        }
        ToolFamily::TaskListing => {
            // Listing never targets a single unique entity.
            uniqueness = 0.90;
        }
        ToolFamily::MailSendOrDraft => {
            if is_present(args, "to") && is_valid_email(args, "to") {
                intent = 0.92;
            } else if is_present(args, "to") {
                intent = 0.55;
            }
        }
        ToolFamily::CalendarCreate => {
            if is_present(args, "start") && is_present(args, "end") {
                feasibility = 0.95;
            } else {
                feasibility = 0.70;
            }
        }
        ToolFamily::CalendarModify => {
            if has_24_hex_identifier(args) || is_present(args, "event_id") {
                uniqueness = 0.95;
            }
        }
        ToolFamily::Other => {}
    }

    if !missing.is_empty() {
        let penalty = 0.20 * (missing.len().min(4) as f64);
        completeness = completeness.min((1.0 - penalty).max(0.40));
    }

    let weighted = intent * WEIGHT_INTENT
        + completeness * WEIGHT_COMPLETENESS
        + uniqueness * WEIGHT_UNIQUENESS
        + feasibility * WEIGHT_FEASIBILITY;
    let mut score = (weighted * 100.0).round() as i32;

    let awaiting = missing.first().cloned();
    if !missing.is_empty() {
        score = score.min(89);
    }
    let score = score.clamp(0, 100) as u8;

    let question = awaiting.as_deref().map(question_for_field);

    ConfidenceAssessment {
        score,
        awaiting,
        question,
        missing: if missing.is_empty() { None } else { Some(missing) },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn complete_call_scores_high_with_no_missing() {
        let args = json!({ "card_id": "5f8d0d55b54764421b7156c9", "action": "move" });
        let required = vec!["card_id".to_string()];
        let result = score_tool_call("task_board_dispatch", &args, &required);
        assert!(result.missing.is_none());
        assert!(result.score >= 90, "expected high score, got {}", result.score);
    }

    #[test]
    fn missing_required_field_clamps_to_at_most_89() {
        let args = json!({ "action": "move" });
        let required = vec!["card_name".to_string()];
        let result = score_tool_call("task_board_dispatch", &args, &required);
        assert_eq!(result.missing, Some(vec!["card_name".to_string()]));
        assert!(result.score <= 89);
        assert_eq!(result.awaiting.as_deref(), Some("card_name"));
        assert_eq!(result.question.as_deref(), Some("Which task/card should I use?"));
    }

    #[test]
    fn card_id_present_clears_card_name_requirement() {
        let args = json!({ "card_id": "5f8d0d55b54764421b7156c9" });
        let required = vec!["card_name".to_string(), "card_id".to_string()];
        let result = score_tool_call("task_board_dispatch", &args, &required);
        assert!(result.missing.is_none());
    }

    #[test]
    fn unknown_field_falls_back_to_generic_question() {
        let args = json!({});
        let required = vec!["widget_count".to_string()];
        let result = score_tool_call("some_other_tool", &args, &required);
        assert_eq!(result.question.as_deref(), Some("Please provide widget_count."));
    }

    #[test]
    fn many_missing_fields_floor_completeness_penalty() {
        let args = json!({});
        let required = vec!["a".into(), "b".into(), "c".into(), "d".into(), "e".into()];
        let result = score_tool_call("mail_send", &args, &required);
        assert_eq!(result.missing.as_ref().unwrap().len(), 5);
        assert!(result.score <= 89);
    }

    #[test]
    fn mail_send_with_invalid_address_lowers_intent() {
        let good = score_tool_call("mail_send", &json!({"to": "a@b.com"}), &[]);
        let bad = score_tool_call("mail_send", &json!({"to": "not-an-email"}), &[]);
        assert!(good.score > bad.score);
    }
}
