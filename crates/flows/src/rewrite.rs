//! Tool-call rewriting for the LLM tool loop (§4.8). Isolated as a pure
//! `(name, args) -> (name, args)` function so it can be tested without a
//! running loop. Two kinds of rewrite: comment-looking phrasing on
//! `task_board_update` is rerouted to a comment action, and any low-level
//! task-board tool the LLM might still call directly collapses onto the
//! unified `task_board_dispatch` entry point.

use serde_json::Value;

pub fn rewrite_tool_call(name: &str, mut args: Value) -> (String, Value) {
    match name {
        "task_board_update" => {
            let looks_like_comment = args
                .get("comment")
                .and_then(|v| v.as_str())
                .is_some();
            if looks_like_comment {
                set_action(&mut args, "comment");
            } else if args.get("to_list_name").is_some() && args.get("title").is_none() {
                set_action(&mut args, "move");
            } else {
                set_action(&mut args, "update");
            }
            ("task_board_dispatch".to_string(), args)
        }
        "task_board_create_card" => {
            set_action(&mut args, "create");
            ("task_board_dispatch".to_string(), args)
        }
        "task_board_move_card" => {
            set_action(&mut args, "move");
            ("task_board_dispatch".to_string(), args)
        }
        "task_board_comment_card" => {
            set_action(&mut args, "comment");
            ("task_board_dispatch".to_string(), args)
        }
        "task_board_delete_card" => {
            set_action(&mut args, "delete");
            ("task_board_dispatch".to_string(), args)
        }
        "task_board_archive_card" => {
            set_action(&mut args, "archive");
            ("task_board_dispatch".to_string(), args)
        }
        other => (other.to_string(), args),
    }
}

fn set_action(args: &mut Value, action: &str) {
    if let Value::Object(map) = args {
        map.insert("action".to_string(), Value::String(action.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn comment_phrasing_on_update_reroutes_to_dispatch_comment() {
        let (name, args) = rewrite_tool_call("task_board_update", json!({ "card_id": "c1", "comment": "done" }));
        assert_eq!(name, "task_board_dispatch");
        assert_eq!(args["action"], "comment");
    }

    #[test]
    fn list_change_on_update_reroutes_to_move() {
        let (name, args) = rewrite_tool_call("task_board_update", json!({ "card_id": "c1", "to_list_name": "Done" }));
        assert_eq!(name, "task_board_dispatch");
        assert_eq!(args["action"], "move");
    }

    #[test]
    fn plain_update_keeps_update_action() {
        let (name, args) = rewrite_tool_call("task_board_update", json!({ "card_id": "c1", "title": "New" }));
        assert_eq!(name, "task_board_dispatch");
        assert_eq!(args["action"], "update");
    }

    #[test]
    fn low_level_create_collapses_into_dispatch() {
        let (name, args) = rewrite_tool_call("task_board_create_card", json!({ "title": "Write docs" }));
        assert_eq!(name, "task_board_dispatch");
        assert_eq!(args["action"], "create");
    }

    #[test]
    fn unrelated_tool_passes_through_unchanged() {
        let (name, args) = rewrite_tool_call("mail_send", json!({ "to": "a@b.com" }));
        assert_eq!(name, "mail_send");
        assert_eq!(args["to"], "a@b.com");
    }
}
