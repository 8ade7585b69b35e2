//! Pure rendering of a bulk-operation outcome into the one user-facing
//! string the turn orchestrator relays verbatim.

use crate::{BulkState, ContinueOutcome};

pub fn present(outcome: &ContinueOutcome) -> String {
    match outcome {
        ContinueOutcome::Progressed { state, .. } => format!(
            "Processed {} of {} so far, {} remaining. Reply CONTINUE to process more, or CANCEL to stop.",
            state.processed, state.total, state.remaining()
        ),
        ContinueOutcome::Completed { state, results } => {
            let errors = results.iter().filter(|r| !r.success).count();
            if errors > 0 {
                format!("Done. Processed {} with {} error(s).", state.processed, errors)
            } else {
                format!("Done. Processed {}.", state.processed)
            }
        }
        ContinueOutcome::PermissionDenied(message) => {
            format!("I lost permission to do this partway through: {message}")
        }
    }
}

pub fn present_started(total: u64) -> String {
    format!("I found {total} matching items. Reply CONTINUE to proceed, or CANCEL to stop.")
}

pub fn present_too_many(estimate: u64, max: u64) -> String {
    format!("That matches at-least {estimate} items, which is more than the {max} I can handle in one operation. Try narrowing your request.")
}

pub fn present_empty() -> String {
    "I didn't find any matching items.".to_string()
}

pub fn present_cancelled(state: &BulkState) -> String {
    format!(
        "Cancelled. Processed {} of {} before stopping; {} left untouched.",
        state.processed,
        state.total,
        state.remaining()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BulkItemResult, Placeholder};
    use serde_json::Value;
    use std::collections::VecDeque;

    fn state(processed: u64, remaining: usize, total: u64) -> BulkState {
        BulkState {
            op_id: "op1".to_string(),
            domain: "mail".to_string(),
            action: "delete".to_string(),
            batch_size: 10,
            total,
            processed,
            remaining_items: vec![Placeholder; remaining],
            metadata: Value::Null,
            buffer: VecDeque::new(),
        }
    }

    #[test]
    fn completed_with_errors_mentions_error_count() {
        let outcome = ContinueOutcome::Completed {
            state: state(10, 0, 10),
            results: vec![BulkItemResult { item_id: "a".into(), success: false, error: Some("boom".into()) }],
        };
        let message = present(&outcome);
        assert!(message.contains("1 error"));
    }

    #[test]
    fn progressed_mentions_remaining_count() {
        let outcome = ContinueOutcome::Progressed { state: state(10, 5, 15), results: vec![] };
        let message = present(&outcome);
        assert!(message.contains("5 remaining"));
    }

    #[test]
    fn cancelled_reports_processed_and_leftover() {
        let message = present_cancelled(&state(4, 6, 10));
        assert!(message.contains("Processed 4 of 10"));
        assert!(message.contains("6 left"));
    }
}
