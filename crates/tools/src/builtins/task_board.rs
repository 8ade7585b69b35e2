//! Task-board tools. `task_board_dispatch` is the single unified entry
//! point for create/update/move/comment/delete/archive (§4.5.7); lookup and
//! list are read-only conveniences.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::{Value, json};

use orchestrator_services::task_board::{Card, CardPatch, TaskBoardService};

use crate::{Tool, ToolEnvelope, ToolParam, ToolSpec};

fn string_field<'a>(args: &'a Value, field: &str) -> Option<&'a str> {
    args.get(field).and_then(|v| v.as_str())
}

fn card_json(card: &Card) -> Value {
    json!({
        "card_id": card.id,
        "name": card.name,
        "description": card.description,
        "list_id": card.list_id,
        "board_id": card.board_id,
        "closed": card.closed,
        "url": card.url,
    })
}

/// Comment/status phrasing in an "update" request gets rerouted before the
/// action field is ever consulted for resolution.
fn rewrite_action(action: &str, args: &Value) -> String {
    if action == "update" {
        if string_field(args, "comment").is_some() {
            return "comment".to_string();
        }
        if string_field(args, "to_list_name").is_some() && string_field(args, "title").is_none() {
            return "move".to_string();
        }
    }
    action.to_string()
}

pub struct TaskBoardDispatchTool {
    board: Arc<dyn TaskBoardService>,
}

impl TaskBoardDispatchTool {
    pub fn new(board: Arc<dyn TaskBoardService>) -> Self {
        Self { board }
    }

    async fn resolve_card(&self, args: &Value) -> Result<Result<String, &'static str>> {
        if let Some(card_id) = string_field(args, "card_id") {
            return Ok(Ok(card_id.to_string()));
        }
        let Some(card_name) = string_field(args, "card_name") else {
            return Ok(Err("card_name"));
        };
        let matches = self.board.find_cards_by_name(card_name).await?;
        match matches.first() {
            Some(card) => Ok(Ok(card.id.clone())),
            None => Ok(Err("card_name")),
        }
    }

    async fn resolve_list(&self, args: &Value) -> Result<Result<String, &'static str>> {
        let Some(to_list_name) = string_field(args, "to_list_name") else {
            return Ok(Err("to_list_name"));
        };
        let board_id = match string_field(args, "board_name") {
            Some(board_name) => match self.board.find_board_by_name(board_name).await? {
                Some(board) => board.id,
                None => return Ok(Err("board_name")),
            },
            None => {
                let boards = self.board.list_boards().await?;
                match boards.first() {
                    Some(board) => board.id.clone(),
                    None => return Ok(Err("board_name")),
                }
            }
        };
        match self.board.find_list_by_name(&board_id, to_list_name).await? {
            Some(list) => Ok(Ok(list.id)),
            None => Ok(Err("to_list_name")),
        }
    }
}

#[async_trait]
impl Tool for TaskBoardDispatchTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "task_board_dispatch".to_string(),
            description: "Create, update, move, comment on, delete, or archive a task-board card.".to_string(),
            params: vec![
                ToolParam::required("action", "create|update|move|comment|delete|archive"),
                ToolParam::optional("card_id", "resolved card identifier"),
                ToolParam::optional("card_name", "card title to resolve"),
                ToolParam::optional("board_name", "board the card/list lives on"),
                ToolParam::optional("to_list_name", "destination list name"),
                ToolParam::optional("title", "card title for create/update"),
                ToolParam::optional("description", "card description for create/update"),
                ToolParam::optional("comment", "comment text"),
            ],
        }
    }

    async fn run(&self, args: Value) -> Result<ToolEnvelope> {
        let action = string_field(&args, "action").ok_or_else(|| anyhow!("task_board_dispatch missing action"))?;
        let action = rewrite_action(action, &args);

        match action.as_str() {
            "create" => {
                let list_id = match self.resolve_list(&args).await? {
                    Ok(id) => id,
                    Err(field) => return Ok(ToolEnvelope::DispatchRequired { awaiting: field.to_string(), data: args }),
                };
                let title = match string_field(&args, "title") {
                    Some(title) => title,
                    None => return Ok(ToolEnvelope::DispatchRequired { awaiting: "title".to_string(), data: args }),
                };
                let card = self.board.create_card(&list_id, title, string_field(&args, "description")).await?;
                Ok(ToolEnvelope::ok(card_json(&card)))
            }
            "update" => {
                let card_id = match self.resolve_card(&args).await? {
                    Ok(id) => id,
                    Err(field) => return Ok(ToolEnvelope::DispatchRequired { awaiting: field.to_string(), data: args }),
                };
                let patch = CardPatch {
                    name: string_field(&args, "title").map(str::to_string),
                    description: string_field(&args, "description").map(str::to_string),
                    list_id: None,
                    board_id: None,
                };
                let card = self.board.update_card(&card_id, &patch).await?;
                Ok(ToolEnvelope::ok(card_json(&card)))
            }
            "move" => {
                let card_id = match self.resolve_card(&args).await? {
                    Ok(id) => id,
                    Err(field) => return Ok(ToolEnvelope::DispatchRequired { awaiting: field.to_string(), data: args }),
                };
                let list_id = match self.resolve_list(&args).await? {
                    Ok(id) => id,
                    Err(field) => return Ok(ToolEnvelope::DispatchRequired { awaiting: field.to_string(), data: args }),
                };
                let current = self.board.get_card(&card_id).await?;
                let board_id = match string_field(&args, "board_name") {
                    Some(_) => {
                        // Cross-board move is inferred only if the destination board
                        // actually differs from the card's current board.
                        if let Ok(Some(destination)) = self
                            .board
                            .find_board_by_name(string_field(&args, "board_name").unwrap())
                            .await
                        {
                            if destination.id != current.board_id {
                                Some(destination.id)
                            } else {
                                None
                            }
                        } else {
                            None
                        }
                    }
                    None => None,
                };
                let patch = CardPatch {
                    name: None,
                    description: None,
                    list_id: Some(list_id),
                    board_id,
                };
                let card = self.board.update_card(&card_id, &patch).await?;
                Ok(ToolEnvelope::ok(card_json(&card)))
            }
            "comment" => {
                let card_id = match self.resolve_card(&args).await? {
                    Ok(id) => id,
                    Err(field) => return Ok(ToolEnvelope::DispatchRequired { awaiting: field.to_string(), data: args }),
                };
                let Some(text) = string_field(&args, "comment") else {
                    return Ok(ToolEnvelope::CommentRequired { data: args });
                };
                self.board.add_comment(&card_id, text).await?;
                Ok(ToolEnvelope::ok(json!({ "card_id": card_id, "commented": true })))
            }
            "delete" | "archive" => {
                let card_id = match self.resolve_card(&args).await? {
                    Ok(id) => id,
                    Err(field) => return Ok(ToolEnvelope::DispatchRequired { awaiting: field.to_string(), data: args }),
                };
                let card = self.board.archive_card(&card_id, true).await?;
                Ok(ToolEnvelope::ok(card_json(&card)))
            }
            other => Err(anyhow!("unknown task_board_dispatch action: {other}")),
        }
    }
}

pub struct TaskBoardLookupTool {
    board: Arc<dyn TaskBoardService>,
}

impl TaskBoardLookupTool {
    pub fn new(board: Arc<dyn TaskBoardService>) -> Self {
        Self { board }
    }
}

#[async_trait]
impl Tool for TaskBoardLookupTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "task_board_lookup".to_string(),
            description: "Look up a single card by id or name.".to_string(),
            params: vec![
                ToolParam::optional("card_id", "resolved card identifier"),
                ToolParam::optional("card_name", "card title to search for"),
            ],
        }
    }

    async fn run(&self, args: Value) -> Result<ToolEnvelope> {
        if let Some(card_id) = string_field(&args, "card_id") {
            let card = self.board.get_card(card_id).await?;
            return Ok(ToolEnvelope::ok(card_json(&card)));
        }
        let Some(card_name) = string_field(&args, "card_name") else {
            return Ok(ToolEnvelope::DispatchRequired { awaiting: "card_name".to_string(), data: args });
        };
        let matches = self.board.find_cards_by_name(card_name).await?;
        match matches.first() {
            Some(card) => Ok(ToolEnvelope::ok(card_json(card))),
            None => Ok(ToolEnvelope::ok(json!({ "found": false }))),
        }
    }
}

pub struct TaskBoardListTool {
    board: Arc<dyn TaskBoardService>,
}

impl TaskBoardListTool {
    pub fn new(board: Arc<dyn TaskBoardService>) -> Self {
        Self { board }
    }
}

#[async_trait]
impl Tool for TaskBoardListTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "task_board_list".to_string(),
            description: "List cards matching a free-text query.".to_string(),
            params: vec![ToolParam::required("query", "free-text search over card names")],
        }
    }

    async fn run(&self, args: Value) -> Result<ToolEnvelope> {
        let query = string_field(&args, "query").ok_or_else(|| anyhow!("task_board_list missing query"))?;
        let cards = self.board.find_cards_by_name(query).await?;
        Ok(ToolEnvelope::ok(json!({ "cards": cards.iter().map(card_json).collect::<Vec<_>>() })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_services::error::ServiceResult;
    use orchestrator_services::task_board::{Board, TaskList};
    use std::sync::Mutex;

    struct FakeBoard {
        cards: Mutex<Vec<Card>>,
    }

    fn card(id: &str, name: &str, list_id: &str, board_id: &str) -> Card {
        Card {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            list_id: list_id.to_string(),
            board_id: board_id.to_string(),
            closed: false,
            url: format!("https://trello.com/c/{id}"),
        }
    }

    #[async_trait]
    impl TaskBoardService for FakeBoard {
        async fn list_boards(&self) -> ServiceResult<Vec<Board>> {
            Ok(vec![Board { id: "b1".into(), name: "Engineering".into() }])
        }
        async fn find_board_by_name(&self, name: &str) -> ServiceResult<Option<Board>> {
            Ok(Some(Board { id: "b1".into(), name: name.into() }))
        }
        async fn list_lists(&self, board_id: &str) -> ServiceResult<Vec<TaskList>> {
            Ok(vec![TaskList { id: "l1".into(), name: "Doing".into(), board_id: board_id.into() }])
        }
        async fn find_list_by_name(&self, board_id: &str, name: &str) -> ServiceResult<Option<TaskList>> {
            Ok(Some(TaskList { id: "l1".into(), name: name.into(), board_id: board_id.into() }))
        }
        async fn find_cards_by_name(&self, query: &str) -> ServiceResult<Vec<Card>> {
            Ok(self.cards.lock().unwrap().iter().filter(|c| c.name.contains(query)).cloned().collect())
        }
        async fn get_card(&self, card_id: &str) -> ServiceResult<Card> {
            Ok(self.cards.lock().unwrap().iter().find(|c| c.id == card_id).cloned().unwrap_or_else(|| card(card_id, "?", "l1", "b1")))
        }
        async fn create_card(&self, list_id: &str, name: &str, _description: Option<&str>) -> ServiceResult<Card> {
            Ok(card("new1", name, list_id, "b1"))
        }
        async fn update_card(&self, card_id: &str, patch: &CardPatch) -> ServiceResult<Card> {
            let mut c = card(card_id, "Design", "l1", "b1");
            if let Some(list_id) = &patch.list_id {
                c.list_id = list_id.clone();
            }
            if let Some(board_id) = &patch.board_id {
                c.board_id = board_id.clone();
            }
            Ok(c)
        }
        async fn add_comment(&self, _card_id: &str, _text: &str) -> ServiceResult<()> {
            Ok(())
        }
        async fn archive_card(&self, card_id: &str, archived: bool) -> ServiceResult<Card> {
            let mut c = card(card_id, "Design", "l1", "b1");
            c.closed = archived;
            Ok(c)
        }
    }

    #[tokio::test]
    async fn dispatch_create_resolves_default_board_and_list() {
        let tool = TaskBoardDispatchTool::new(Arc::new(FakeBoard { cards: Mutex::new(vec![]) }));
        let result = tool
            .run(json!({ "action": "create", "to_list_name": "Doing", "title": "Write docs" }))
            .await
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn dispatch_update_without_card_asks_for_card_name() {
        let tool = TaskBoardDispatchTool::new(Arc::new(FakeBoard { cards: Mutex::new(vec![]) }));
        let result = tool.run(json!({ "action": "update", "title": "New title" })).await.unwrap();
        match result {
            ToolEnvelope::DispatchRequired { awaiting, .. } => assert_eq!(awaiting, "card_name"),
            other => panic!("expected dispatch_required, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn comment_phrasing_on_update_is_rerouted() {
        let tool = TaskBoardDispatchTool::new(Arc::new(FakeBoard {
            cards: Mutex::new(vec![card("c1", "Design", "l1", "b1")]),
        }));
        let result = tool
            .run(json!({ "action": "update", "card_id": "c1", "comment": "looks good" }))
            .await
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn lookup_by_name_falls_back_to_not_found() {
        let tool = TaskBoardLookupTool::new(Arc::new(FakeBoard { cards: Mutex::new(vec![]) }));
        let result = tool.run(json!({ "card_name": "nonexistent" })).await.unwrap();
        match result {
            ToolEnvelope::Ok { data } => assert_eq!(data["found"], false),
            other => panic!("expected ok, got {other:?}"),
        }
    }
}
