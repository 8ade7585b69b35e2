//! Task-board service contract (§6): board/list/card CRUD, a comment
//! endpoint, and search. All card modifications go through `update_card`
//! except comments (separate endpoint) and archive (boolean `closed`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ServiceError, ServiceResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Board {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskList {
    pub id: String,
    pub name: String,
    pub board_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub list_id: String,
    pub board_id: String,
    pub closed: bool,
    pub url: String,
}

#[derive(Debug, Clone, Default)]
pub struct CardPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub list_id: Option<String>,
    pub board_id: Option<String>,
}

#[async_trait]
pub trait TaskBoardService: Send + Sync {
    async fn list_boards(&self) -> ServiceResult<Vec<Board>>;
    async fn find_board_by_name(&self, name: &str) -> ServiceResult<Option<Board>>;
    async fn list_lists(&self, board_id: &str) -> ServiceResult<Vec<TaskList>>;
    async fn find_list_by_name(&self, board_id: &str, name: &str) -> ServiceResult<Option<TaskList>>;
    async fn find_cards_by_name(&self, query: &str) -> ServiceResult<Vec<Card>>;
    async fn get_card(&self, card_id: &str) -> ServiceResult<Card>;
    async fn create_card(
        &self,
        list_id: &str,
        name: &str,
        description: Option<&str>,
    ) -> ServiceResult<Card>;
    async fn update_card(&self, card_id: &str, patch: &CardPatch) -> ServiceResult<Card>;
    async fn add_comment(&self, card_id: &str, text: &str) -> ServiceResult<()>;
    async fn archive_card(&self, card_id: &str, archived: bool) -> ServiceResult<Card>;
}

/// Trello REST v1 client, authenticated with a static key+token pair rather
/// than the shared OAuth source (Trello uses its own long-lived API tokens).
pub struct TrelloService {
    client: reqwest::Client,
    base_url: String,
    key: String,
    token: String,
}

impl TrelloService {
    pub fn new(key: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: "https://api.trello.com/1".to_string(),
            key: key.into(),
            token: token.into(),
        }
    }

    fn auth(&self) -> [(&'static str, &str); 2] {
        [("key", self.key.as_str()), ("token", self.token.as_str())]
    }

    fn parse_card(raw: &serde_json::Value) -> Option<Card> {
        Some(Card {
            id: raw.get("id")?.as_str()?.to_string(),
            name: raw.get("name")?.as_str()?.to_string(),
            description: raw
                .get("desc")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            list_id: raw.get("idList")?.as_str()?.to_string(),
            board_id: raw.get("idBoard")?.as_str()?.to_string(),
            closed: raw.get("closed").and_then(|v| v.as_bool()).unwrap_or(false),
            url: raw
                .get("shortUrl")
                .or_else(|| raw.get("url"))
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        })
    }
}

#[async_trait]
impl TaskBoardService for TrelloService {
    async fn list_boards(&self) -> ServiceResult<Vec<Board>> {
        let response = self
            .client
            .get(format!("{}/members/me/boards", self.base_url))
            .query(&self.auth())
            .send()
            .await
            .map_err(|err| ServiceError::Transient(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status, body));
        }
        let body: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|err| ServiceError::Internal(err.to_string()))?;
        Ok(body
            .into_iter()
            .filter_map(|b| {
                Some(Board {
                    id: b.get("id")?.as_str()?.to_string(),
                    name: b.get("name")?.as_str()?.to_string(),
                })
            })
            .collect())
    }

    async fn find_board_by_name(&self, name: &str) -> ServiceResult<Option<Board>> {
        let boards = self.list_boards().await?;
        Ok(boards
            .into_iter()
            .find(|b| b.name.eq_ignore_ascii_case(name)))
    }

    async fn list_lists(&self, board_id: &str) -> ServiceResult<Vec<TaskList>> {
        let response = self
            .client
            .get(format!("{}/boards/{}/lists", self.base_url, board_id))
            .query(&self.auth())
            .send()
            .await
            .map_err(|err| ServiceError::Transient(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status, body));
        }
        let body: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|err| ServiceError::Internal(err.to_string()))?;
        Ok(body
            .into_iter()
            .filter_map(|l| {
                Some(TaskList {
                    id: l.get("id")?.as_str()?.to_string(),
                    name: l.get("name")?.as_str()?.to_string(),
                    board_id: board_id.to_string(),
                })
            })
            .collect())
    }

    async fn find_list_by_name(&self, board_id: &str, name: &str) -> ServiceResult<Option<TaskList>> {
        let lists = self.list_lists(board_id).await?;
        Ok(lists.into_iter().find(|l| l.name.eq_ignore_ascii_case(name)))
    }

    async fn find_cards_by_name(&self, query: &str) -> ServiceResult<Vec<Card>> {
        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&self.auth())
            .query(&[("query", query), ("modelTypes", "cards"), ("card_fields", "all")])
            .send()
            .await
            .map_err(|err| ServiceError::Transient(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status, body));
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|err| ServiceError::Internal(err.to_string()))?;
        Ok(body
            .get("cards")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(Self::parse_card).collect())
            .unwrap_or_default())
    }

    async fn get_card(&self, card_id: &str) -> ServiceResult<Card> {
        let response = self
            .client
            .get(format!("{}/cards/{}", self.base_url, card_id))
            .query(&self.auth())
            .send()
            .await
            .map_err(|err| ServiceError::Transient(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status, body));
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|err| ServiceError::Internal(err.to_string()))?;
        Self::parse_card(&body).ok_or_else(|| ServiceError::Internal("malformed card payload".into()))
    }

    async fn create_card(
        &self,
        list_id: &str,
        name: &str,
        description: Option<&str>,
    ) -> ServiceResult<Card> {
        let mut params = self.auth().to_vec();
        params.push(("idList", list_id));
        params.push(("name", name));
        if let Some(description) = description {
            params.push(("desc", description));
        }
        let response = self
            .client
            .post(format!("{}/cards", self.base_url))
            .query(&params)
            .send()
            .await
            .map_err(|err| ServiceError::Transient(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status, body));
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|err| ServiceError::Internal(err.to_string()))?;
        Self::parse_card(&body).ok_or_else(|| ServiceError::Internal("malformed card payload".into()))
    }

    async fn update_card(&self, card_id: &str, patch: &CardPatch) -> ServiceResult<Card> {
        let mut params = self.auth().to_vec();
        if let Some(name) = &patch.name {
            params.push(("name", name.as_str()));
        }
        if let Some(description) = &patch.description {
            params.push(("desc", description.as_str()));
        }
        if let Some(list_id) = &patch.list_id {
            params.push(("idList", list_id.as_str()));
        }
        if let Some(board_id) = &patch.board_id {
            params.push(("idBoard", board_id.as_str()));
        }
        let response = self
            .client
            .put(format!("{}/cards/{}", self.base_url, card_id))
            .query(&params)
            .send()
            .await
            .map_err(|err| ServiceError::Transient(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status, body));
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|err| ServiceError::Internal(err.to_string()))?;
        Self::parse_card(&body).ok_or_else(|| ServiceError::Internal("malformed card payload".into()))
    }

    async fn add_comment(&self, card_id: &str, text: &str) -> ServiceResult<()> {
        let mut params = self.auth().to_vec();
        params.push(("text", text));
        let response = self
            .client
            .post(format!("{}/cards/{}/actions/comments", self.base_url, card_id))
            .query(&params)
            .send()
            .await
            .map_err(|err| ServiceError::Transient(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status, body));
        }
        Ok(())
    }

    async fn archive_card(&self, card_id: &str, archived: bool) -> ServiceResult<Card> {
        let archived_str = archived.to_string();
        let mut params = self.auth().to_vec();
        params.push(("closed", archived_str.as_str()));
        let response = self
            .client
            .put(format!("{}/cards/{}", self.base_url, card_id))
            .query(&params)
            .send()
            .await
            .map_err(|err| ServiceError::Transient(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status, body));
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|err| ServiceError::Internal(err.to_string()))?;
        Self::parse_card(&body).ok_or_else(|| ServiceError::Internal("malformed card payload".into()))
    }
}
