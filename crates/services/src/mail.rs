//! Mail service contract (§6) and a concrete Gmail-flavored REST client.
//!
//! Every method here maps to exactly one upstream HTTP request; the bulk
//! pipeline and flow handlers depend on that being true to hold their
//! one-call-per-turn budgets.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{ServiceError, ServiceResult};
use crate::oauth::{send_with_retry, OAuthTokenSource};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MessageListPage {
    pub message_ids: Vec<String>,
    pub next_page_token: Option<String>,
    pub result_size_estimate: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelId {
    pub id: String,
    pub name: String,
}

#[async_trait]
pub trait MailService: Send + Sync {
    async fn list_message_ids_page(
        &self,
        query: &str,
        max_results: u32,
        page_token: Option<&str>,
    ) -> ServiceResult<MessageListPage>;

    async fn batch_modify_labels(
        &self,
        ids: &[String],
        add: &[String],
        remove: &[String],
    ) -> ServiceResult<()>;

    async fn batch_delete_messages(&self, ids: &[String]) -> ServiceResult<()>;

    async fn get_message_headers(&self, id: &str) -> ServiceResult<HashMap<String, String>>;

    async fn resolve_label_id(&self, name: &str) -> ServiceResult<LabelId>;

    /// Send a message. Not part of the bulk pipeline's one-request budget;
    /// this is the adapter the mail-send-confirmation flow replays.
    async fn send_message(
        &self,
        to: &str,
        cc: &[String],
        subject: &str,
        body: &str,
    ) -> ServiceResult<String>;
}

/// Gmail REST v1 client. One HTTP request per trait method, per contract.
pub struct GmailService {
    client: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn OAuthTokenSource>,
}

impl GmailService {
    pub fn new(tokens: Arc<dyn OAuthTokenSource>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: "https://gmail.googleapis.com/gmail/v1/users/me".to_string(),
            tokens,
        }
    }

    #[cfg(test)]
    pub fn with_base_url(tokens: Arc<dyn OAuthTokenSource>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            tokens,
        }
    }
}

#[async_trait]
impl MailService for GmailService {
    async fn list_message_ids_page(
        &self,
        query: &str,
        max_results: u32,
        page_token: Option<&str>,
    ) -> ServiceResult<MessageListPage> {
        let max_results_str = max_results.to_string();
        let response = send_with_retry(self.tokens.as_ref(), |token| {
            let mut request = self
                .client
                .get(format!("{}/messages", self.base_url))
                .bearer_auth(token)
                .query(&[("q", query), ("maxResults", &max_results_str)]);
            if let Some(page_token) = page_token {
                request = request.query(&[("pageToken", page_token)]);
            }
            request
        })
        .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status, body));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|err| ServiceError::Internal(err.to_string()))?;
        let message_ids = body
            .get("messages")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m.get("id").and_then(|id| id.as_str()).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Ok(MessageListPage {
            message_ids,
            next_page_token: body
                .get("nextPageToken")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            result_size_estimate: body.get("resultSizeEstimate").and_then(|v| v.as_u64()),
        })
    }

    async fn batch_modify_labels(
        &self,
        ids: &[String],
        add: &[String],
        remove: &[String],
    ) -> ServiceResult<()> {
        let response = send_with_retry(self.tokens.as_ref(), |token| {
            self.client
                .post(format!("{}/messages/batchModify", self.base_url))
                .bearer_auth(token)
                .json(&json!({
                    "ids": ids,
                    "addLabelIds": add,
                    "removeLabelIds": remove,
                }))
        })
        .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status, body));
        }
        Ok(())
    }

    async fn batch_delete_messages(&self, ids: &[String]) -> ServiceResult<()> {
        let response = send_with_retry(self.tokens.as_ref(), |token| {
            self.client
                .post(format!("{}/messages/batchDelete", self.base_url))
                .bearer_auth(token)
                .json(&json!({ "ids": ids }))
        })
        .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status, body));
        }
        Ok(())
    }

    async fn get_message_headers(&self, id: &str) -> ServiceResult<HashMap<String, String>> {
        let response = send_with_retry(self.tokens.as_ref(), |token| {
            self.client
                .get(format!("{}/messages/{id}", self.base_url))
                .bearer_auth(token)
                .query(&[("format", "metadata")])
        })
        .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status, body));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|err| ServiceError::Internal(err.to_string()))?;
        let headers = body
            .get("payload")
            .and_then(|p| p.get("headers"))
            .and_then(|h| h.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|h| {
                        let name = h.get("name")?.as_str()?.to_string();
                        let value = h.get("value")?.as_str()?.to_string();
                        Some((name, value))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(headers)
    }

    async fn resolve_label_id(&self, name: &str) -> ServiceResult<LabelId> {
        let response = send_with_retry(self.tokens.as_ref(), |token| {
            self.client
                .get(format!("{}/labels", self.base_url))
                .bearer_auth(token)
        })
        .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status, body));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|err| ServiceError::Internal(err.to_string()))?;
        body.get("labels")
            .and_then(|v| v.as_array())
            .and_then(|labels| {
                labels.iter().find(|label| {
                    label
                        .get("name")
                        .and_then(|n| n.as_str())
                        .map(|n| n.eq_ignore_ascii_case(name))
                        .unwrap_or(false)
                })
            })
            .and_then(|label| {
                Some(LabelId {
                    id: label.get("id")?.as_str()?.to_string(),
                    name: label.get("name")?.as_str()?.to_string(),
                })
            })
            .ok_or_else(|| ServiceError::UpstreamRejected(format!("no label named {name}")))
    }

    async fn send_message(
        &self,
        to: &str,
        cc: &[String],
        subject: &str,
        body: &str,
    ) -> ServiceResult<String> {
        let mut raw = format!("To: {to}\r\n");
        if !cc.is_empty() {
            raw.push_str(&format!("Cc: {}\r\n", cc.join(", ")));
        }
        raw.push_str(&format!("Subject: {subject}\r\n"));
        raw.push_str("Content-Type: text/plain; charset=\"UTF-8\"\r\n\r\n");
        raw.push_str(body);

        let encoded = base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, raw.as_bytes());

        let response = send_with_retry(self.tokens.as_ref(), |token| {
            self.client
                .post(format!("{}/messages/send", self.base_url))
                .bearer_auth(token)
                .json(&json!({ "raw": &encoded }))
        })
        .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status, body));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|err| ServiceError::Internal(err.to_string()))?;
        body.get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| ServiceError::Internal("send response missing id".into()))
    }
}
