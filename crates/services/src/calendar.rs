//! Calendar service contract (§6): list/get/patch/delete events with
//! `sendUpdates=all`, plus conference-data creation on event create.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{ServiceError, ServiceResult};
use crate::oauth::{send_with_retry, OAuthTokenSource};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Set when this event is one occurrence of a recurring series.
    pub recurring_event_id: Option<String>,
    /// `"confirmed"`, `"cancelled"`, `"tentative"`.
    pub status: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewEvent {
    pub title: String,
    pub description: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub with_conference_link: bool,
}

#[derive(Debug, Clone, Default)]
pub struct EventPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait CalendarService: Send + Sync {
    async fn list_events(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
        query: Option<&str>,
    ) -> ServiceResult<Vec<CalendarEvent>>;

    async fn get_event(&self, event_id: &str) -> ServiceResult<CalendarEvent>;

    async fn patch_event(
        &self,
        event_id: &str,
        patch: &EventPatch,
        notify_attendees: bool,
    ) -> ServiceResult<CalendarEvent>;

    /// Idempotent: cancelling an already-cancelled event returns success
    /// with the same event id rather than an error.
    async fn delete_event(&self, event_id: &str, notify_attendees: bool) -> ServiceResult<()>;

    async fn create_event(
        &self,
        new_event: &NewEvent,
        notify_attendees: bool,
    ) -> ServiceResult<CalendarEvent>;
}

pub struct GoogleCalendarService {
    client: reqwest::Client,
    base_url: String,
    calendar_id: String,
    tokens: Arc<dyn OAuthTokenSource>,
}

impl GoogleCalendarService {
    pub fn new(tokens: Arc<dyn OAuthTokenSource>, calendar_id: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: "https://www.googleapis.com/calendar/v3".to_string(),
            calendar_id: calendar_id.into(),
            tokens,
        }
    }

    fn parse_event(raw: &serde_json::Value) -> Option<CalendarEvent> {
        let id = raw.get("id")?.as_str()?.to_string();
        let title = raw
            .get("summary")
            .and_then(|v| v.as_str())
            .unwrap_or("(untitled)")
            .to_string();
        let start = parse_event_time(raw.get("start")?)?;
        let end = parse_event_time(raw.get("end")?)?;
        Some(CalendarEvent {
            id,
            title,
            description: raw
                .get("description")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            start,
            end,
            recurring_event_id: raw
                .get("recurringEventId")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            status: raw
                .get("status")
                .and_then(|v| v.as_str())
                .unwrap_or("confirmed")
                .to_string(),
        })
    }
}

fn parse_event_time(node: &serde_json::Value) -> Option<DateTime<Utc>> {
    if let Some(date_time) = node.get("dateTime").and_then(|v| v.as_str()) {
        return DateTime::parse_from_rfc3339(date_time)
            .ok()
            .map(|dt| dt.with_timezone(&Utc));
    }
    let date = node.get("date").and_then(|v| v.as_str())?;
    let naive = chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    Some(DateTime::<Utc>::from_naive_utc_and_offset(
        naive.and_hms_opt(0, 0, 0)?,
        Utc,
    ))
}

#[async_trait]
impl CalendarService for GoogleCalendarService {
    async fn list_events(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
        query: Option<&str>,
    ) -> ServiceResult<Vec<CalendarEvent>> {
        let response = send_with_retry(self.tokens.as_ref(), |token| {
            let mut request = self
                .client
                .get(format!("{}/calendars/{}/events", self.base_url, self.calendar_id))
                .bearer_auth(token)
                .query(&[
                    ("timeMin", time_min.to_rfc3339()),
                    ("timeMax", time_max.to_rfc3339()),
                    ("singleEvents", "true".to_string()),
                ]);
            if let Some(query) = query {
                request = request.query(&[("q", query)]);
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
        Ok(body
            .get("items")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(Self::parse_event).collect())
            .unwrap_or_default())
    }

    async fn get_event(&self, event_id: &str) -> ServiceResult<CalendarEvent> {
        let response = send_with_retry(self.tokens.as_ref(), |token| {
            self.client
                .get(format!(
                    "{}/calendars/{}/events/{}",
                    self.base_url, self.calendar_id, event_id
                ))
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
        Self::parse_event(&body)
            .ok_or_else(|| ServiceError::Internal("malformed event payload".into()))
    }

    async fn patch_event(
        &self,
        event_id: &str,
        patch: &EventPatch,
        notify_attendees: bool,
    ) -> ServiceResult<CalendarEvent> {
        let mut body = json!({});
        if let Some(title) = &patch.title {
            body["summary"] = json!(title);
        }
        if let Some(description) = &patch.description {
            body["description"] = json!(description);
        }
        if let Some(start) = patch.start {
            body["start"] = json!({ "dateTime": start.to_rfc3339() });
        }
        if let Some(end) = patch.end {
            body["end"] = json!({ "dateTime": end.to_rfc3339() });
        }

        let send_updates = if notify_attendees { "all" } else { "none" };
        let response = send_with_retry(self.tokens.as_ref(), |token| {
            self.client
                .patch(format!(
                    "{}/calendars/{}/events/{}",
                    self.base_url, self.calendar_id, event_id
                ))
                .bearer_auth(token)
                .query(&[("sendUpdates", send_updates)])
                .json(&body)
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
        Self::parse_event(&body)
            .ok_or_else(|| ServiceError::Internal("malformed event payload".into()))
    }

    async fn delete_event(&self, event_id: &str, notify_attendees: bool) -> ServiceResult<()> {
        let send_updates = if notify_attendees { "all" } else { "none" };
        let response = send_with_retry(self.tokens.as_ref(), |token| {
            self.client
                .delete(format!(
                    "{}/calendars/{}/events/{}",
                    self.base_url, self.calendar_id, event_id
                ))
                .bearer_auth(token)
                .query(&[("sendUpdates", send_updates)])
        })
        .await?;

        // Deleting an already-cancelled/deleted event returns 410 Gone from
        // Google Calendar; the contract treats that as success (idempotent).
        if response.status().is_success() || response.status().as_u16() == 410 {
            return Ok(());
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(ServiceError::from_status(status, body))
    }

    async fn create_event(
        &self,
        new_event: &NewEvent,
        notify_attendees: bool,
    ) -> ServiceResult<CalendarEvent> {
        let mut body = json!({
            "summary": new_event.title,
            "start": { "dateTime": new_event.start.map(|t| t.to_rfc3339()) },
            "end": { "dateTime": new_event.end.map(|t| t.to_rfc3339()) },
        });
        if let Some(description) = &new_event.description {
            body["description"] = json!(description);
        }
        if new_event.with_conference_link {
            body["conferenceData"] = json!({
                "createRequest": { "requestId": uuid::Uuid::new_v4().to_string() }
            });
        }

        let send_updates = if notify_attendees { "all" } else { "none" };
        let response = send_with_retry(self.tokens.as_ref(), |token| {
            let mut request = self
                .client
                .post(format!("{}/calendars/{}/events", self.base_url, self.calendar_id))
                .bearer_auth(token)
                .query(&[("sendUpdates", send_updates)]);
            if new_event.with_conference_link {
                request = request.query(&[("conferenceDataVersion", "1")]);
            }
            request.json(&body)
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
        Self::parse_event(&body)
            .ok_or_else(|| ServiceError::Internal("malformed event payload".into()))
    }
}
