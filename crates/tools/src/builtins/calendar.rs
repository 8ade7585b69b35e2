//! Calendar tools. Creation and modification execute directly; cancellation
//! mirrors the confirmation-first shape of §4.5.5 for the cases a plain tool
//! call can resolve on its own (a single already-identified event). Full
//! disambiguation across multiple candidate events is a multi-turn
//! procedure owned by the calendar-cancel flow handler, not this tool.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use orchestrator_services::calendar::{CalendarService, EventPatch, NewEvent};

use crate::{Tool, ToolEnvelope, ToolParam, ToolSpec};

fn string_field<'a>(args: &'a Value, field: &str) -> Option<&'a str> {
    args.get(field).and_then(|v| v.as_str())
}

fn bool_field(args: &Value, field: &str, default: bool) -> bool {
    args.get(field).and_then(|v| v.as_bool()).unwrap_or(default)
}

fn datetime_field(args: &Value, field: &str) -> Option<DateTime<Utc>> {
    string_field(args, field).and_then(|s| DateTime::parse_from_rfc3339(s).ok()).map(|dt| dt.with_timezone(&Utc))
}

fn event_json(event: &orchestrator_services::calendar::CalendarEvent) -> Value {
    json!({
        "event_id": event.id,
        "title": event.title,
        "start": event.start.to_rfc3339(),
        "end": event.end.to_rfc3339(),
        "status": event.status,
    })
}

pub struct CalendarCreateTool {
    calendar: Arc<dyn CalendarService>,
}

impl CalendarCreateTool {
    pub fn new(calendar: Arc<dyn CalendarService>) -> Self {
        Self { calendar }
    }
}

#[async_trait]
impl Tool for CalendarCreateTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "calendar_create".to_string(),
            description: "Create a calendar event.".to_string(),
            params: vec![
                ToolParam::required("title", "event title"),
                ToolParam::optional("description", "event description"),
                ToolParam::required("start", "RFC3339 start instant"),
                ToolParam::required("end", "RFC3339 end instant"),
                ToolParam::optional("with_conference_link", "attach a video-call link"),
            ],
        }
    }

    async fn run(&self, args: Value) -> Result<ToolEnvelope> {
        let title = string_field(&args, "title").context("calendar_create missing title")?;
        let start = datetime_field(&args, "start").context("calendar_create missing or unparseable start")?;
        let end = datetime_field(&args, "end").context("calendar_create missing or unparseable end")?;
        let new_event = NewEvent {
            title: title.to_string(),
            description: string_field(&args, "description").map(str::to_string),
            start: Some(start),
            end: Some(end),
            with_conference_link: bool_field(&args, "with_conference_link", false),
        };
        let event = self.calendar.create_event(&new_event, true).await?;
        Ok(ToolEnvelope::ok(event_json(&event)))
    }
}

pub struct CalendarModifyTool {
    calendar: Arc<dyn CalendarService>,
}

impl CalendarModifyTool {
    pub fn new(calendar: Arc<dyn CalendarService>) -> Self {
        Self { calendar }
    }
}

#[async_trait]
impl Tool for CalendarModifyTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "calendar_modify".to_string(),
            description: "Change the title, time, or description of an existing event.".to_string(),
            params: vec![
                ToolParam::required("event_id", "the event to change"),
                ToolParam::optional("title", "new title"),
                ToolParam::optional("description", "new description"),
                ToolParam::optional("start", "new RFC3339 start instant"),
                ToolParam::optional("end", "new RFC3339 end instant"),
            ],
        }
    }

    async fn run(&self, args: Value) -> Result<ToolEnvelope> {
        let event_id = string_field(&args, "event_id").context("calendar_modify missing event_id")?;
        let patch = EventPatch {
            title: string_field(&args, "title").map(str::to_string),
            description: string_field(&args, "description").map(str::to_string),
            start: datetime_field(&args, "start"),
            end: datetime_field(&args, "end"),
        };
        let notify = bool_field(&args, "notify_attendees", true);
        let event = self.calendar.patch_event(event_id, &patch, notify).await?;
        Ok(ToolEnvelope::ok(event_json(&event)))
    }
}

pub struct CalendarCancelTool {
    calendar: Arc<dyn CalendarService>,
}

impl CalendarCancelTool {
    pub fn new(calendar: Arc<dyn CalendarService>) -> Self {
        Self { calendar }
    }
}

#[async_trait]
impl Tool for CalendarCancelTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "calendar_cancel".to_string(),
            description: "Cancel a single already-identified calendar event.".to_string(),
            params: vec![
                ToolParam::required("event_id", "the event to cancel"),
                ToolParam::optional("scope", "\"occurrence\" or \"series\""),
            ],
        }
    }

    async fn run(&self, args: Value) -> Result<ToolEnvelope> {
        let event_id = string_field(&args, "event_id").context("calendar_cancel missing event_id")?;
        let series = string_field(&args, "scope") == Some("series");
        let confirmed = bool_field(&args, "confirm", false);
        if series && !confirmed {
            return Ok(ToolEnvelope::ConfirmationRequired { data: args });
        }
        self.calendar.delete_event(event_id, true).await?;
        Ok(ToolEnvelope::ok(json!({ "event_id": event_id, "cancelled": true })))
    }
}

pub struct CalendarNoteTool {
    calendar: Arc<dyn CalendarService>,
}

impl CalendarNoteTool {
    pub fn new(calendar: Arc<dyn CalendarService>) -> Self {
        Self { calendar }
    }
}

#[async_trait]
impl Tool for CalendarNoteTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "calendar_note".to_string(),
            description: "Append a note to an event's description.".to_string(),
            params: vec![
                ToolParam::required("event_id", "the event to annotate"),
                ToolParam::required("note", "text to append"),
            ],
        }
    }

    async fn run(&self, args: Value) -> Result<ToolEnvelope> {
        let event_id = string_field(&args, "event_id").context("calendar_note missing event_id")?;
        let note = string_field(&args, "note").context("calendar_note missing note")?;
        let existing = self.calendar.get_event(event_id).await?;
        let description = match existing.description {
            Some(current) if !current.is_empty() => format!("{current}\n{note}"),
            _ => note.to_string(),
        };
        let patch = EventPatch {
            description: Some(description),
            ..Default::default()
        };
        let event = self.calendar.patch_event(event_id, &patch, false).await?;
        Ok(ToolEnvelope::ok(event_json(&event)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_services::calendar::CalendarEvent;
    use orchestrator_services::error::ServiceResult;
    use std::sync::Mutex;

    struct FakeCalendar {
        events: Mutex<Vec<CalendarEvent>>,
    }

    fn event(id: &str) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            title: "Sync".to_string(),
            description: Some("agenda".to_string()),
            start: Utc::now(),
            end: Utc::now(),
            recurring_event_id: None,
            status: "confirmed".to_string(),
        }
    }

    #[async_trait]
    impl CalendarService for FakeCalendar {
        async fn list_events(&self, _min: DateTime<Utc>, _max: DateTime<Utc>, _q: Option<&str>) -> ServiceResult<Vec<CalendarEvent>> {
            Ok(self.events.lock().unwrap().clone())
        }
        async fn get_event(&self, event_id: &str) -> ServiceResult<CalendarEvent> {
            Ok(self.events.lock().unwrap().iter().find(|e| e.id == event_id).cloned().unwrap_or_else(|| event(event_id)))
        }
        async fn patch_event(&self, event_id: &str, patch: &EventPatch, _notify: bool) -> ServiceResult<CalendarEvent> {
            let mut e = event(event_id);
            if let Some(desc) = &patch.description {
                e.description = Some(desc.clone());
            }
            Ok(e)
        }
        async fn delete_event(&self, _event_id: &str, _notify: bool) -> ServiceResult<()> {
            Ok(())
        }
        async fn create_event(&self, new_event: &NewEvent, _notify: bool) -> ServiceResult<CalendarEvent> {
            let mut e = event("new1");
            e.title = new_event.title.clone();
            Ok(e)
        }
    }

    #[tokio::test]
    async fn cancel_single_occurrence_executes_without_confirmation() {
        let tool = CalendarCancelTool::new(Arc::new(FakeCalendar { events: Mutex::new(vec![]) }));
        let result = tool.run(json!({ "event_id": "e1" })).await.unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn cancel_series_requires_confirmation_first() {
        let tool = CalendarCancelTool::new(Arc::new(FakeCalendar { events: Mutex::new(vec![]) }));
        let result = tool.run(json!({ "event_id": "e1", "scope": "series" })).await.unwrap();
        assert!(matches!(result, ToolEnvelope::ConfirmationRequired { .. }));
    }

    #[tokio::test]
    async fn note_appends_to_existing_description() {
        let tool = CalendarNoteTool::new(Arc::new(FakeCalendar { events: Mutex::new(vec![event("e1")]) }));
        let result = tool.run(json!({ "event_id": "e1", "note": "bring laptop" })).await.unwrap();
        match result {
            ToolEnvelope::Ok { data } => assert_eq!(data["event_id"], "e1"),
            other => panic!("expected ok, got {other:?}"),
        }
    }
}
