//! Mail-send tool. Destructive/outbound by nature, so it never fires on the
//! first call: the first invocation always returns `confirmation_required`
//! carrying its own resolved payload; the replaying caller passes
//! `confirm: true` to actually send (§4.5.4).

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Value, json};

use orchestrator_services::mail::MailService;

use crate::{Tool, ToolEnvelope, ToolParam, ToolSpec};

pub struct MailSendTool {
    mail: Arc<dyn MailService>,
}

impl MailSendTool {
    pub fn new(mail: Arc<dyn MailService>) -> Self {
        Self { mail }
    }
}

fn string_field<'a>(args: &'a Value, field: &str) -> Option<&'a str> {
    args.get(field).and_then(|v| v.as_str())
}

fn cc_field(args: &Value) -> Vec<String> {
    args.get("cc")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).map(str::to_string).collect())
        .unwrap_or_default()
}

#[async_trait]
impl Tool for MailSendTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "mail_send".to_string(),
            description: "Send an email on the user's behalf.".to_string(),
            params: vec![
                ToolParam::required("to", "recipient email address"),
                ToolParam::optional("cc", "additional recipients"),
                ToolParam::required("subject", "email subject line"),
                ToolParam::required("body", "plain-text email body"),
            ],
        }
    }

    async fn run(&self, args: Value) -> Result<ToolEnvelope> {
        let confirmed = args.get("confirm").and_then(|v| v.as_bool()).unwrap_or(false);
        if !confirmed {
            return Ok(ToolEnvelope::ConfirmationRequired { data: args });
        }

        let to = string_field(&args, "to").context("mail_send missing to")?;
        let subject = string_field(&args, "subject").context("mail_send missing subject")?;
        let body = string_field(&args, "body").context("mail_send missing body")?;
        let cc = cc_field(&args);

        let message_id = self.mail.send_message(to, &cc, subject, body).await?;
        Ok(ToolEnvelope::ok(json!({ "message_id": message_id, "to": to, "subject": subject })))
    }
}
