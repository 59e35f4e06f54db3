// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Email delivery abstraction.
//!
//! Handlers and the activation sweeper never send mail inline: they hand a
//! [`Mailer`] call to [`crate::background::BackgroundTasks`]. The default
//! sender is [`LogMailer`], which logs the message and succeeds.

use serde_json::Value;
use tracing::info;

/// Template sent after registration and by the activation sweeper.
pub const USER_WELCOME_TEMPLATE: &str = "user_welcome";

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("unknown template: {0}")]
    UnknownTemplate(String),

    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Email delivery.
///
/// `send` may block; callers run it on the blocking pool.
pub trait Mailer: Send + Sync {
    /// Render `template` with `data` and deliver it to `to`.
    fn send(&self, to: &str, template: &str, data: &Value) -> Result<(), MailError>;
}

/// Sender that logs the payload instead of delivering it. Token fields are
/// redacted.
#[derive(Debug, Clone)]
pub struct LogMailer {
    sender: String,
}

impl LogMailer {
    pub fn new(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
        }
    }
}

impl Mailer for LogMailer {
    fn send(&self, to: &str, template: &str, data: &Value) -> Result<(), MailError> {
        if template != USER_WELCOME_TEMPLATE {
            return Err(MailError::UnknownTemplate(template.to_string()));
        }
        info!(
            from = %self.sender,
            to_email = %to,
            template = %template,
            payload = %redact_secrets(data),
            "email send stub"
        );
        Ok(())
    }
}

/// Copy of `data` with every `*token` field replaced, so bearer secrets
/// never reach the logs.
fn redact_secrets(data: &Value) -> Value {
    match data {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| {
                    let value = if key.to_ascii_lowercase().ends_with("token") {
                        Value::String("[redacted]".to_string())
                    } else {
                        redact_secrets(value)
                    };
                    (key.clone(), value)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_secrets).collect()),
        other => other.clone(),
    }
}
