//! Chat-bot alerts.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use ureq::Agent;

use crate::error::NotifyError;

/// Delivers a plain-text alert.
pub trait Notifier: Send + Sync {
    fn notify(&self, text: &str, at_all: bool) -> Result<(), NotifyError>;
}

impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    fn notify(&self, text: &str, at_all: bool) -> Result<(), NotifyError> {
        (**self).notify(text, at_all)
    }
}

/// DingTalk robot webhook.
#[derive(Debug, Clone)]
pub struct DingTalkNotifier {
    webhook: String,
    agent: Agent,
}

#[derive(Debug, Deserialize)]
struct RobotReply {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

impl DingTalkNotifier {
    pub fn new(webhook: impl Into<String>) -> Self {
        Self {
            webhook: webhook.into(),
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(10))
                .build(),
        }
    }
}

/// `{"msgtype":"text","text":{"content":…},"at":{"isAtAll":…}}`
pub fn text_message(text: &str, at_all: bool) -> serde_json::Value {
    json!({
        "msgtype": "text",
        "text": { "content": text },
        "at": { "isAtAll": at_all },
    })
}

impl Notifier for DingTalkNotifier {
    fn notify(&self, text: &str, at_all: bool) -> Result<(), NotifyError> {
        let response = self
            .agent
            .post(&self.webhook)
            .send_json(text_message(text, at_all))
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => NotifyError::Status(code),
                ureq::Error::Transport(t) => NotifyError::Unreachable(t.to_string()),
            })?;
        let reply: RobotReply = response
            .into_json()
            .map_err(|e| NotifyError::Unreachable(e.to_string()))?;
        if reply.errcode != 0 {
            return Err(NotifyError::Rejected {
                code: reply.errcode,
                message: reply.errmsg,
            });
        }
        tracing::info!("alert delivered");
        Ok(())
    }
}

/// Writes alerts to the log when no webhook is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, text: &str, at_all: bool) -> Result<(), NotifyError> {
        tracing::warn!(at_all, "alert: {text}");
        Ok(())
    }
}
