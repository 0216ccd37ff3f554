//! Pushover 渠道
//!
//! POST `{user, token, message}` 到 Pushover messages API。

use crate::monitor::Notification;
use crate::notification::channel::{ExpiryPayload, NotificationChannel, SendResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

/// Pushover 请求体
#[derive(Debug, Serialize)]
struct PushoverMessage<'a> {
    user: &'a str,
    token: &'a str,
    message: String,
}

pub struct PushoverChannel {
    client: Client,
    api_url: String,
}

impl PushoverChannel {
    pub fn new(client: Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
        }
    }
}

#[async_trait]
impl NotificationChannel for PushoverChannel {
    fn name(&self) -> &str {
        "pushover"
    }

    async fn send(&self, target: &Notification, payload: &ExpiryPayload) -> Result<SendResult> {
        let Notification::Pushover { user, token } = target else {
            return Ok(SendResult::Skipped("not a pushover target".to_string()));
        };

        let body = PushoverMessage {
            user,
            token,
            message: payload.message(),
        };

        debug!(monitor_id = %payload.id, url = %self.api_url, "Posting pushover message");

        let response = self
            .client
            .post(&self.api_url)
            .json(&body)
            .send()
            .await
            .context("Pushover request failed")?;

        let status = response.status();
        if status.is_success() {
            Ok(SendResult::Sent)
        } else {
            Ok(SendResult::Failed(format!("pushover responded with {}", status)))
        }
    }
}
