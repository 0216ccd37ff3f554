//! Webhook 渠道
//!
//! 对配置的 URL 发起 GET，带 `id` 和 `name` 查询参数。

use crate::monitor::Notification;
use crate::notification::channel::{ExpiryPayload, NotificationChannel, SendResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

pub struct WebhookChannel {
    client: Client,
}

impl WebhookChannel {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, target: &Notification, payload: &ExpiryPayload) -> Result<SendResult> {
        let Notification::Webhook { url } = target else {
            return Ok(SendResult::Skipped("not a webhook target".to_string()));
        };

        debug!(monitor_id = %payload.id, url = %url, "Calling webhook");

        let response = self
            .client
            .get(url)
            .query(&[("id", payload.id.as_str()), ("name", payload.name.as_str())])
            .send()
            .await
            .with_context(|| format!("Webhook request to {} failed", url))?;

        let status = response.status();
        if status.is_success() {
            Ok(SendResult::Sent)
        } else {
            Ok(SendResult::Failed(format!("webhook responded with {}", status)))
        }
    }
}
