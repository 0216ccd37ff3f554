//! 通知系统构建器 - 按配置注册所有渠道

use super::channels::{PushoverChannel, WebhookChannel};
use super::dispatcher::NotificationDispatcher;
use crate::config::{HeartbeatConfig, DEFAULT_HTTP_TIMEOUT_SECS, PUSHOVER_API_URL};
use crate::monitor::Scheme;
use anyhow::{Context, Result};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// 通知系统构建器
pub struct NotificationBuilder {
    pushover_api_url: String,
    http_timeout_secs: u64,
    dry_run: bool,
}

impl NotificationBuilder {
    pub fn new() -> Self {
        Self {
            pushover_api_url: PUSHOVER_API_URL.to_string(),
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            dry_run: false,
        }
    }

    pub fn from_config(config: &HeartbeatConfig) -> Self {
        Self::new()
            .pushover_api_url(config.pushover_api_url.clone())
            .http_timeout_secs(config.http_timeout_secs)
            .dry_run(config.dry_run)
    }

    /// 设置 Pushover API 地址
    pub fn pushover_api_url(mut self, url: impl Into<String>) -> Self {
        self.pushover_api_url = url.into();
        self
    }

    /// 设置 HTTP 超时（秒）
    pub fn http_timeout_secs(mut self, secs: u64) -> Self {
        self.http_timeout_secs = secs;
        self
    }

    /// 设置 dry-run 模式
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// 构建 NotificationDispatcher（每个 scheme 一个渠道，共享 HTTP 客户端）
    pub fn build(self) -> Result<NotificationDispatcher> {
        let client = Client::builder()
            .timeout(Duration::from_secs(self.http_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        let mut dispatcher = NotificationDispatcher::new().with_dry_run(self.dry_run);

        for scheme in Scheme::ALL {
            match scheme {
                Scheme::Pushover => dispatcher.register_channel(
                    scheme,
                    Arc::new(PushoverChannel::new(client.clone(), self.pushover_api_url.clone())),
                ),
                Scheme::Webhook => {
                    dispatcher.register_channel(scheme, Arc::new(WebhookChannel::new(client.clone())))
                }
            }
        }

        if self.dry_run {
            info!("Notification dispatcher running in dry-run mode");
        }

        Ok(dispatcher)
    }
}

impl Default for NotificationBuilder {
    fn default() -> Self {
        Self::new()
    }
}
