//! 通知分发器 - 按 scheme 查表找到渠道并投递
//!
//! 投递是 best-effort：失败只记日志，不重试，也不会回滚 monitor 状态。

use super::channel::{ExpiryPayload, NotificationChannel, SendResult};
use crate::monitor::{Notification, Scheme};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// 通知分发器
pub struct NotificationDispatcher {
    /// 分发表：scheme -> 渠道
    channels: HashMap<Scheme, Arc<dyn NotificationChannel>>,
    /// 是否为 dry-run 模式
    dry_run: bool,
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
            dry_run: false,
        }
    }

    /// 设置 dry-run 模式
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// 注册渠道（同一 scheme 重复注册时覆盖）
    pub fn register_channel(&mut self, scheme: Scheme, channel: Arc<dyn NotificationChannel>) {
        info!(scheme = %scheme, channel = channel.name(), "Registering notification channel");
        self.channels.insert(scheme, channel);
    }

    /// 投递并等待结果；永不返回错误
    pub async fn send(&self, notification: &Notification, payload: &ExpiryPayload) -> SendResult {
        let scheme = notification.scheme();

        let Some(channel) = self.channels.get(&scheme) else {
            warn!(scheme = %scheme, monitor_id = %payload.id, "No channel registered for scheme");
            return SendResult::Skipped(format!("no channel for {}", scheme));
        };

        if self.dry_run {
            info!(
                channel = channel.name(),
                monitor_id = %payload.id,
                message = %payload.message(),
                "[DRY-RUN] Would send notification"
            );
            return SendResult::Skipped("dry-run".to_string());
        }

        let result = match channel.send(notification, payload).await {
            Ok(result) => result,
            Err(e) => {
                warn!(channel = channel.name(), monitor_id = %payload.id, error = %e, "Channel send failed");
                SendResult::Failed(e.to_string())
            }
        };

        match &result {
            SendResult::Sent => {
                info!(channel = channel.name(), monitor_id = %payload.id, "Notification sent")
            }
            SendResult::Skipped(reason) => {
                info!(channel = channel.name(), monitor_id = %payload.id, reason = %reason, "Notification skipped")
            }
            SendResult::Failed(reason) => {
                warn!(channel = channel.name(), monitor_id = %payload.id, reason = %reason, "Notification failed")
            }
        }

        result
    }

    /// 后台投递（spawn 后立即返回）；调用方可以丢弃 handle
    pub fn notify(
        self: &Arc<Self>,
        notification: Notification,
        payload: ExpiryPayload,
    ) -> JoinHandle<SendResult> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move { dispatcher.send(&notification, &payload).await })
    }

    /// 已注册的渠道数量
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn has_channel(&self, scheme: Scheme) -> bool {
        self.channels.contains_key(&scheme)
    }
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::MonitorId;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 测试用的 mock 渠道
    struct MockChannel {
        name: String,
        send_count: AtomicUsize,
        fail: bool,
    }

    impl MockChannel {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                send_count: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing(name: &str) -> Self {
            Self {
                fail: true,
                ..Self::new(name)
            }
        }

        fn get_send_count(&self) -> usize {
            self.send_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NotificationChannel for MockChannel {
        fn name(&self) -> &str {
            &self.name
        }

        async fn send(&self, _target: &Notification, _payload: &ExpiryPayload) -> Result<SendResult> {
            self.send_count.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("connection refused");
            }
            Ok(SendResult::Sent)
        }
    }

    fn webhook() -> Notification {
        Notification::Webhook {
            url: "https://example.com/hook".to_string(),
        }
    }

    fn payload() -> ExpiryPayload {
        ExpiryPayload {
            id: MonitorId::from("m-1"),
            name: "db-backup".to_string(),
        }
    }

    #[tokio::test]
    async fn test_dispatch_by_scheme() {
        let mut dispatcher = NotificationDispatcher::new();
        let webhook_channel = Arc::new(MockChannel::new("webhook"));
        let pushover_channel = Arc::new(MockChannel::new("pushover"));
        dispatcher.register_channel(Scheme::Webhook, webhook_channel.clone());
        dispatcher.register_channel(Scheme::Pushover, pushover_channel.clone());
        assert_eq!(dispatcher.channel_count(), 2);

        let result = dispatcher.send(&webhook(), &payload()).await;

        assert_eq!(result, SendResult::Sent);
        assert_eq!(webhook_channel.get_send_count(), 1);
        assert_eq!(pushover_channel.get_send_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_channel_is_skipped() {
        let dispatcher = NotificationDispatcher::new();
        let result = dispatcher.send(&webhook(), &payload()).await;
        assert!(matches!(result, SendResult::Skipped(_)));
    }

    #[tokio::test]
    async fn test_dry_run() {
        let mut dispatcher = NotificationDispatcher::new().with_dry_run(true);
        let channel = Arc::new(MockChannel::new("webhook"));
        dispatcher.register_channel(Scheme::Webhook, channel.clone());

        let result = dispatcher.send(&webhook(), &payload()).await;

        assert_eq!(result, SendResult::Skipped("dry-run".to_string()));
        assert_eq!(channel.get_send_count(), 0); // 不应该实际发送
    }

    #[tokio::test]
    async fn test_channel_error_becomes_failed_once() {
        let mut dispatcher = NotificationDispatcher::new();
        let channel = Arc::new(MockChannel::failing("webhook"));
        dispatcher.register_channel(Scheme::Webhook, channel.clone());
        let dispatcher = Arc::new(dispatcher);

        let result = dispatcher.notify(webhook(), payload()).await.unwrap();

        assert_eq!(result, SendResult::Failed("connection refused".to_string()));
        assert_eq!(channel.get_send_count(), 1); // 不重试
    }
}
