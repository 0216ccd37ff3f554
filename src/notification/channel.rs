//! 通知渠道 trait 定义

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::monitor::{Monitor, MonitorId, Notification};

/// 到期通知的内容（来自 monitor 的 ID 与名称）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryPayload {
    pub id: MonitorId,
    pub name: String,
}

impl ExpiryPayload {
    pub fn from_monitor(monitor: &Monitor) -> Self {
        Self {
            id: monitor.id.clone(),
            name: monitor.name.clone(),
        }
    }

    /// 人类可读的提示文本
    pub fn message(&self) -> String {
        format!("{} is not responding", self.name)
    }
}

/// 发送结果
#[derive(Debug, Clone, PartialEq)]
pub enum SendResult {
    /// 发送成功
    Sent,
    /// 跳过（dry-run、没有对应渠道等）
    Skipped(String),
    /// 发送失败
    Failed(String),
}

/// 通知渠道 trait
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// 渠道名称（用于日志）
    fn name(&self) -> &str;

    /// 向 `target` 投递一次，不重试
    async fn send(&self, target: &Notification, payload: &ExpiryPayload) -> Result<SendResult>;
}
