//! Monitor 数据模型
//!
//! 一个 monitor 带有超时时间；客户端需要在超时前 tick，
//! 否则到期时只通知一次。`due_at` 为空表示已解除（disarmed）。

pub mod notification;

pub use notification::{Notification, NotificationSpec, Scheme};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Monitor 唯一标识（由 Record Store 在创建时分配）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonitorId(String);

impl MonitorId {
    /// 生成新的随机 ID（UUID v4）
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MonitorId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for MonitorId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for MonitorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monitor 记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Monitor {
    pub id: MonitorId,
    pub name: String,
    /// 超时时间（秒）
    pub timeout: u64,
    /// 下次到期时间；None 表示已解除
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,
    pub notification: Notification,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Monitor {
    /// 是否处于 armed 状态
    pub fn is_armed(&self) -> bool {
        self.due_at.is_some()
    }

    /// `due_at` 是否已经过去（相对 `now`）
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        matches!(self.due_at, Some(due_at) if due_at <= now)
    }

    /// 以 `now` 为起点重新计算到期时间
    pub fn rearm(&mut self, now: DateTime<Utc>) {
        self.due_at = Some(due_after(now, self.timeout));
    }

    pub fn disarm(&mut self) {
        self.due_at = None;
    }

    /// 应用部分更新；不触碰 `due_at`
    pub fn apply(&mut self, patch: MonitorPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(timeout) = patch.timeout {
            self.timeout = timeout;
        }
        if let Some(notification) = patch.notification {
            self.notification = notification;
        }
    }
}

/// 创建 monitor 时写入 store 的字段（ID 和时间戳由 store 填充）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMonitor {
    pub name: String,
    pub timeout: u64,
    pub due_at: Option<DateTime<Utc>>,
    pub notification: Notification,
}

/// 部分更新字段
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification: Option<Notification>,
}

impl MonitorPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.timeout.is_none() && self.notification.is_none()
    }
}

/// `now + timeout` 秒；超出 chrono 表示范围时取最大值
pub fn due_after(now: DateTime<Utc>, timeout_secs: u64) -> DateTime<Utc> {
    let secs = i64::try_from(timeout_secs).unwrap_or(i64::MAX);
    Duration::try_seconds(secs)
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
