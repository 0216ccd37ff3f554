//! 通知目标变体与构造
//!
//! `Notification` 是封闭的 tagged enum；`Scheme` 是分发表的 key。
//! 新增一种通知方式 = 新增一个变体 + 分发表里的一个渠道。

use serde::{Deserialize, Serialize};

use crate::validate::ValidationError;

/// 通知方式标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Pushover,
    Webhook,
}

impl Scheme {
    pub const ALL: [Scheme; 2] = [Scheme::Pushover, Scheme::Webhook];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Pushover => "pushover",
            Scheme::Webhook => "webhook",
        }
    }
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Scheme {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pushover" => Ok(Scheme::Pushover),
            "webhook" => Ok(Scheme::Webhook),
            _ => Err(ValidationError::UnsupportedScheme),
        }
    }
}

/// 通知目标
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "lowercase")]
pub enum Notification {
    /// Pushover 推送
    Pushover { user: String, token: String },
    /// Webhook 回调（GET，带 id / name 参数）
    Webhook { url: String },
}

impl Notification {
    pub fn scheme(&self) -> Scheme {
        match self {
            Notification::Pushover { .. } => Scheme::Pushover,
            Notification::Webhook { .. } => Scheme::Webhook,
        }
    }

    /// 从未校验的 NotificationSpec 构造变体（scheme 不区分大小写，字段去掉首尾空白）
    pub fn from_spec(spec: &NotificationSpec) -> Result<Self, ValidationError> {
        let scheme: Scheme = spec.scheme.as_deref().unwrap_or_default().parse()?;

        match scheme {
            Scheme::Pushover => {
                let user = required_field(spec.user.as_deref(), "notification.user")?;
                let token = required_field(spec.token.as_deref(), "notification.token")?;
                Ok(Notification::Pushover { user, token })
            }
            Scheme::Webhook => {
                let url = required_field(spec.url.as_deref(), "notification.url")?;
                if !is_http_url(&url) {
                    return Err(ValidationError::InvalidUrl);
                }
                Ok(Notification::Webhook { url })
            }
        }
    }
}

/// 外部传入的通知配置（未校验）：scheme 标签 + 字段集合
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSpec {
    #[serde(default)]
    pub scheme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl NotificationSpec {
    pub fn pushover(user: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            scheme: Some(Scheme::Pushover.as_str().to_string()),
            user: Some(user.into()),
            token: Some(token.into()),
            url: None,
        }
    }

    pub fn webhook(url: impl Into<String>) -> Self {
        Self {
            scheme: Some(Scheme::Webhook.as_str().to_string()),
            url: Some(url.into()),
            ..Default::default()
        }
    }
}

fn required_field(value: Option<&str>, field: &'static str) -> Result<String, ValidationError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ValidationError::Required(field.to_string())),
    }
}

fn is_http_url(url: &str) -> bool {
    match reqwest::Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some(),
        Err(_) => false,
    }
}
