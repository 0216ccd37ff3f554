//! 输入校验 - 在调用 MonitorManager 之前把外部参数转成合法的类型

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::monitor::{MonitorId, MonitorPatch, Notification, NotificationSpec};

/// 校验失败（消息直接返回给调用方）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("`{0}` is required")]
    Required(String),
    #[error("`id` is invalid")]
    InvalidId,
    #[error("`name` must be not empty")]
    EmptyName,
    #[error("`timeout` must be a positive integer")]
    InvalidTimeout,
    #[error("`notification.scheme` is not supported")]
    UnsupportedScheme,
    #[error("`notification.url` must be a URL")]
    InvalidUrl,
}

/// 创建请求（原始参数）
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateParams {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub timeout: Option<Value>,
    #[serde(default)]
    pub notification: Option<NotificationSpec>,
}

/// 更新请求（原始参数）
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateParams {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub timeout: Option<Value>,
    #[serde(default)]
    pub notification: Option<NotificationSpec>,
}

/// 校验通过的创建请求
#[derive(Debug, Clone, PartialEq)]
pub struct CreateRequest {
    pub name: String,
    pub timeout: u64,
    pub notification: Notification,
}

pub fn validate_id(id: &str) -> Result<MonitorId, ValidationError> {
    uuid::Uuid::parse_str(id)
        .map(|uuid| MonitorId::from(uuid.to_string()))
        .map_err(|_| ValidationError::InvalidId)
}

pub fn validate_name(name: &str) -> Result<String, ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(name.to_string())
}

/// 接受正整数或正整数字符串（如 `"60"`）
pub fn validate_timeout(timeout: &Value) -> Result<u64, ValidationError> {
    let parsed = match timeout {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };

    match parsed {
        Some(secs) if secs > 0 => Ok(secs),
        _ => Err(ValidationError::InvalidTimeout),
    }
}

pub fn validate_notification(spec: &NotificationSpec) -> Result<Notification, ValidationError> {
    Notification::from_spec(spec)
}

/// 校验创建参数；未提供 timeout 时使用 `default_timeout`
pub fn validate_create(
    params: &CreateParams,
    default_timeout: u64,
) -> Result<CreateRequest, ValidationError> {
    let name = params
        .name
        .as_deref()
        .ok_or_else(|| ValidationError::Required("name".to_string()))
        .and_then(validate_name)?;

    let timeout = match &params.timeout {
        Some(timeout) => validate_timeout(timeout)?,
        None => default_timeout,
    };

    let notification = params
        .notification
        .as_ref()
        .ok_or_else(|| ValidationError::Required("notification".to_string()))
        .and_then(validate_notification)?;

    Ok(CreateRequest {
        name,
        timeout,
        notification,
    })
}

/// 校验更新参数，返回目标 ID 与只含已提供字段的 patch
pub fn validate_update(params: &UpdateParams) -> Result<(MonitorId, MonitorPatch), ValidationError> {
    let id = params
        .id
        .as_deref()
        .ok_or_else(|| ValidationError::Required("id".to_string()))
        .and_then(validate_id)?;

    let patch = MonitorPatch {
        name: params.name.as_deref().map(validate_name).transpose()?,
        timeout: params.timeout.as_ref().map(validate_timeout).transpose()?,
        notification: params
            .notification
            .as_ref()
            .map(validate_notification)
            .transpose()?,
    };

    Ok((id, patch))
}
