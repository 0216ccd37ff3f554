//! MonitorManager 错误类型
//!
//! 找不到 monitor 不是错误（返回 `Ok(None)`）；通知发送失败只记录日志，不会出现在这里。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManagerError {
    /// Record Store 读写失败，原样上抛，不做重试
    #[error("store error: {0}")]
    Store(anyhow::Error),

    /// Manager 自身簿记出错（例如同一 ID 注册了第二个定时器）
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl ManagerError {
    pub fn is_store(&self) -> bool {
        matches!(self, ManagerError::Store(_))
    }

    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, ManagerError::InvariantViolation(_))
    }
}

pub type ManagerResult<T> = std::result::Result<T, ManagerError>;
