//! Heartbeat Monitor - dead man's switch 服务
//!
//! 客户端注册带超时的 monitor，并在超时前 tick；
//! 超时未 tick 时通过 Pushover 或 Webhook 通知一次。

pub mod config;
pub mod error;
pub mod manager;
pub mod monitor;
pub mod notification;
pub mod rpc;
pub mod store;
pub mod validate;

pub use config::HeartbeatConfig;
pub use error::{ManagerError, ManagerResult};
pub use manager::{LoadSummary, ManagerStats, MonitorManager, TimerRegistry};
pub use monitor::{Monitor, MonitorId, MonitorPatch, NewMonitor, Notification, NotificationSpec, Scheme};
pub use notification::{
    ExpiryPayload, NotificationBuilder, NotificationChannel, NotificationDispatcher, SendResult,
};
pub use rpc::{RpcError, RpcRequest, RpcResponse, RpcServer};
pub use store::{JsonFileStore, MemoryStore, MonitorStore};
pub use validate::ValidationError;
