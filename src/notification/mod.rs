//! 通知抽象层 - 到期后向 monitor 的通知目标投递一次
//!
//! # 设计
//! 1. 统一接口：所有渠道实现 `NotificationChannel` trait
//! 2. 分发表：`NotificationDispatcher` 按 `Scheme` 查找渠道
//! 3. 异步发送：`notify` spawn 后立即返回，调用方不等待结果
//!
//! # 使用示例
//! ```ignore
//! use heartbeat_monitor::notification::NotificationBuilder;
//!
//! let dispatcher = Arc::new(NotificationBuilder::new().dry_run(true).build()?);
//! dispatcher.notify(monitor.notification.clone(), ExpiryPayload::from_monitor(&monitor));
//! ```

pub mod builder;
pub mod channel;
pub mod channels;
pub mod dispatcher;

pub use builder::NotificationBuilder;
pub use channel::{ExpiryPayload, NotificationChannel, SendResult};
pub use dispatcher::NotificationDispatcher;
