//! Monitor 持久化存储
//!
//! Manager 只依赖 `MonitorStore` trait；具体实现：
//! - `MemoryStore`：进程内存储（测试 / `serve --memory`）
//! - `JsonFileStore`：`monitors.json` + 文件锁

pub mod json_file;
pub mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

use anyhow::Result;
use async_trait::async_trait;

use crate::monitor::{Monitor, MonitorId, NewMonitor};

/// Monitor 记录存储
#[async_trait]
pub trait MonitorStore: Send + Sync {
    /// 所有 `due_at` 已设置的记录
    async fn find_armed(&self) -> Result<Vec<Monitor>>;

    async fn find_by_id(&self, id: &MonitorId) -> Result<Option<Monitor>>;

    /// 插入新记录，分配 ID 并填充时间戳
    async fn insert(&self, fields: NewMonitor) -> Result<Monitor>;

    /// 覆盖已有记录并刷新 `updated_at`；记录不存在时报错
    async fn save(&self, monitor: &Monitor) -> Result<Monitor>;

    async fn delete_by_id(&self, id: &MonitorId) -> Result<Option<Monitor>>;
}
