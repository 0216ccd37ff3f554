//! 进程内 Monitor 存储

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::MonitorStore;
use crate::monitor::{Monitor, MonitorId, NewMonitor};

#[derive(Debug, Default)]
pub struct MemoryStore {
    monitors: RwLock<HashMap<MonitorId, Monitor>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接写入一条完整记录（用于恢复 / 测试预置数据）
    pub async fn put(&self, monitor: Monitor) {
        self.monitors.write().await.insert(monitor.id.clone(), monitor);
    }
}

#[async_trait]
impl MonitorStore for MemoryStore {
    async fn find_armed(&self) -> Result<Vec<Monitor>> {
        Ok(self
            .monitors
            .read()
            .await
            .values()
            .filter(|m| m.is_armed())
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: &MonitorId) -> Result<Option<Monitor>> {
        Ok(self.monitors.read().await.get(id).cloned())
    }

    async fn insert(&self, fields: NewMonitor) -> Result<Monitor> {
        let now = Utc::now();
        let monitor = Monitor {
            id: MonitorId::generate(),
            name: fields.name,
            timeout: fields.timeout,
            due_at: fields.due_at,
            notification: fields.notification,
            created_at: now,
            updated_at: now,
        };
        self.monitors
            .write()
            .await
            .insert(monitor.id.clone(), monitor.clone());
        Ok(monitor)
    }

    async fn save(&self, monitor: &Monitor) -> Result<Monitor> {
        let mut monitors = self.monitors.write().await;
        let stored = monitors
            .get_mut(&monitor.id)
            .ok_or_else(|| anyhow!("Monitor {} does not exist", monitor.id))?;

        *stored = Monitor {
            created_at: stored.created_at,
            updated_at: Utc::now(),
            ..monitor.clone()
        };
        Ok(stored.clone())
    }

    async fn delete_by_id(&self, id: &MonitorId) -> Result<Option<Monitor>> {
        Ok(self.monitors.write().await.remove(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::{due_after, Notification};

    fn new_monitor(name: &str, armed: bool) -> NewMonitor {
        NewMonitor {
            name: name.to_string(),
            timeout: 60,
            due_at: armed.then(|| due_after(Utc::now(), 60)),
            notification: Notification::Webhook {
                url: "https://example.com/hook".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_id_and_timestamps() {
        let store = MemoryStore::new();
        let monitor = store.insert(new_monitor("a", true)).await.unwrap();

        assert_eq!(monitor.created_at, monitor.updated_at);
        let found = store.find_by_id(&monitor.id).await.unwrap();
        assert_eq!(found, Some(monitor));
    }

    #[tokio::test]
    async fn test_find_armed_skips_disarmed() {
        let store = MemoryStore::new();
        let armed = store.insert(new_monitor("armed", true)).await.unwrap();
        store.insert(new_monitor("idle", false)).await.unwrap();

        let found = store.find_armed().await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, armed.id);
    }

    #[tokio::test]
    async fn test_save_unknown_monitor_fails() {
        let store = MemoryStore::new();
        let monitor = store.insert(new_monitor("a", true)).await.unwrap();
        store.delete_by_id(&monitor.id).await.unwrap();

        assert!(store.save(&monitor).await.is_err());
        assert!(store.delete_by_id(&monitor.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_keeps_created_at() {
        let store = MemoryStore::new();
        let mut monitor = store.insert(new_monitor("a", true)).await.unwrap();
        let created_at = monitor.created_at;

        monitor.disarm();
        monitor.created_at = Utc::now() + chrono::Duration::days(1);
        let saved = store.save(&monitor).await.unwrap();

        assert_eq!(saved.created_at, created_at);
        assert!(saved.due_at.is_none());
        assert!(saved.updated_at >= created_at);
    }
}
