//! monitors.json 文件存储
//!
//! 每次读-改-写都在 `monitors.json.lock` 的排他锁下完成（只读用共享锁），
//! 文件 I/O 放到 `spawn_blocking` 中执行。

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::MonitorStore;
use crate::monitor::{Monitor, MonitorId, NewMonitor};

/// monitors.json 结构
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct MonitorsFile {
    monitors: Vec<Monitor>,
}

/// 基于 JSON 文件的 Monitor 存储
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    data_dir: PathBuf,
}

impl JsonFileStore {
    /// 在 `data_dir` 下存储 monitors.json（目录不存在时创建）
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data dir {}", data_dir.display()))?;
        Ok(Self { data_dir })
    }

    pub fn file_path(&self) -> PathBuf {
        self.data_dir.join("monitors.json")
    }

    fn lock_file_path(&self) -> PathBuf {
        self.data_dir.join("monitors.json.lock")
    }

    /// 读取 monitors.json（内部使用，不加锁）
    fn read_file_internal(path: &Path) -> Result<MonitorsFile> {
        if path.exists() {
            let content = fs::read_to_string(path)?;
            if content.trim().is_empty() {
                return Ok(MonitorsFile::default());
            }
            Ok(serde_json::from_str(&content)
                .with_context(|| format!("Corrupt monitor file {}", path.display()))?)
        } else {
            Ok(MonitorsFile::default())
        }
    }

    /// 写入 monitors.json（内部使用，不加锁）；先写临时文件再原子替换
    fn write_file_internal(path: &Path, file: &MonitorsFile) -> Result<()> {
        let content = serde_json::to_string_pretty(file)?;
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, content)?;
        fs::rename(&temp_path, path)?;
        Ok(())
    }

    /// 在排他锁保护下执行读-改-写
    fn with_locked_file<F, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce(&mut MonitorsFile) -> Result<T>,
    {
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(self.lock_file_path())?;

        lock_file.lock_exclusive()?;

        let path = self.file_path();
        let result = (|| {
            let mut file = Self::read_file_internal(&path)?;
            let result = operation(&mut file)?;
            Self::write_file_internal(&path, &file)?;
            Ok(result)
        })();

        let _ = lock_file.unlock();

        result
    }

    /// 在共享锁保护下只读
    fn with_locked_file_read<F, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce(&MonitorsFile) -> Result<T>,
    {
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(self.lock_file_path())?;

        lock_file.lock_shared()?;

        let result = (|| {
            let file = Self::read_file_internal(&self.file_path())?;
            operation(&file)
        })();

        let _ = lock_file.unlock();

        result
    }

    async fn blocking<F, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce(&JsonFileStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || operation(&store))
            .await
            .map_err(|e| anyhow!("Store task failed: {}", e))?
    }
}

#[async_trait]
impl MonitorStore for JsonFileStore {
    async fn find_armed(&self) -> Result<Vec<Monitor>> {
        self.blocking(|store| {
            store.with_locked_file_read(|file| {
                Ok(file
                    .monitors
                    .iter()
                    .filter(|m| m.is_armed())
                    .cloned()
                    .collect())
            })
        })
        .await
    }

    async fn find_by_id(&self, id: &MonitorId) -> Result<Option<Monitor>> {
        let id = id.clone();
        self.blocking(move |store| {
            store.with_locked_file_read(|file| {
                Ok(file.monitors.iter().find(|m| m.id == id).cloned())
            })
        })
        .await
    }

    async fn insert(&self, fields: NewMonitor) -> Result<Monitor> {
        self.blocking(move |store| {
            store.with_locked_file(|file| {
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
                debug!(monitor_id = %monitor.id, "Inserting monitor record");
                file.monitors.push(monitor.clone());
                Ok(monitor)
            })
        })
        .await
    }

    async fn save(&self, monitor: &Monitor) -> Result<Monitor> {
        let monitor = monitor.clone();
        self.blocking(move |store| {
            store.with_locked_file(|file| {
                let stored = file
                    .monitors
                    .iter_mut()
                    .find(|m| m.id == monitor.id)
                    .ok_or_else(|| anyhow!("Monitor {} does not exist", monitor.id))?;

                *stored = Monitor {
                    created_at: stored.created_at,
                    updated_at: Utc::now(),
                    ..monitor
                };
                Ok(stored.clone())
            })
        })
        .await
    }

    async fn delete_by_id(&self, id: &MonitorId) -> Result<Option<Monitor>> {
        let id = id.clone();
        self.blocking(move |store| {
            store.with_locked_file(|file| {
                let removed = file
                    .monitors
                    .iter()
                    .position(|m| m.id == id)
                    .map(|index| file.monitors.remove(index));
                Ok(removed)
            })
        })
        .await
    }
}
