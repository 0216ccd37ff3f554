//! Monitor Manager - 让内存中的定时器与持久化的 `due_at` 保持一致
//!
//! # 不变式
//! - 每个 monitor ID 在注册表中最多一个定时器
//! - 有定时器 ⇔ 记录的 `due_at` 已设置（且排期时在未来）
//! - 每次 arm 最多触发一次通知：到期时先持久化 disarm，再投递
//!
//! # 并发
//! 同一 ID 的 create 排期 / update / tick / delete / 到期处理通过 `MonitorLocks` 串行化；
//! 注册表只在同步代码里修改，从不跨 `.await` 持锁。
//! tick 与 delete 在第一次访问 store 之前就取消旧定时器；store 失败时恢复旧定时器。

mod locks;
pub mod timers;

pub use timers::TimerRegistry;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{ManagerError, ManagerResult};
use crate::monitor::{due_after, Monitor, MonitorId, MonitorPatch, NewMonitor, Notification};
use crate::notification::{ExpiryPayload, NotificationDispatcher};
use crate::store::MonitorStore;
use locks::MonitorLocks;

/// `statistics()` 的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerStats {
    /// 当前活跃定时器数量
    pub active_count: usize,
    /// 最近一次状态变更时间
    pub last_mutated_at: DateTime<Utc>,
}

/// `load()` 的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// 重新排期的 monitor 数量
    pub scheduled: usize,
    /// 停机期间已到期、立即处理的数量
    pub expired: usize,
}

struct Inner {
    store: Arc<dyn MonitorStore>,
    dispatcher: Arc<NotificationDispatcher>,
    timers: Mutex<TimerRegistry>,
    locks: MonitorLocks,
    last_mutated_at: Mutex<DateTime<Utc>>,
}

/// Monitor 管理器（clone 共享同一个实例）
#[derive(Clone)]
pub struct MonitorManager {
    inner: Arc<Inner>,
}

impl MonitorManager {
    pub fn new(store: Arc<dyn MonitorStore>, dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                dispatcher,
                timers: Mutex::new(TimerRegistry::new()),
                locks: MonitorLocks::new(),
                last_mutated_at: Mutex::new(Utc::now()),
            }),
        }
    }

    /// 启动时恢复所有 armed monitor。
    ///
    /// 已过期的立即走到期流程（不排期）；其余按剩余时间排期。
    /// 只有读取 store 失败才会返回错误。
    pub async fn load(&self) -> ManagerResult<LoadSummary> {
        let monitors = self.inner.store.find_armed().await.map_err(ManagerError::Store)?;
        let now = Utc::now();
        let mut summary = LoadSummary::default();

        for monitor in monitors {
            let Some(due_at) = monitor.due_at else {
                continue;
            };
            let overdue = monitor.is_overdue(now);

            let _guard = self.inner.locks.acquire(&monitor.id).await;

            if self.is_scheduled(&monitor.id) {
                debug!(monitor_id = %monitor.id, "Monitor already scheduled, skipping");
                continue;
            }

            if overdue {
                info!(monitor_id = %monitor.id, due_at = %due_at, "Monitor expired while offline");
                match self.expire_locked(&monitor.id, due_at).await {
                    Ok(true) => summary.expired += 1,
                    Ok(false) => {}
                    Err(e) => {
                        error!(monitor_id = %monitor.id, error = %e, "Failed to expire monitor during load")
                    }
                }
            } else {
                match self.add(&monitor) {
                    Ok(()) => summary.scheduled += 1,
                    Err(e) => {
                        error!(monitor_id = %monitor.id, error = %e, "Failed to schedule monitor during load")
                    }
                }
            }
        }

        self.touch();
        info!(
            scheduled = summary.scheduled,
            expired = summary.expired,
            "Monitors loaded"
        );
        Ok(summary)
    }

    /// 创建 monitor：`due_at = now + timeout`，写入 store 后排期
    pub async fn create(
        &self,
        name: impl Into<String>,
        timeout: u64,
        notification: Notification,
    ) -> ManagerResult<Monitor> {
        let fields = NewMonitor {
            name: name.into(),
            timeout,
            due_at: Some(due_after(Utc::now(), timeout)),
            notification,
        };

        let monitor = self.inner.store.insert(fields).await.map_err(ManagerError::Store)?;

        let _guard = self.inner.locks.acquire(&monitor.id).await;
        self.add(&monitor)?;
        self.touch();

        info!(monitor_id = %monitor.id, name = %monitor.name, timeout = monitor.timeout, "Monitor created");
        Ok(monitor)
    }

    /// 只读查询，不改变任何状态
    pub async fn get(&self, id: &MonitorId) -> ManagerResult<Option<Monitor>> {
        self.inner.store.find_by_id(id).await.map_err(ManagerError::Store)
    }

    /// 只更新提供的字段；不改变 `due_at`，也不碰定时器。
    /// 新的 timeout 在下一次 tick 时生效。
    pub async fn update(&self, id: &MonitorId, patch: MonitorPatch) -> ManagerResult<Option<Monitor>> {
        let _guard = self.inner.locks.acquire(id).await;

        let Some(mut monitor) = self.inner.store.find_by_id(id).await.map_err(ManagerError::Store)? else {
            return Ok(None);
        };

        if patch.is_empty() {
            debug!(monitor_id = %id, "Empty update, nothing to save");
            return Ok(Some(monitor));
        }

        monitor.apply(patch);
        let saved = self.inner.store.save(&monitor).await.map_err(ManagerError::Store)?;
        self.touch();

        debug!(monitor_id = %id, "Monitor updated");
        Ok(Some(saved))
    }

    /// 心跳：替换旧定时器，`due_at = now + timeout`。monitor 不存在时返回 None。
    pub async fn tick(&self, id: &MonitorId) -> ManagerResult<Option<Monitor>> {
        let _guard = self.inner.locks.acquire(id).await;

        // 在任何 store I/O 之前同步取消
        let previous = self.remove(id);

        let mut monitor = match self.inner.store.find_by_id(id).await {
            Ok(Some(monitor)) => monitor,
            Ok(None) => return Ok(None),
            Err(e) => {
                self.restore(id, previous);
                return Err(ManagerError::Store(e));
            }
        };

        monitor.rearm(Utc::now());

        let saved = match self.inner.store.save(&monitor).await {
            Ok(saved) => saved,
            Err(e) => {
                self.restore(id, previous);
                return Err(ManagerError::Store(e));
            }
        };

        self.add(&saved)?;
        self.touch();

        debug!(monitor_id = %id, due_at = ?saved.due_at, "Monitor ticked");
        Ok(Some(saved))
    }

    /// 删除记录并取消定时器；返回被删除的 monitor
    pub async fn delete(&self, id: &MonitorId) -> ManagerResult<Option<Monitor>> {
        let _guard = self.inner.locks.acquire(id).await;

        let previous = self.remove(id);

        match self.inner.store.delete_by_id(id).await {
            Ok(Some(monitor)) => {
                self.touch();
                info!(monitor_id = %id, "Monitor deleted");
                Ok(Some(monitor))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                self.restore(id, previous);
                Err(ManagerError::Store(e))
            }
        }
    }

    pub fn statistics(&self) -> ManagerStats {
        ManagerStats {
            active_count: self.timers().len(),
            last_mutated_at: *self
                .inner
                .last_mutated_at
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// 该 monitor 当前是否有定时器
    pub fn is_scheduled(&self, id: &MonitorId) -> bool {
        self.timers().contains(id)
    }

    /// 定时器剩余时间
    pub fn time_remaining(&self, id: &MonitorId) -> Option<Duration> {
        self.timers().remaining(id)
    }

    /// 取消所有定时器（进程退出前调用）；记录保持 armed，下次 `load()` 恢复
    pub fn shutdown(&self) {
        let cancelled = self.timers().cancel_all();
        info!(cancelled, "Monitor manager stopped");
    }

    /// 为 armed monitor 排期。已有定时器时返回 `InvariantViolation`。
    pub(crate) fn add(&self, monitor: &Monitor) -> ManagerResult<()> {
        let Some(due_at) = monitor.due_at else {
            let err = ManagerError::InvariantViolation(format!(
                "Monitor {} is not armed and cannot be scheduled",
                monitor.id
            ));
            error!(monitor_id = %monitor.id, error = %err, "Refusing to schedule monitor");
            return Err(err);
        };

        self.schedule_at(&monitor.id, due_at)
    }

    /// 取消定时器；没有定时器时什么都不做。返回被取消的 `due_at`。
    pub(crate) fn remove(&self, id: &MonitorId) -> Option<DateTime<Utc>> {
        let cancelled = self.timers().cancel(id);
        if cancelled.is_some() {
            debug!(monitor_id = %id, "Timer cancelled");
        }
        cancelled
    }

    fn schedule_at(&self, id: &MonitorId, due_at: DateTime<Utc>) -> ManagerResult<()> {
        let delay = (due_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let manager = Arc::downgrade(&self.inner);
        let timer_id = id.clone();

        let result = self.timers().schedule(id, due_at, delay, move |generation| {
            on_timer_elapsed(manager, timer_id, generation)
        });

        match result {
            Ok(_) => {
                debug!(monitor_id = %id, delay_secs = delay.as_secs(), "Timer scheduled");
                Ok(())
            }
            Err(e) => {
                error!(monitor_id = %id, error = %e, "Timer registry invariant violated");
                Err(e)
            }
        }
    }

    /// store 失败后恢复被取消的定时器
    fn restore(&self, id: &MonitorId, previous: Option<DateTime<Utc>>) {
        if let Some(due_at) = previous {
            if let Err(e) = self.schedule_at(id, due_at) {
                error!(monitor_id = %id, error = %e, "Failed to restore timer");
            }
        }
    }

    /// 到期流程（调用方持有该 ID 的锁）。
    ///
    /// 重新读取记录，仅当存储的 `due_at` 仍是排期时的值才 disarm 并通知。
    /// disarm 持久化失败时不发通知：记录仍为过去的 `due_at`，下次 `load()` 会再处理。
    async fn expire_locked(&self, id: &MonitorId, armed_due_at: DateTime<Utc>) -> ManagerResult<bool> {
        let Some(mut monitor) = self.inner.store.find_by_id(id).await.map_err(ManagerError::Store)? else {
            debug!(monitor_id = %id, "Monitor deleted before expiry");
            return Ok(false);
        };

        if monitor.due_at != Some(armed_due_at) {
            warn!(
                monitor_id = %id,
                armed_due_at = %armed_due_at,
                stored_due_at = ?monitor.due_at,
                "Monitor changed since timer was scheduled, skipping expiry"
            );
            return Ok(false);
        }

        monitor.disarm();
        let saved = self.inner.store.save(&monitor).await.map_err(ManagerError::Store)?;
        self.touch();

        info!(monitor_id = %id, name = %saved.name, scheme = %saved.notification.scheme(), "Monitor expired");

        // fire-and-observe：不等待投递结果
        let _ = self
            .inner
            .dispatcher
            .notify(saved.notification.clone(), ExpiryPayload::from_monitor(&saved));

        Ok(true)
    }

    fn timers(&self) -> MutexGuard<'_, TimerRegistry> {
        self.inner.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn touch(&self) {
        *self
            .inner
            .last_mutated_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Utc::now();
    }
}

/// 定时器到期回调；manager 已被释放时什么都不做
async fn on_timer_elapsed(manager: Weak<Inner>, id: MonitorId, generation: u64) {
    let Some(inner) = manager.upgrade() else {
        return;
    };
    let manager = MonitorManager { inner };

    // 先认领自己的条目再等锁；认领之后 cancel 不会再 abort 本任务
    let claimed = manager.timers().take_fired(&id, generation);
    let Some(armed_due_at) = claimed else {
        debug!(monitor_id = %id, generation, "Stale timer fired, ignoring");
        return;
    };

    let _guard = manager.inner.locks.acquire(&id).await;

    if let Err(e) = manager.expire_locked(&id, armed_due_at).await {
        error!(monitor_id = %id, error = %e, "Failed to expire monitor");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn manager() -> MonitorManager {
        MonitorManager::new(
            Arc::new(MemoryStore::new()),
            Arc::new(NotificationDispatcher::new()),
        )
    }

    fn webhook() -> Notification {
        Notification::Webhook {
            url: "https://example.com/hook".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_twice_is_invariant_violation() {
        let manager = manager();
        let monitor = manager.create("db", 60, webhook()).await.unwrap();

        let err = manager.add(&monitor).unwrap_err();
        assert!(err.is_invariant_violation());
        assert_eq!(manager.statistics().active_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_disarmed_is_invariant_violation() {
        let manager = manager();
        let mut monitor = manager.create("db", 60, webhook()).await.unwrap();
        manager.remove(&monitor.id);
        monitor.disarm();

        assert!(manager.add(&monitor).unwrap_err().is_invariant_violation());
        assert!(!manager.is_scheduled(&monitor.id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_is_idempotent() {
        let manager = manager();
        let monitor = manager.create("db", 60, webhook()).await.unwrap();

        assert!(manager.remove(&monitor.id).is_some());
        assert!(manager.remove(&monitor.id).is_none());
        assert!(manager.remove(&MonitorId::generate()).is_none());
        assert_eq!(manager.statistics().active_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_does_not_touch_statistics() {
        let manager = manager();
        let monitor = manager.create("db", 60, webhook()).await.unwrap();
        let before = manager.statistics();

        let found = manager.get(&monitor.id).await.unwrap();

        assert_eq!(found, Some(monitor));
        assert_eq!(manager.statistics(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_locks_are_released() {
        let manager = manager();
        let monitor = manager.create("db", 60, webhook()).await.unwrap();
        manager.tick(&monitor.id).await.unwrap();
        manager.delete(&monitor.id).await.unwrap();
        assert_eq!(manager.inner.locks.len(), 0);
    }
}
