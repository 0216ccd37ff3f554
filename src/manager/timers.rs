//! 定时器注册表：monitor ID -> 一次性定时任务
//!
//! 每个 ID 最多一个定时器。每个条目带 generation，
//! 到期的任务只有在自己仍是登记的那一代时才会被处理。

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::error::{ManagerError, ManagerResult};
use crate::monitor::MonitorId;

#[derive(Debug)]
struct TimerEntry {
    generation: u64,
    /// 排期时 monitor 的 `due_at`
    due_at: DateTime<Utc>,
    deadline: Instant,
    handle: JoinHandle<()>,
}

#[derive(Debug, Default)]
pub struct TimerRegistry {
    entries: HashMap<MonitorId, TimerEntry>,
    next_generation: u64,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 安装一次性定时器：`delay` 之后运行 `callback(generation)` 返回的 future。
    ///
    /// 同一 ID 已有定时器时返回 `InvariantViolation`，不会覆盖。
    pub fn schedule<F, Fut>(
        &mut self,
        id: &MonitorId,
        due_at: DateTime<Utc>,
        delay: Duration,
        callback: F,
    ) -> ManagerResult<u64>
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.entries.contains_key(id) {
            return Err(ManagerError::InvariantViolation(format!(
                "Monitor {} has already been added",
                id
            )));
        }

        let generation = self.next_generation;
        self.next_generation = self.next_generation.wrapping_add(1);

        let deadline = Instant::now() + delay;
        let fired = callback(generation);
        let handle = tokio::spawn(async move {
            sleep_until(deadline).await;
            fired.await;
        });

        self.entries.insert(
            id.clone(),
            TimerEntry {
                generation,
                due_at,
                deadline,
                handle,
            },
        );

        Ok(generation)
    }

    /// 取消并移除定时器；返回被取消的 `due_at`。不存在时什么都不做。
    pub fn cancel(&mut self, id: &MonitorId) -> Option<DateTime<Utc>> {
        self.entries.remove(id).map(|entry| {
            entry.handle.abort();
            entry.due_at
        })
    }

    /// 到期任务认领自己的条目（不 abort，调用方就是该任务）。
    /// generation 不匹配说明已被取消或替换，返回 None。
    pub fn take_fired(&mut self, id: &MonitorId, generation: u64) -> Option<DateTime<Utc>> {
        match self.entries.get(id) {
            Some(entry) if entry.generation == generation => {
                self.entries.remove(id).map(|entry| entry.due_at)
            }
            _ => None,
        }
    }

    pub fn contains(&self, id: &MonitorId) -> bool {
        self.entries.contains_key(id)
    }

    /// 距离触发还剩多久
    pub fn remaining(&self, id: &MonitorId) -> Option<Duration> {
        self.entries
            .get(id)
            .map(|entry| entry.deadline.saturating_duration_since(Instant::now()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 取消全部定时器
    pub fn cancel_all(&mut self) -> usize {
        let count = self.entries.len();
        for (_, entry) in self.entries.drain() {
            entry.handle.abort();
        }
        count
    }
}

impl Drop for TimerRegistry {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_callback(counter: &Arc<AtomicUsize>) -> impl FnOnce(u64) -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>> {
        let counter = Arc::clone(counter);
        move |_generation| {
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() {
        let mut registry = TimerRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let id = MonitorId::from("m-1");

        registry
            .schedule(&id, Utc::now(), Duration::from_secs(10), counting_callback(&counter))
            .unwrap();
        assert_eq!(registry.remaining(&id), Some(Duration::from_secs(10)));

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_schedule_is_invariant_violation() {
        let mut registry = TimerRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let id = MonitorId::from("m-1");

        registry
            .schedule(&id, Utc::now(), Duration::from_secs(10), counting_callback(&counter))
            .unwrap();
        let err = registry
            .schedule(&id, Utc::now(), Duration::from_secs(5), counting_callback(&counter))
            .unwrap_err();

        assert!(err.is_invariant_violation());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.remaining(&id), Some(Duration::from_secs(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_timer_and_is_idempotent() {
        let mut registry = TimerRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let id = MonitorId::from("m-1");
        let due_at = Utc::now();

        registry
            .schedule(&id, due_at, Duration::from_secs(1), counting_callback(&counter))
            .unwrap();

        assert_eq!(registry.cancel(&id), Some(due_at));
        assert_eq!(registry.cancel(&id), None);
        assert_eq!(registry.cancel(&MonitorId::from("never-added")), None);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_fired_checks_generation() {
        let mut registry = TimerRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let id = MonitorId::from("m-1");

        let first = registry
            .schedule(&id, Utc::now(), Duration::from_secs(1), counting_callback(&counter))
            .unwrap();
        registry.cancel(&id);
        let second = registry
            .schedule(&id, Utc::now(), Duration::from_secs(1), counting_callback(&counter))
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(registry.take_fired(&id, first), None);
        assert!(registry.contains(&id));
        assert!(registry.take_fired(&id, second).is_some());
        assert!(!registry.contains(&id));
    }
}
