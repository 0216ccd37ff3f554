//! 按 monitor ID 串行化的异步锁
//!
//! 同一 ID 同时最多一个改变状态的操作在执行（包括定时器到期处理）。
//! 没有持有者也没有等待者时，锁条目会从表中移除。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::monitor::MonitorId;

type LockTable = Arc<Mutex<HashMap<MonitorId, Arc<AsyncMutex<()>>>>>;

#[derive(Debug, Default)]
pub(crate) struct MonitorLocks {
    table: LockTable,
}

impl MonitorLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// 获取 `id` 的锁；guard drop 时释放
    pub(crate) async fn acquire(&self, id: &MonitorId) -> MonitorLockGuard {
        let lock = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(table.entry(id.clone()).or_default())
        };

        let guard = Arc::clone(&lock).lock_owned().await;

        MonitorLockGuard {
            id: id.clone(),
            lock,
            guard: Some(guard),
            table: Arc::clone(&self.table),
        }
    }

    /// 当前表中的条目数
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

pub(crate) struct MonitorLockGuard {
    id: MonitorId,
    lock: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
    table: LockTable,
}

impl Drop for MonitorLockGuard {
    fn drop(&mut self) {
        // 先释放锁，再检查是否还有其他引用（表本身 + 本 guard = 2）
        self.guard.take();

        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        if Arc::strong_count(&self.lock) == 2 {
            table.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_entry_removed_after_release() {
        let locks = MonitorLocks::new();
        let id = MonitorId::from("m-1");

        let guard = locks.acquire(&id).await;
        assert_eq!(locks.len(), 1);
        drop(guard);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_same_id_is_serialized() {
        let locks = Arc::new(MonitorLocks::new());
        let id = MonitorId::from("m-1");
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let id = id.clone();
            let inside = Arc::clone(&inside);
            let max_inside = Arc::clone(&max_inside);
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire(&id).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_different_ids_do_not_block() {
        let locks = MonitorLocks::new();
        let _a = locks.acquire(&MonitorId::from("a")).await;
        let b = tokio::time::timeout(Duration::from_secs(1), locks.acquire(&MonitorId::from("b"))).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }
}
