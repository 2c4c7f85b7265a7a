// 按卡片ID加锁，同一张卡的修改串行执行，不同卡互不影响

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default, Clone)]
pub struct CardLocks {
    locks: Arc<DashMap<i64, Arc<Mutex<()>>>>,
}

/// 释放时顺带清理无人等待的锁条目
pub struct CardLockGuard {
    card_id: i64,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<DashMap<i64, Arc<Mutex<()>>>>,
}

impl CardLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, card_id: i64) -> CardLockGuard {
        let mutex = self.locks.entry(card_id).or_default().clone();
        let guard = mutex.lock_owned().await;
        CardLockGuard {
            card_id,
            guard: Some(guard),
            locks: self.locks.clone(),
        }
    }

    /// 当前持有锁条目的卡片数量
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for CardLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // 只剩表里这一份引用时说明没有其他等待者
        self.locks
            .remove_if(&self.card_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
