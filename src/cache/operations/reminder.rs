// 到期提醒去重
// Redis 不可用时放行，宁可重复提醒也不漏发

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use redis::{AsyncCommands, Client as RedisClient};

use crate::cache::keys::reminder_key;
use crate::scheduler::ReminderDedupe;

/// 去重键保留两天，覆盖跨日补跑
pub const DEFAULT_REMINDER_TTL: Duration = Duration::from_secs(2 * 24 * 3600);

pub struct RedisReminderDedupe {
    redis: Arc<RedisClient>,
    ttl: Duration,
}

impl RedisReminderDedupe {
    pub fn new(redis: Arc<RedisClient>) -> Self {
        Self {
            redis,
            ttl: DEFAULT_REMINDER_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    async fn try_claim(&self, key: &str) -> Result<bool, redis::RedisError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        // SET key 1 NX EX ttl，键已存在时返回 nil
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(self.ttl.as_secs())
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn try_release(&self, key: &str) -> Result<(), redis::RedisError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }
}

#[async_trait]
impl ReminderDedupe for RedisReminderDedupe {
    async fn claim(&self, card_id: i64, threshold_days: i64, date: NaiveDate) -> bool {
        let key = reminder_key(card_id, threshold_days, date);
        match self.try_claim(&key).await {
            Ok(claimed) => claimed,
            Err(e) => {
                tracing::warn!("Reminder dedupe unavailable for {}: {}", key, e);
                true
            }
        }
    }

    async fn release(&self, card_id: i64, threshold_days: i64, date: NaiveDate) {
        let key = reminder_key(card_id, threshold_days, date);
        if let Err(e) = self.try_release(&key).await {
            tracing::warn!("Failed to release reminder key {}: {}", key, e);
        }
    }
}

/// 进程内去重，用于测试和单实例部署
#[derive(Default)]
pub struct MemoryReminderDedupe {
    claimed: Mutex<HashSet<String>>,
}

impl MemoryReminderDedupe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.claimed.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.lock().is_empty()
    }
}

#[async_trait]
impl ReminderDedupe for MemoryReminderDedupe {
    async fn claim(&self, card_id: i64, threshold_days: i64, date: NaiveDate) -> bool {
        self.claimed
            .lock()
            .insert(reminder_key(card_id, threshold_days, date))
    }

    async fn release(&self, card_id: i64, threshold_days: i64, date: NaiveDate) {
        self.claimed
            .lock()
            .remove(&reminder_key(card_id, threshold_days, date));
    }
}
