use std::sync::Arc;
use std::time::Duration;

use redis::{AsyncCommands, Client as RedisClient};

use crate::cache::keys::rate_limit_key;

/// 速率限制缓存操作
pub struct RateLimitCacheOperations;

impl RateLimitCacheOperations {
    /// 增加客户端在当前窗口内的请求计数，返回增加后的值
    pub async fn increment(
        redis: &Arc<RedisClient>,
        client: &str,
        window: Duration,
    ) -> Result<i64, redis::RedisError> {
        let mut conn = redis.get_multiplexed_async_connection().await?;
        let key = rate_limit_key(client);

        // 使用 Redis 的 INCR 和 EXPIRE 命令实现计数器
        let count: i64 = conn.incr(&key, 1).await?;
        if count == 1 {
            // 第一次请求时设置窗口过期时间
            let _: () = conn.expire(&key, window.as_secs() as i64).await?;
        }

        Ok(count)
    }
}
