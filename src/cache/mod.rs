// 缓存模块
// 包含缓存键和基于 Redis 的操作逻辑

pub mod keys;
pub mod operations;

// 重新导出常用类型和函数，方便其他模块使用
pub use operations::{MemoryReminderDedupe, RateLimitCacheOperations, RedisReminderDedupe};
