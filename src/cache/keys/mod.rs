/// 缓存键模块
/// 提供各种缓存键生成函数
use chrono::NaiveDate;

/// 到期提醒去重键前缀
const REMINDER_PREFIX: &str = "reminder:card:";

/// 限流计数键前缀
const RATE_LIMIT_PREFIX: &str = "rate_limit:";

/// 生成到期提醒去重键：同一张卡、同一档位、同一天共用一个键
pub fn reminder_key(card_id: i64, threshold_days: i64, date: NaiveDate) -> String {
    format!(
        "{}{}:{}d:{}",
        REMINDER_PREFIX,
        card_id,
        threshold_days,
        date.format("%Y%m%d")
    )
}

/// 生成限流计数键
pub fn rate_limit_key(client: &str) -> String {
    format!("{}{}", RATE_LIMIT_PREFIX, client)
}
