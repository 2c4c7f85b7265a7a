//! 业务时钟
//!
//! 所有“今天”的判断都经过 [`Clock`]，保证到期检查与提醒使用同一个时区。

use chrono::{DateTime, Months, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;

pub trait Clock: Send + Sync {
    /// 当前时间（业务时区）
    fn now(&self) -> DateTime<Tz>;

    /// 业务时区下的今天
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    fn timezone(&self) -> Tz {
        self.now().timezone()
    }
}

/// 系统时钟
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }
}

/// 固定时钟，可手动拨动，用于测试和回放
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Tz>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Tz>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// 以某一天的本地时间构造
    pub fn at(tz: Tz, date: NaiveDate, hour: u32, minute: u32) -> Option<Self> {
        let naive = date.and_hms_opt(hour, minute, 0)?;
        tz.from_local_datetime(&naive).earliest().map(Self::new)
    }

    pub fn set(&self, now: DateTime<Tz>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, delta: chrono::Duration) {
        let mut now = self.now.lock();
        *now += delta;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Tz> {
        *self.now.lock()
    }
}

/// 按月加日期，目标月份没有该日时取月末
pub fn add_months(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    date.checked_add_months(Months::new(months))
}

/// 按天加日期，超出可表示范围时返回 None
pub fn add_days(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    chrono::Duration::try_days(days).and_then(|delta| date.checked_add_signed(delta))
}
