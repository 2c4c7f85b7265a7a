//! 触发时间计算

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveTime, TimeZone};
use chrono_tz::Tz;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// 每天固定时刻
    DailyAt(NaiveTime),
    /// 每月固定日期与时刻，日期限制在 1..=28
    MonthlyAt { day: u32, time: NaiveTime },
}

/// 本地时间落在夏令时空档时顺延一小时
fn local_at(tz: Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Tz>> {
    let naive = date.and_time(time);
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| {
            tz.from_local_datetime(&(naive + chrono::Duration::hours(1)))
                .earliest()
        })
}

impl Schedule {
    /// 严格晚于 `now` 的下一次触发时间
    pub fn next_after(&self, now: DateTime<Tz>) -> Option<DateTime<Tz>> {
        let tz = now.timezone();
        let today = now.date_naive();

        match *self {
            Schedule::DailyAt(time) => {
                let candidate = local_at(tz, today, time)?;
                if candidate > now {
                    Some(candidate)
                } else {
                    local_at(tz, today.succ_opt()?, time)
                }
            }
            Schedule::MonthlyAt { day, time } => {
                let day = day.clamp(1, 28);
                let this_month = NaiveDate::from_ymd_opt(today.year(), today.month(), day)?;
                let candidate = local_at(tz, this_month, time)?;
                if candidate > now {
                    Some(candidate)
                } else {
                    local_at(tz, this_month.checked_add_months(Months::new(1))?, time)
                }
            }
        }
    }
}
