// 教练业绩实体

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 已完成的课程，业绩统计的输入
#[derive(Debug, Clone, FromRow)]
pub struct CompletedCourse {
    pub id: i64,
    pub coach_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub price: Decimal,
    pub average_rating: Decimal,
    pub rating_count: i32,
}

/// 教练月度业绩，对应 coach_performance 表，按 (coach_id, year, month) 唯一
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoachPerformance {
    pub coach_id: i64,
    pub year: i32,
    pub month: u32,
    pub total_courses: i32,
    pub total_hours: Decimal,
    pub total_income: Decimal,
    pub average_rating: Decimal,
}
