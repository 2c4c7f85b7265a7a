// 教练业绩存储库

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone};
use chrono_tz::Tz;
use sqlx::PgPool;

use crate::database::models::{CoachPerformance, CompletedCourse};
use crate::database::store::{PerformanceStore, StoreResult};
use crate::error::StoreError;

/// 课程状态：4-已完成
const COURSE_STATUS_COMPLETED: i16 = 4;

pub struct PerformanceRepository {
    db: Arc<PgPool>,
    tz: Tz,
}

impl PerformanceRepository {
    pub fn new(db: Arc<PgPool>, tz: Tz) -> Self {
        Self { db, tz }
    }

    /// 业务时区下某月的起止时间，左闭右开
    fn month_bounds(
        &self,
        year: i32,
        month: u32,
    ) -> Option<(chrono::DateTime<Tz>, chrono::DateTime<Tz>)> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)?;
        let next = first.checked_add_months(chrono::Months::new(1))?;
        let start = self
            .tz
            .from_local_datetime(&first.and_hms_opt(0, 0, 0)?)
            .earliest()?;
        let end = self
            .tz
            .from_local_datetime(&next.and_hms_opt(0, 0, 0)?)
            .earliest()?;
        Some((start, end))
    }
}

#[async_trait]
impl PerformanceStore for PerformanceRepository {
    async fn coach_ids(&self) -> StoreResult<Vec<i64>> {
        let ids: Vec<i64> =
            sqlx::query_scalar("SELECT id FROM coaches WHERE deleted_at IS NULL ORDER BY id")
                .fetch_all(&*self.db)
                .await?;
        Ok(ids)
    }

    async fn completed_courses(
        &self,
        coach_id: i64,
        year: i32,
        month: u32,
    ) -> StoreResult<Vec<CompletedCourse>> {
        let (start, end) = self
            .month_bounds(year, month)
            .ok_or_else(|| StoreError::Unavailable(format!("无效月份 {}-{}", year, month)))?;

        let courses = sqlx::query_as::<_, CompletedCourse>(
            r#"
            SELECT id, coach_id, start_time, end_time, price, average_rating, rating_count
            FROM courses
            WHERE coach_id = $1
              AND status = $2
              AND start_time >= $3 AND start_time < $4
              AND deleted_at IS NULL
            "#,
        )
        .bind(coach_id)
        .bind(COURSE_STATUS_COMPLETED)
        .bind(start.with_timezone(&chrono::Utc))
        .bind(end.with_timezone(&chrono::Utc))
        .fetch_all(&*self.db)
        .await?;

        Ok(courses)
    }

    async fn save_performance(&self, performance: &CoachPerformance) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO coach_performance (
                coach_id, year, month, total_courses, total_hours, total_income, average_rating
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (coach_id, year, month) DO UPDATE
            SET total_courses = EXCLUDED.total_courses,
                total_hours = EXCLUDED.total_hours,
                total_income = EXCLUDED.total_income,
                average_rating = EXCLUDED.average_rating,
                updated_at = NOW()
            "#,
        )
        .bind(performance.coach_id)
        .bind(performance.year)
        .bind(performance.month as i32)
        .bind(performance.total_courses)
        .bind(performance.total_hours)
        .bind(performance.total_income)
        .bind(performance.average_rating)
        .execute(&*self.db)
        .await?;

        Ok(())
    }
}
