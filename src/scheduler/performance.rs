// 教练月度业绩统计任务
// 每月 1 日统计上一个月：遍历教练 -> 汇总已完成课程 -> 写回业绩

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;

use super::runner::{ScheduledJob, StepReport};
use crate::database::models::{CoachPerformance, CompletedCourse};
use crate::database::store::PerformanceStore;
use crate::utils::time::Clock;

pub const PERFORMANCE_STEP: &str = "update_coach_performance";

/// 给定日期所在月份的上一个月
pub fn previous_month(today: NaiveDate) -> (i32, u32) {
    if today.month() == 1 {
        (today.year() - 1, 12)
    } else {
        (today.year(), today.month() - 1)
    }
}

/// 汇总一个教练某月的已完成课程
pub fn aggregate_performance(
    coach_id: i64,
    year: i32,
    month: u32,
    courses: &[CompletedCourse],
) -> CoachPerformance {
    let mut total_seconds: i64 = 0;
    let mut total_income = Decimal::ZERO;
    let mut weighted_rating = Decimal::ZERO;
    let mut rated_count: i64 = 0;

    for course in courses {
        total_seconds += (course.end_time - course.start_time).num_seconds().max(0);
        total_income += course.price;
        if course.rating_count > 0 {
            weighted_rating += course.average_rating * Decimal::from(course.rating_count);
            rated_count += i64::from(course.rating_count);
        }
    }

    let average_rating = if rated_count > 0 {
        (weighted_rating / Decimal::from(rated_count)).round_dp(2)
    } else {
        Decimal::ZERO
    };

    CoachPerformance {
        coach_id,
        year,
        month,
        total_courses: courses.len() as i32,
        total_hours: (Decimal::from(total_seconds) / Decimal::from(3600)).round_dp(2),
        total_income,
        average_rating,
    }
}

pub struct CoachPerformanceJob {
    store: Arc<dyn PerformanceStore>,
    clock: Arc<dyn Clock>,
}

impl CoachPerformanceJob {
    pub fn new(store: Arc<dyn PerformanceStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    async fn update_coach(&self, coach_id: i64, year: i32, month: u32) -> Result<(), String> {
        let courses = self
            .store
            .completed_courses(coach_id, year, month)
            .await
            .map_err(|e| e.to_string())?;
        let performance = aggregate_performance(coach_id, year, month, &courses);
        self.store
            .save_performance(&performance)
            .await
            .map_err(|e| e.to_string())
    }
}

#[async_trait]
impl ScheduledJob for CoachPerformanceJob {
    fn name(&self) -> &'static str {
        "coach_performance"
    }

    async fn run_cycle(&self) -> Vec<StepReport> {
        let (year, month) = previous_month(self.clock.today());

        let coach_ids = match self.store.coach_ids().await {
            Ok(ids) => ids,
            Err(e) => return vec![StepReport::failed(PERFORMANCE_STEP, e)],
        };

        let mut report = StepReport::new(PERFORMANCE_STEP);
        for coach_id in coach_ids {
            match self.update_coach(coach_id, year, month).await {
                Ok(()) => report.affected += 1,
                Err(e) => {
                    tracing::error!(
                        "Error updating performance for coach {} ({}-{:02}): {}",
                        coach_id,
                        year,
                        month,
                        e
                    );
                    report.failed += 1;
                }
            }
        }

        vec![report]
    }
}
