// 后台调度器
// 到期检查与教练业绩统计共用同一套执行与容错模型

pub mod expiry;
pub mod performance;
pub mod runner;
pub mod schedule;

pub use expiry::{CardExpiryJob, ReminderDedupe};
pub use performance::CoachPerformanceJob;
pub use runner::{
    CycleReport, RunState, ScheduledJob, Scheduler, SchedulerStatus, StepReport, Trigger,
};
pub use schedule::Schedule;

pub type ExpiryScheduler = Scheduler<CardExpiryJob>;
pub type PerformanceScheduler = Scheduler<CoachPerformanceJob>;
