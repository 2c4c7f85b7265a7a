//! 通用周期任务执行器
//!
//! 每个调度器实例独占一个 tokio 任务：启动时可选立即执行一次，之后按
//! [`Schedule`] 休眠到下一个触发点。定时触发与手动触发共用一把周期锁，
//! 同一时刻最多只有一个周期在执行。停止通过 [`CancellationToken`] 完成，
//! 进行中的周期会先跑完。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use chrono_tz::Tz;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::schedule::Schedule;
use crate::utils::time::Clock;

const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(10);

/// 周期任务：一次执行包含若干互相独立的步骤
#[async_trait]
pub trait ScheduledJob: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// 执行一个完整周期。步骤失败只记录在报告里，不向上传播
    async fn run_cycle(&self) -> Vec<StepReport>;
}

/// 单个步骤的执行结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    pub step: String,
    pub affected: u64,
    pub failed: u64,
    pub skipped: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepReport {
    pub fn new(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            affected: 0,
            failed: 0,
            skipped: 0,
            error: None,
        }
    }

    pub fn with_affected(mut self, affected: u64) -> Self {
        self.affected = affected;
        self
    }

    pub fn failed(step: impl Into<String>, error: impl ToString) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(step)
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Startup,
    Timer,
    Manual,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub job: &'static str,
    pub trigger: Trigger,
    pub started_at: DateTime<FixedOffset>,
    pub finished_at: DateTime<FixedOffset>,
    pub steps: Vec<StepReport>,
}

impl CycleReport {
    pub fn step(&self, name: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.step == name)
    }

    pub fn has_failures(&self) -> bool {
        self.steps.iter().any(|s| s.is_failed() || s.failed > 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Stopped,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub job: &'static str,
    pub state: RunState,
    pub cycle_in_progress: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_run: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle: Option<CycleReport>,
}

#[derive(Default)]
struct RunnerState {
    shutdown: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
    next_run: Option<DateTime<Tz>>,
}

pub struct Scheduler<J: ScheduledJob> {
    job: Arc<J>,
    schedule: Schedule,
    clock: Arc<dyn Clock>,
    run_on_start: bool,
    stop_grace: Duration,
    state: Mutex<RunnerState>,
    cycle_lock: tokio::sync::Mutex<()>,
    last_cycle: Mutex<Option<CycleReport>>,
}

impl<J: ScheduledJob> Scheduler<J> {
    pub fn new(job: J, schedule: Schedule, clock: Arc<dyn Clock>) -> Self {
        Self {
            job: Arc::new(job),
            schedule,
            clock,
            run_on_start: false,
            stop_grace: DEFAULT_STOP_GRACE,
            state: Mutex::new(RunnerState::default()),
            cycle_lock: tokio::sync::Mutex::new(()),
            last_cycle: Mutex::new(None),
        }
    }

    /// 启动后是否立即执行一次
    pub fn run_on_start(mut self, enabled: bool) -> Self {
        self.run_on_start = enabled;
        self
    }

    /// `stop()` 等待后台任务退出的最长时间
    pub fn stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn job(&self) -> &Arc<J> {
        &self.job
    }

    /// 启动后台任务，已在运行时返回 false
    pub fn start(self: &Arc<Self>) -> bool {
        let mut state = self.state.lock();
        if state
            .handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
        {
            tracing::warn!("{} scheduler already running", self.job.name());
            return false;
        }

        let shutdown = CancellationToken::new();
        let runner = Arc::clone(self);
        let token = shutdown.clone();
        state.handle = Some(tokio::spawn(async move { runner.run_loop(token).await }));
        state.shutdown = Some(shutdown);
        tracing::info!("{} scheduler started", self.job.name());
        true
    }

    /// 停止后台任务。进行中的周期会执行完，最多等待 `stop_grace`
    pub async fn stop(&self) -> bool {
        let (shutdown, handle) = {
            let mut state = self.state.lock();
            state.next_run = None;
            (state.shutdown.take(), state.handle.take())
        };

        let Some(shutdown) = shutdown else {
            return false;
        };
        shutdown.cancel();

        if let Some(handle) = handle {
            match tokio::time::timeout(self.stop_grace, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!("{} scheduler task failed: {}", self.job.name(), e),
                Err(_) => tracing::warn!(
                    "{} scheduler did not exit within {:?}, the running cycle will finish in background",
                    self.job.name(),
                    self.stop_grace
                ),
            }
        }

        tracing::info!("{} scheduler stopped", self.job.name());
        true
    }

    /// 立即执行一个周期，与定时周期串行
    pub async fn run_now(&self) -> CycleReport {
        self.execute(Trigger::Manual).await
    }

    pub fn status(&self) -> SchedulerStatus {
        let (running, next_run) = {
            let state = self.state.lock();
            let running = state
                .handle
                .as_ref()
                .is_some_and(|handle| !handle.is_finished());
            (running, state.next_run)
        };

        SchedulerStatus {
            job: self.job.name(),
            state: if running {
                RunState::Running
            } else {
                RunState::Stopped
            },
            cycle_in_progress: self.cycle_lock.try_lock().is_err(),
            next_run: if running {
                next_run.map(|t| t.fixed_offset())
            } else {
                None
            },
            last_cycle: self.last_cycle.lock().clone(),
        }
    }

    async fn run_loop(self: Arc<Self>, shutdown: CancellationToken) {
        if self.run_on_start && !shutdown.is_cancelled() {
            self.execute(Trigger::Startup).await;
        }

        loop {
            let now = self.clock.now();
            let Some(next) = self.schedule.next_after(now) else {
                tracing::error!(
                    "{} scheduler cannot compute next run after {}",
                    self.job.name(),
                    now
                );
                break;
            };
            self.state.lock().next_run = Some(next);

            let wait = (next - now).to_std().unwrap_or_default();
            tracing::info!(
                "{} scheduler next run at {} (in {} minutes)",
                self.job.name(),
                next,
                wait.as_secs() / 60
            );

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            self.execute(Trigger::Timer).await;
        }

        self.state.lock().next_run = None;
    }

    async fn execute(&self, trigger: Trigger) -> CycleReport {
        let _cycle = self.cycle_lock.lock().await;

        let started_at = self.clock.now().fixed_offset();
        tracing::info!("Running {} cycle ({:?})", self.job.name(), trigger);

        let steps = self.job.run_cycle().await;

        let report = CycleReport {
            job: self.job.name(),
            trigger,
            started_at,
            finished_at: self.clock.now().fixed_offset(),
            steps,
        };

        for step in &report.steps {
            match &step.error {
                Some(error) => tracing::error!(
                    "{} step {} failed: {}",
                    report.job,
                    step.step,
                    error
                ),
                None => tracing::info!(
                    "{} step {}: affected {}, failed {}, skipped {}",
                    report.job,
                    step.step,
                    step.affected,
                    step.failed,
                    step.skipped
                ),
            }
        }
        tracing::info!("{} cycle completed", report.job);

        *self.last_cycle.lock() = Some(report.clone());
        report
    }
}
