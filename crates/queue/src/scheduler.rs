//! Daily scheduling of the settlement pass.

#![allow(missing_docs)]

use std::sync::Arc;

use accord_common::{AppError, AppResult, config::SchedulerSettings};
use accord_core::SettlementReport;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{Mutex, RwLock},
    task::JoinHandle,
};

/// Scheduled job types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduledJob {
    /// Settle every proposal whose voting window has closed.
    SettleProposals,
}

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Whether the daily pass runs at all.
    pub enabled: bool,
    /// Time of day (UTC) of the daily pass (default: 12:10).
    pub settlement_time: NaiveTime,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&SchedulerSettings::default())
    }
}

impl From<&SchedulerSettings> for SchedulerConfig {
    fn from(settings: &SchedulerSettings) -> Self {
        let settlement_time =
            NaiveTime::from_hms_opt(settings.settlement_hour_utc, settings.settlement_minute_utc, 0)
                .unwrap_or(NaiveTime::MIN);
        Self {
            enabled: settings.enabled,
            settlement_time,
        }
    }
}

impl SchedulerConfig {
    /// First scheduled moment strictly after `after`.
    #[must_use]
    pub fn next_run_after(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        let today = after.date_naive().and_time(self.settlement_time).and_utc();
        if today > after {
            today
        } else {
            today + Duration::days(1)
        }
    }
}

/// Scheduler state for tracking job runs.
#[derive(Debug, Clone, Default)]
pub struct SchedulerState {
    pub last_started: Option<DateTime<Utc>>,
    pub last_finished: Option<DateTime<Utc>>,
    pub last_report: Option<SettlementReport>,
    pub last_error: Option<String>,
    pub next_run: Option<DateTime<Utc>>,
    /// Triggers refused because a pass was still running.
    pub skipped: u64,
}

/// Job executor trait for scheduled jobs.
#[async_trait::async_trait]
pub trait JobExecutor: Send + Sync {
    /// Run one settlement pass as of `now`.
    async fn settle_proposals(&self, now: DateTime<Utc>) -> AppResult<SettlementReport>;
}

/// Result of triggering a job.
#[derive(Debug)]
pub enum JobRun {
    Completed(SettlementReport),
    Failed(AppError),
    /// Another run of the job was still in flight.
    Skipped,
}

/// Fires the settlement job once a day.
pub struct SettlementScheduler<E> {
    config: SchedulerConfig,
    executor: Arc<E>,
    in_flight: Arc<Mutex<()>>,
    state: Arc<RwLock<SchedulerState>>,
}

impl<E> Clone for SettlementScheduler<E> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            executor: self.executor.clone(),
            in_flight: self.in_flight.clone(),
            state: self.state.clone(),
        }
    }
}

impl<E: JobExecutor + 'static> SettlementScheduler<E> {
    /// Create a new scheduler.
    #[must_use]
    pub fn new(config: SchedulerConfig, executor: Arc<E>) -> Self {
        Self {
            config,
            executor,
            in_flight: Arc::new(Mutex::new(())),
            state: Arc::new(RwLock::new(SchedulerState::default())),
        }
    }

    /// Shared view of the scheduler's run history.
    #[must_use]
    pub fn state(&self) -> Arc<RwLock<SchedulerState>> {
        self.state.clone()
    }

    /// Run `job` now unless a run is already in flight.
    pub async fn trigger(&self, job: ScheduledJob, now: DateTime<Utc>) -> JobRun {
        let Ok(_guard) = self.in_flight.try_lock() else {
            tracing::warn!(?job, "Previous run still in flight, skipping");
            self.state.write().await.skipped += 1;
            return JobRun::Skipped;
        };

        self.state.write().await.last_started = Some(now);
        tracing::info!(?job, at = %now, "Running scheduled job");

        let result = match job {
            ScheduledJob::SettleProposals => self.executor.settle_proposals(now).await,
        };

        let mut state = self.state.write().await;
        state.last_finished = Some(Utc::now());
        match result {
            Ok(report) => {
                tracing::info!(
                    ?job,
                    examined = report.examined,
                    settled = report.settled(),
                    notifications_sent = report.notifications_sent,
                    notifications_failed = report.notifications_failed,
                    "Scheduled job finished"
                );
                state.last_report = Some(report.clone());
                state.last_error = None;
                JobRun::Completed(report)
            }
            Err(e) => {
                tracing::error!(?job, error = %e, code = e.error_code(), "Scheduled job failed");
                state.last_error = Some(e.to_string());
                JobRun::Failed(e)
            }
        }
    }

    /// Fire the job at every scheduled time, forever.
    pub async fn run(self) {
        let mut next = self.config.next_run_after(Utc::now());
        loop {
            self.state.write().await.next_run = Some(next);
            tracing::info!(next_run = %next, "Next settlement pass scheduled");

            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            // A pass still running at the next tick makes that tick a skip
            let scheduler = self.clone();
            tokio::spawn(async move {
                scheduler
                    .trigger(ScheduledJob::SettleProposals, Utc::now())
                    .await;
            });

            next = self.config.next_run_after(next.max(Utc::now()));
        }
    }
}

/// Run the scheduler with the given configuration and executor.
///
/// Returns `None` when scheduling is disabled.
pub fn run_scheduler<E: JobExecutor + 'static>(
    config: SchedulerConfig,
    executor: Arc<E>,
) -> Option<(JoinHandle<()>, Arc<RwLock<SchedulerState>>)> {
    if !config.enabled {
        tracing::info!("Settlement scheduler disabled");
        return None;
    }

    let scheduler = SettlementScheduler::new(config, executor);
    let state = scheduler.state();
    Some((tokio::spawn(scheduler.run()), state))
}
