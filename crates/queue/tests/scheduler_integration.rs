//! Scheduler integration tests.
//!
//! These drive the daily loop on a paused Tokio clock.

#![allow(clippy::unwrap_used)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use accord_common::AppResult;
use accord_core::SettlementReport;
use accord_queue::{JobExecutor, SchedulerConfig, run_scheduler};
use chrono::{DateTime, Utc};

#[derive(Default)]
struct CountingExecutor {
    runs: AtomicUsize,
}

#[async_trait::async_trait]
impl JobExecutor for CountingExecutor {
    async fn settle_proposals(&self, _now: DateTime<Utc>) -> AppResult<SettlementReport> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(SettlementReport::default())
    }
}

#[tokio::test(start_paused = true)]
async fn test_daily_loop_fires_once_per_day() {
    let executor = Arc::new(CountingExecutor::default());
    let (handle, state) = run_scheduler(SchedulerConfig::default(), executor.clone()).unwrap();

    // Two full days of virtual time cover at least one and at most two ticks
    // past the first scheduled time.
    for _ in 0..49 {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }

    let runs = executor.runs.load(Ordering::SeqCst);
    assert!((1..=3).contains(&runs), "unexpected run count {runs}");

    let state = state.read().await;
    assert!(state.last_started.is_some());
    assert!(state.next_run.unwrap() > state.last_started.unwrap());
    assert_eq!(state.skipped, 0);

    handle.abort();
}
