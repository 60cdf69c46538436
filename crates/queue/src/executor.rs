//! Job executor backed by the core settlement service.

use accord_common::AppResult;
use accord_core::{SettlementReport, SettlementService};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::scheduler::JobExecutor;

/// Runs scheduled settlement passes through [`SettlementService`].
#[derive(Clone)]
pub struct SettlementExecutor {
    service: SettlementService,
}

impl SettlementExecutor {
    /// Create a new executor.
    #[must_use]
    pub const fn new(service: SettlementService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl JobExecutor for SettlementExecutor {
    async fn settle_proposals(&self, now: DateTime<Utc>) -> AppResult<SettlementReport> {
        self.service.run_pass(now).await
    }
}
