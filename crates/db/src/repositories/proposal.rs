//! Proposal repository.

use std::sync::Arc;

use crate::entities::{
    Proposal,
    proposal::{self, ProposalStatus},
};
use accord_common::{AppError, AppResult};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set,
};

/// Proposal repository for database operations.
#[derive(Clone)]
pub struct ProposalRepository {
    db: Arc<DatabaseConnection>,
}

impl ProposalRepository {
    /// Create a new proposal repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find proposals in any of the given statuses, oldest first.
    pub async fn find_by_status(
        &self,
        statuses: &[ProposalStatus],
    ) -> AppResult<Vec<proposal::Model>> {
        if statuses.is_empty() {
            return Ok(vec![]);
        }

        Proposal::find()
            .filter(proposal::Column::Status.is_in(statuses.iter().copied()))
            .order_by_asc(proposal::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find every proposal ever made for a nominee, oldest first.
    pub async fn find_by_nominee_nickname(
        &self,
        nickname: &str,
    ) -> AppResult<Vec<proposal::Model>> {
        Proposal::find()
            .filter(proposal::Column::NomineeTelegramNickname.eq(nickname.to_lowercase()))
            .order_by_asc(proposal::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a new proposal.
    pub async fn create(&self, model: proposal::ActiveModel) -> AppResult<proposal::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Update a proposal.
    pub async fn update(&self, model: proposal::ActiveModel) -> AppResult<proposal::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Move a `created` proposal into a terminal status.
    ///
    /// The update only matches rows still in `created`, so a proposal can be
    /// settled once. A second attempt yields [`AppError::Conflict`].
    pub async fn settle(&self, id: &str, status: ProposalStatus) -> AppResult<proposal::Model> {
        if !status.is_terminal() {
            return Err(AppError::BadRequest(format!(
                "cannot settle proposal {id} into non-terminal status {status}"
            )));
        }

        let active = proposal::ActiveModel {
            id: ActiveValue::Unchanged(id.to_string()),
            status: Set(status),
            updated_at: Set(Some(Utc::now().into())),
            ..Default::default()
        };

        Proposal::update(active)
            .filter(proposal::Column::Status.eq(ProposalStatus::Created))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| match e {
                DbErr::RecordNotUpdated => {
                    AppError::Conflict(format!("proposal {id} is already settled"))
                }
                other => AppError::Database(other.to_string()),
            })
    }
}
