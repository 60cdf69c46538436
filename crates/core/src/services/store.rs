//! Storage seams used by the governance services.
//!
//! The services work on plain entity models and commit through these traits.
//! The database repositories implement them; tests swap in in-memory stores.

use accord_common::AppResult;
use accord_db::{
    entities::{
        proposal::{self, ProposalStatus},
        user::{self, UserRole},
    },
    repositories::{ProposalRepository, UserRepository},
};
use async_trait::async_trait;
use sea_orm::{ActiveModelTrait, IntoActiveModel};

/// Access to community members.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// All users holding `role`.
    async fn find_by_role(&self, role: UserRole) -> AppResult<Vec<user::Model>>;

    async fn find_by_id(&self, id: &str) -> AppResult<Option<user::Model>>;

    /// Look up by Telegram nickname, without `@`.
    async fn find_by_handle(&self, handle: &str) -> AppResult<Option<user::Model>>;

    async fn find_by_telegram_id(&self, telegram_id: i64) -> AppResult<Option<user::Model>>;

    async fn create(&self, user: user::Model) -> AppResult<user::Model>;

    /// Overwrite every column of an existing user.
    async fn update(&self, user: user::Model) -> AppResult<user::Model>;
}

/// Access to nominations.
#[async_trait]
pub trait ProposalStore: Send + Sync {
    /// Proposals in any of `statuses`, oldest first.
    async fn find_by_status(&self, statuses: &[ProposalStatus])
    -> AppResult<Vec<proposal::Model>>;

    /// Every proposal ever made for a nominee, oldest first.
    async fn find_by_nominee_handle(&self, handle: &str) -> AppResult<Vec<proposal::Model>>;

    async fn create(&self, proposal: proposal::Model) -> AppResult<proposal::Model>;

    /// Overwrite every column of an existing proposal.
    async fn update(&self, proposal: proposal::Model) -> AppResult<proposal::Model>;

    /// Move a `created` proposal into a terminal status.
    ///
    /// Fails with `Conflict` when the proposal has already left `created`.
    async fn settle(&self, id: &str, status: ProposalStatus) -> AppResult<proposal::Model>;
}

#[async_trait]
impl UserStore for UserRepository {
    async fn find_by_role(&self, role: UserRole) -> AppResult<Vec<user::Model>> {
        Self::find_by_role(self, role).await
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Option<user::Model>> {
        Self::find_by_id(self, id).await
    }

    async fn find_by_handle(&self, handle: &str) -> AppResult<Option<user::Model>> {
        self.find_by_telegram_nickname(handle).await
    }

    async fn find_by_telegram_id(&self, telegram_id: i64) -> AppResult<Option<user::Model>> {
        Self::find_by_telegram_id(self, telegram_id).await
    }

    async fn create(&self, user: user::Model) -> AppResult<user::Model> {
        Self::create(self, user.into_active_model().reset_all()).await
    }

    async fn update(&self, user: user::Model) -> AppResult<user::Model> {
        Self::update(self, user.into_active_model().reset_all()).await
    }
}

#[async_trait]
impl ProposalStore for ProposalRepository {
    async fn find_by_status(
        &self,
        statuses: &[ProposalStatus],
    ) -> AppResult<Vec<proposal::Model>> {
        Self::find_by_status(self, statuses).await
    }

    async fn find_by_nominee_handle(&self, handle: &str) -> AppResult<Vec<proposal::Model>> {
        self.find_by_nominee_nickname(handle).await
    }

    async fn create(&self, proposal: proposal::Model) -> AppResult<proposal::Model> {
        Self::create(self, proposal.into_active_model().reset_all()).await
    }

    async fn update(&self, proposal: proposal::Model) -> AppResult<proposal::Model> {
        Self::update(self, proposal.into_active_model().reset_all()).await
    }

    async fn settle(&self, id: &str, status: ProposalStatus) -> AppResult<proposal::Model> {
        Self::settle(self, id, status).await
    }
}
