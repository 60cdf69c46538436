//! Nomination submission and proposal listings.

use std::sync::Arc;

use accord_common::{AppError, AppResult, GovernanceConfig, IdGenerator};
use accord_db::entities::{
    proposal::{self, NomineeRole, ProposalStatus},
    user::{self, UserRole},
};
use chrono::{DateTime, Duration, NaiveTime, Utc};
use validator::Validate;

use super::{
    store::{ProposalStore, UserStore},
    vote_source::{CreatePollRequest, VoteSource},
};

/// Hour of day (UTC) at which external polls close.
const POLL_CLOSING_HOUR: u32 = 12;

/// A nomination as entered by the nominator.
#[derive(Debug, Clone, Validate)]
pub struct NominationInput {
    /// Ignored for seeder nominations, which use the existing user's name.
    #[validate(length(min = 1, max = 128))]
    pub nominee_name: String,
    /// Telegram nickname, with or without `@`.
    #[validate(length(min = 1, max = 32))]
    pub nominee_handle: String,
    pub nominee_telegram_id: Option<i64>,
    pub nominee_role: NomineeRole,
    /// Why the nominee belongs in the community.
    #[validate(length(min = 1, max = 2000))]
    pub comment: String,
}

/// Strip whitespace and a leading `@`, then lowercase.
#[must_use]
pub fn normalize_handle(handle: &str) -> String {
    handle.trim().trim_start_matches('@').trim().to_lowercase()
}

/// Nomination service for business logic.
#[derive(Clone)]
pub struct NominationService {
    users: Arc<dyn UserStore>,
    proposals: Arc<dyn ProposalStore>,
    votes: Arc<dyn VoteSource>,
    voting_duration: Duration,
    renomination_cooldown: Duration,
    id_gen: IdGenerator,
}

impl NominationService {
    /// Create a new nomination service.
    #[must_use]
    pub fn new(
        users: Arc<dyn UserStore>,
        proposals: Arc<dyn ProposalStore>,
        votes: Arc<dyn VoteSource>,
        governance: &GovernanceConfig,
    ) -> Self {
        Self {
            users,
            proposals,
            votes,
            voting_duration: Duration::days(i64::from(governance.voting_duration_days)),
            renomination_cooldown: Duration::days(i64::from(
                governance.renomination_cooldown_days,
            )),
            id_gen: IdGenerator::new(),
        }
    }

    /// Submit a nomination and open its poll.
    pub async fn submit(
        &self,
        nominator_id: &str,
        input: NominationInput,
        now: DateTime<Utc>,
    ) -> AppResult<proposal::Model> {
        let input = NominationInput {
            nominee_name: input.nominee_name.trim().to_string(),
            nominee_handle: normalize_handle(&input.nominee_handle),
            comment: input.comment.trim().to_string(),
            ..input
        };
        input.validate()?;

        let nominator = self
            .users
            .find_by_id(nominator_id)
            .await?
            .ok_or_else(|| AppError::UserNotFound(nominator_id.to_string()))?;

        match (nominator.role, input.nominee_role) {
            (UserRole::Guest, _) => {
                return Err(AppError::Forbidden(
                    "Only members can submit nominations".to_string(),
                ));
            }
            (UserRole::Member, NomineeRole::Seeder) => {
                return Err(AppError::Forbidden(
                    "Only seeders can nominate seeders".to_string(),
                ));
            }
            _ => {}
        }

        if nominator.telegram_nickname == input.nominee_handle {
            return Err(AppError::BadRequest(
                "You cannot nominate yourself".to_string(),
            ));
        }

        let existing = self.users.find_by_handle(&input.nominee_handle).await?;
        let nominee_name = self.check_nominee(&input, existing.as_ref())?;
        self.check_history(&input.nominee_handle, now).await?;

        let finished_at = now + self.voting_duration;
        let due_date = finished_at.date_naive().and_time(
            NaiveTime::from_hms_opt(POLL_CLOSING_HOUR, 0, 0).unwrap_or(NaiveTime::MIN),
        );

        let poll = self
            .votes
            .create_poll(CreatePollRequest {
                name: nominee_name.clone(),
                description: format!(
                    "@{} nominates @{} as {}\n\nComment: {}",
                    nominator.telegram_nickname,
                    input.nominee_handle,
                    input.nominee_role,
                    input.comment
                ),
                due_date,
            })
            .await?;

        let proposal = proposal::Model {
            id: self.id_gen.generate(),
            nominator_id: nominator.id.clone(),
            nominee_name,
            nominee_telegram_nickname: input.nominee_handle,
            nominee_telegram_id: input
                .nominee_telegram_id
                .or_else(|| existing.as_ref().and_then(|u| u.telegram_id)),
            nominee_role: input.nominee_role,
            comment: input.comment,
            poll_id: poll.id,
            poll_chat_id: poll.chat_id,
            poll_message_id: poll.poll_message_id,
            discussion_message_id: poll.discussion_message_id,
            status: ProposalStatus::Created,
            created_at: now.into(),
            finished_at: finished_at.into(),
            updated_at: None,
        };

        let created = self.proposals.create(proposal).await?;
        tracing::info!(
            proposal_id = %created.id,
            nominator_id = %created.nominator_id,
            nominee = %created.nominee_telegram_nickname,
            role = %created.nominee_role,
            poll_id = created.poll_id,
            "Nomination submitted"
        );
        Ok(created)
    }

    /// Proposals still being voted on, oldest first.
    pub async fn pending(&self) -> AppResult<Vec<proposal::Model>> {
        self.proposals
            .find_by_status(&[ProposalStatus::Created])
            .await
    }

    /// Approved proposals, oldest first.
    pub async fn approved(&self) -> AppResult<Vec<proposal::Model>> {
        self.proposals
            .find_by_status(&[ProposalStatus::Approved])
            .await
    }

    /// Check the nominee against the target role and return the display name to use.
    fn check_nominee(
        &self,
        input: &NominationInput,
        existing: Option<&user::Model>,
    ) -> AppResult<String> {
        match (input.nominee_role, existing) {
            (NomineeRole::Member, Some(user)) if user.role != UserRole::Guest => {
                Err(AppError::Conflict(format!(
                    "@{} is already a {}",
                    input.nominee_handle, user.role
                )))
            }
            (NomineeRole::Member, _) => Ok(input.nominee_name.clone()),
            (NomineeRole::Seeder, Some(user)) if user.role == UserRole::Member => {
                Ok(user.name.clone())
            }
            (NomineeRole::Seeder, Some(user)) => Err(AppError::BadRequest(format!(
                "@{} is a {} and cannot be nominated as seeder",
                input.nominee_handle, user.role
            ))),
            (NomineeRole::Seeder, None) => Err(AppError::BadRequest(format!(
                "@{} is not a member of the community",
                input.nominee_handle
            ))),
        }
    }

    /// Refuse a nominee who is under vote or inside the re-nomination cooldown.
    async fn check_history(&self, handle: &str, now: DateTime<Utc>) -> AppResult<()> {
        let history = self.proposals.find_by_nominee_handle(handle).await?;

        if history.iter().any(|p| p.status == ProposalStatus::Created) {
            return Err(AppError::Conflict(format!(
                "@{handle} already has a nomination under vote"
            )));
        }

        let latest = history.iter().max_by_key(|p| p.created_at);
        if let Some(latest) = latest
            && matches!(
                latest.status,
                ProposalStatus::Rejected | ProposalStatus::NoQuorum
            )
            && latest.created_at > now - self.renomination_cooldown
        {
            return Err(AppError::Conflict(format!(
                "@{handle} was declined on {}; a new nomination is possible after {}",
                latest.created_at.date_naive(),
                (latest.created_at + self.renomination_cooldown).date_naive()
            )));
        }

        Ok(())
    }
}
