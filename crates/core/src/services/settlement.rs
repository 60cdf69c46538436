//! Proposal settlement.
//!
//! A settlement pass picks up every open proposal whose voting window has
//! closed, tallies its poll and commits the outcome. Failures for one
//! proposal are logged and leave it for the next pass; only failing to load
//! the seeder roster or the open proposals aborts the pass.

use std::{collections::HashMap, sync::Arc, time::Duration};

use accord_common::{AppResult, IdGenerator};
use accord_db::entities::{
    proposal::{self, NomineeRole, ProposalStatus},
    user::{self, UserRole},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::{
    deadline::within,
    notification::NotificationDispatcher,
    store::{ProposalStore, UserStore},
    tally::{Ballot, Outcome, Tally, TallyThresholds, VoterStanding, tally},
    vote_source::{Vote, VoteChoice, VoteSource, VoterId},
};

/// Summary of one settlement pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SettlementReport {
    /// Open proposals loaded.
    pub examined: usize,
    /// Open proposals past their deadline.
    pub due: usize,
    pub approved: usize,
    pub rejected: usize,
    pub no_quorum: usize,
    pub vote_fetch_failures: usize,
    pub persistence_failures: usize,
    /// Approved proposals whose nominee record could not be written.
    pub promotion_failures: usize,
    pub notifications_sent: usize,
    pub notifications_failed: usize,
}

impl SettlementReport {
    /// Proposals that reached a terminal status in this pass.
    #[must_use]
    pub const fn settled(&self) -> usize {
        self.approved + self.rejected + self.no_quorum
    }

    fn count(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Approved => self.approved += 1,
            Outcome::Rejected => self.rejected += 1,
            Outcome::NoQuorum => self.no_quorum += 1,
        }
    }
}

/// A due proposal with its computed outcome, not yet persisted.
struct Decision {
    proposal: proposal::Model,
    ballots: Vec<Ballot>,
    tally: Tally,
}

/// Settles proposals whose voting window has closed.
#[derive(Clone)]
pub struct SettlementService {
    users: Arc<dyn UserStore>,
    proposals: Arc<dyn ProposalStore>,
    votes: Arc<dyn VoteSource>,
    notifier: NotificationDispatcher,
    thresholds: TallyThresholds,
    io_timeout: Duration,
    id_gen: IdGenerator,
}

impl SettlementService {
    /// Create a new settlement service.
    #[must_use]
    pub fn new(
        users: Arc<dyn UserStore>,
        proposals: Arc<dyn ProposalStore>,
        votes: Arc<dyn VoteSource>,
        notifier: NotificationDispatcher,
        thresholds: TallyThresholds,
        io_timeout: Duration,
    ) -> Self {
        Self {
            users,
            proposals,
            votes,
            notifier,
            thresholds,
            io_timeout,
            id_gen: IdGenerator::new(),
        }
    }

    /// Run one settlement pass as of `now`.
    pub async fn run_pass(&self, now: DateTime<Utc>) -> AppResult<SettlementReport> {
        let seeders = within(
            self.io_timeout,
            "seeder roster load",
            self.users.find_by_role(UserRole::Seeder),
        )
        .await?;

        let open = within(
            self.io_timeout,
            "open proposal load",
            self.proposals.find_by_status(&[ProposalStatus::Created]),
        )
        .await?;

        let mut report = SettlementReport {
            examined: open.len(),
            ..SettlementReport::default()
        };

        tracing::info!(
            seeders = seeders.len(),
            open = open.len(),
            "Starting settlement pass"
        );

        let mut resolver = VoterResolver::new(&seeders);
        let mut decisions = Vec::new();

        for proposal in open {
            if proposal.finished_at > now {
                continue;
            }
            report.due += 1;

            let votes = match within(
                self.io_timeout,
                "vote fetch",
                self.votes.get_votes(proposal.poll_id),
            )
            .await
            {
                Ok(votes) => votes,
                Err(e) => {
                    tracing::warn!(
                        proposal_id = %proposal.id,
                        poll_id = proposal.poll_id,
                        error = %e,
                        "Failed to fetch votes, retrying next pass"
                    );
                    report.vote_fetch_failures += 1;
                    continue;
                }
            };

            let ballots = resolver.resolve(self, votes).await;
            let tally = tally(&ballots, seeders.len(), &self.thresholds);

            tracing::debug!(
                proposal_id = %proposal.id,
                yes = tally.yes,
                no = tally.no,
                voted_seeders = tally.voted_seeders,
                min_required_seeders = tally.min_required_seeders,
                min_required_yes = tally.min_required_yes,
                min_yes_to_override = tally.min_yes_to_override,
                outcome = ?tally.outcome,
                "Proposal tallied"
            );

            decisions.push(Decision {
                proposal,
                ballots,
                tally,
            });
        }

        for decision in decisions {
            self.commit(decision, &mut report).await;
        }

        tracing::info!(
            due = report.due,
            approved = report.approved,
            rejected = report.rejected,
            no_quorum = report.no_quorum,
            vote_fetch_failures = report.vote_fetch_failures,
            persistence_failures = report.persistence_failures,
            promotion_failures = report.promotion_failures,
            "Settlement pass finished"
        );

        Ok(report)
    }

    /// Persist one decision, apply approval side effects, then notify.
    async fn commit(&self, decision: Decision, report: &mut SettlementReport) {
        let Decision {
            proposal,
            ballots,
            tally,
        } = decision;
        let status = ProposalStatus::from(tally.outcome);

        let settled = match within(
            self.io_timeout,
            "proposal persistence",
            self.proposals.settle(&proposal.id, status),
        )
        .await
        {
            Ok(settled) => settled,
            Err(e) => {
                tracing::error!(
                    proposal_id = %proposal.id,
                    status = %status,
                    error = %e,
                    "Failed to persist proposal status"
                );
                report.persistence_failures += 1;
                return;
            }
        };
        report.count(tally.outcome);

        let nominee = if tally.outcome == Outcome::Approved {
            match self.apply_approval(&settled, &ballots).await {
                Ok(nominee) => Some(nominee),
                Err(e) => {
                    tracing::error!(
                        proposal_id = %settled.id,
                        nominee = %settled.nominee_telegram_nickname,
                        error = %e,
                        "Failed to record approved nominee, skipping notifications"
                    );
                    report.promotion_failures += 1;
                    return;
                }
            }
        } else {
            None
        };

        tracing::info!(
            proposal_id = %settled.id,
            nominee = %settled.nominee_telegram_nickname,
            status = %settled.status,
            "Proposal settled"
        );

        let delivery = self.notifier.dispatch(&settled, nominee.as_ref()).await;
        report.notifications_sent += delivery.sent;
        report.notifications_failed += delivery.failed;
    }

    /// Create or promote the nominee of an approved proposal.
    async fn apply_approval(
        &self,
        proposal: &proposal::Model,
        ballots: &[Ballot],
    ) -> AppResult<user::Model> {
        let backers = Value::Array(
            ballots
                .iter()
                .filter(|b| b.choice == VoteChoice::Yes)
                .filter(|b| b.is_counted(self.thresholds.unresolved_voters))
                .map(|b| b.voter.to_json())
                .collect(),
        );

        let existing = match proposal.nominee_telegram_id {
            Some(telegram_id) => {
                within(
                    self.io_timeout,
                    "nominee lookup",
                    self.users.find_by_telegram_id(telegram_id),
                )
                .await?
            }
            None => None,
        };
        let existing = match existing {
            Some(user) => Some(user),
            None => {
                within(
                    self.io_timeout,
                    "nominee lookup",
                    self.users.find_by_handle(&proposal.nominee_telegram_nickname),
                )
                .await?
            }
        };

        match existing {
            None => {
                let now = Utc::now();
                let guest = user::Model {
                    id: self.id_gen.generate(),
                    name: proposal.nominee_name.clone(),
                    telegram_id: proposal.nominee_telegram_id,
                    telegram_nickname: proposal.nominee_telegram_nickname.clone(),
                    discord_id: None,
                    role: UserRole::Guest,
                    backers_id: backers,
                    members_invite_link: None,
                    seeders_invite_link: None,
                    created_at: now.into(),
                    updated_at: None,
                };
                let created =
                    within(self.io_timeout, "nominee creation", self.users.create(guest)).await?;
                tracing::info!(user_id = %created.id, nickname = %created.telegram_nickname, "Guest user created");
                Ok(created)
            }
            Some(mut user) if proposal.nominee_role == NomineeRole::Seeder => {
                user.role = UserRole::Seeder;
                user.backers_id = backers;
                user.updated_at = Some(Utc::now().into());
                let promoted =
                    within(self.io_timeout, "nominee promotion", self.users.update(user)).await?;
                tracing::info!(user_id = %promoted.id, "User promoted to seeder");
                Ok(promoted)
            }
            Some(user) => {
                tracing::info!(
                    user_id = %user.id,
                    role = %user.role,
                    "Nominee already has an account, leaving it unchanged"
                );
                Ok(user)
            }
        }
    }
}

/// Resolves voter identities to users, once per identity and pass.
struct VoterResolver {
    by_telegram_id: HashMap<i64, String>,
    by_nickname: HashMap<String, String>,
    cache: HashMap<VoterId, VoterStanding>,
}

impl VoterResolver {
    fn new(seeders: &[user::Model]) -> Self {
        let mut by_telegram_id = HashMap::new();
        let mut by_nickname = HashMap::new();
        for seeder in seeders {
            if let Some(telegram_id) = seeder.telegram_id {
                by_telegram_id.insert(telegram_id, seeder.id.clone());
            }
            by_nickname.insert(seeder.telegram_nickname.to_lowercase(), seeder.id.clone());
        }

        Self {
            by_telegram_id,
            by_nickname,
            cache: HashMap::new(),
        }
    }

    async fn resolve(&mut self, service: &SettlementService, votes: Vec<Vote>) -> Vec<Ballot> {
        let mut ballots = Vec::with_capacity(votes.len());
        for vote in votes {
            let standing = self.standing(service, &vote).await;
            ballots.push(Ballot {
                voter: vote.voter,
                choice: vote.choice,
                standing,
            });
        }
        ballots
    }

    async fn standing(&mut self, service: &SettlementService, vote: &Vote) -> VoterStanding {
        let voter = &vote.voter;
        if let Some(standing) = self.cache.get(voter) {
            return standing.clone();
        }

        let roster_hit = match voter {
            VoterId::Telegram(id) => self.by_telegram_id.get(id).or_else(|| {
                vote.nickname
                    .as_ref()
                    .and_then(|nickname| self.by_nickname.get(nickname))
            }),
            VoterId::Nickname(nickname) => self.by_nickname.get(nickname),
        };
        if let Some(user_id) = roster_hit {
            return VoterStanding::Seeder {
                user_id: user_id.clone(),
            };
        }

        let mut lookup = match voter {
            VoterId::Telegram(id) => {
                within(
                    service.io_timeout,
                    "voter lookup",
                    service.users.find_by_telegram_id(*id),
                )
                .await
            }
            VoterId::Nickname(nickname) => {
                within(
                    service.io_timeout,
                    "voter lookup",
                    service.users.find_by_handle(nickname),
                )
                .await
            }
        };

        // Accounts created from a nomination may know only the nickname
        if let (Ok(None), Some(nickname)) = (&lookup, &vote.nickname) {
            lookup = within(
                service.io_timeout,
                "voter lookup",
                service.users.find_by_handle(nickname),
            )
            .await;
        }

        let standing = match lookup {
            Ok(Some(user)) if user.role == UserRole::Seeder => VoterStanding::Seeder { user_id: user.id },
            Ok(Some(user)) => VoterStanding::Known { user_id: user.id },
            Ok(None) => {
                tracing::warn!(voter = %voter, "Vote from an unknown identity");
                VoterStanding::Unresolved
            }
            Err(e) => {
                // Lookup failures are not cached so the next proposal retries
                tracing::warn!(voter = %voter, error = %e, "Voter lookup failed");
                return VoterStanding::Unresolved;
            }
        };

        self.cache.insert(voter.clone(), standing.clone());
        standing
    }
}
