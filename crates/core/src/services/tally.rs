//! Quorum and outcome calculation.
//!
//! [`tally`] is a pure function of the ballots, the size of the seeder roster
//! and the governance thresholds. It never fails and always lands on one of
//! the three terminal outcomes.

use std::collections::HashSet;

use accord_common::{GovernanceConfig, UnresolvedVoterPolicy};
use accord_db::entities::proposal::ProposalStatus;

use super::vote_source::{VoteChoice, VoterId};

/// Thresholds consumed by the tally.
#[derive(Debug, Clone, PartialEq)]
pub struct TallyThresholds {
    pub quorum_fraction: f64,
    pub max_required_seeders: u32,
    pub min_yes_fraction: f64,
    pub min_absolute_yes_votes: u32,
    pub yes_override_fraction: f64,
    pub unresolved_voters: UnresolvedVoterPolicy,
}

impl From<&GovernanceConfig> for TallyThresholds {
    fn from(config: &GovernanceConfig) -> Self {
        Self {
            quorum_fraction: config.quorum_fraction,
            max_required_seeders: config.max_required_seeders,
            min_yes_fraction: config.min_yes_fraction,
            min_absolute_yes_votes: config.min_absolute_yes_votes,
            yes_override_fraction: config.yes_override_fraction,
            unresolved_voters: config.unresolved_voters,
        }
    }
}

impl Default for TallyThresholds {
    fn default() -> Self {
        Self::from(&GovernanceConfig::default())
    }
}

/// What the voter's identity resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoterStanding {
    /// A user holding the `seeder` role.
    Seeder { user_id: String },
    /// A known user without the `seeder` role.
    Known { user_id: String },
    /// No user matches the identity.
    Unresolved,
}

/// A vote paired with its resolved voter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ballot {
    pub voter: VoterId,
    pub choice: VoteChoice,
    pub standing: VoterStanding,
}

impl Ballot {
    /// Whether the ballot takes part in the yes/no totals under `policy`.
    #[must_use]
    pub fn is_counted(&self, policy: UnresolvedVoterPolicy) -> bool {
        !matches!(
            (&self.standing, policy),
            (VoterStanding::Unresolved, UnresolvedVoterPolicy::Exclude)
        )
    }
}

/// Final decision for a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Approved,
    Rejected,
    NoQuorum,
}

impl From<Outcome> for ProposalStatus {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Approved => Self::Approved,
            Outcome::Rejected => Self::Rejected,
            Outcome::NoQuorum => Self::NoQuorum,
        }
    }
}

/// Counts and derived thresholds behind an outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tally {
    pub yes: usize,
    pub no: usize,
    /// Distinct seeders who cast any ballot.
    pub voted_seeders: usize,
    pub min_required_seeders: usize,
    pub min_required_yes: usize,
    pub min_yes_to_override: usize,
    pub outcome: Outcome,
}

/// Round half away from zero on a non-negative product.
fn round_count(value: f64) -> usize {
    value.max(0.0).round() as usize
}

/// Decide a proposal from its ballots.
#[must_use]
pub fn tally(ballots: &[Ballot], total_seeders: usize, thresholds: &TallyThresholds) -> Tally {
    let min_required_seeders = round_count(total_seeders as f64 * thresholds.quorum_fraction)
        .min(thresholds.max_required_seeders as usize);
    let min_yes_to_override = round_count(total_seeders as f64 * thresholds.yes_override_fraction);

    let mut yes = 0;
    let mut no = 0;
    for ballot in ballots
        .iter()
        .filter(|b| b.is_counted(thresholds.unresolved_voters))
    {
        match ballot.choice {
            VoteChoice::Yes => yes += 1,
            VoteChoice::No => no += 1,
            VoteChoice::Other => {}
        }
    }

    let voted_seeders = ballots
        .iter()
        .filter_map(|b| match &b.standing {
            VoterStanding::Seeder { user_id } => Some(user_id.as_str()),
            _ => None,
        })
        .collect::<HashSet<_>>()
        .len();

    let min_required_yes = round_count((yes + no) as f64 * thresholds.min_yes_fraction)
        .max(thresholds.min_absolute_yes_votes as usize);

    let outcome = if voted_seeders < min_required_seeders {
        Outcome::NoQuorum
    } else if yes < min_required_yes || (no > 0 && yes < min_yes_to_override) {
        Outcome::Rejected
    } else {
        Outcome::Approved
    };

    Tally {
        yes,
        no,
        voted_seeders,
        min_required_seeders,
        min_required_yes,
        min_yes_to_override,
        outcome,
    }
}
