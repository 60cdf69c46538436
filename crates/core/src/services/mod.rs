//! Business logic services.

#![allow(missing_docs)]

pub mod bootstrap;
pub mod deadline;
pub mod messenger;
pub mod nomination;
pub mod notification;
pub mod settlement;
pub mod store;
pub mod tally;
pub mod vote_source;

#[cfg(test)]
pub(crate) mod testing;

pub use bootstrap::{BootstrapReport, SeederBootstrap};
pub use messenger::{Messenger, OutboundMessage, TelegramMessenger};
pub use nomination::{NominationInput, NominationService, normalize_handle};
pub use notification::{DispatchReport, NotificationDispatcher, NotificationSettings};
pub use settlement::{SettlementReport, SettlementService};
pub use store::{ProposalStore, UserStore};
pub use tally::{Ballot, Outcome, Tally, TallyThresholds, VoterStanding, tally};
pub use vote_source::{
    CreatePollRequest, HttpVoteSource, PollRef, Vote, VoteChoice, VoteSource, VoterId,
};
