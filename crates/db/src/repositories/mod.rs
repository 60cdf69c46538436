//! Repositories over the `user` and `proposal` tables.

pub mod proposal;
pub mod user;

pub use proposal::ProposalRepository;
pub use user::UserRepository;
