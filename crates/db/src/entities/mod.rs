//! Database entities.

pub mod proposal;
pub mod user;

pub use proposal::Entity as Proposal;
pub use user::Entity as User;
