//! Core governance logic for accord.
//!
//! The settlement pass turns expired proposals into final statuses:
//! [`services::tally`] is the pure outcome calculator,
//! [`SettlementService`] orchestrates a pass, and
//! [`NotificationDispatcher`] tells the people involved. Storage, the
//! external vote service and chat delivery sit behind the traits in
//! [`services::store`], [`services::vote_source`] and [`services::messenger`].

pub mod services;

pub use services::*;
