//! Replica roles a node publishes for the regions it is responsible for.
//!
//! This crate provides the business card model and its plumbing:
//! - What role a node plays per region (`ActivityState`)
//! - The per-namespace card that carries those roles (`BusinessCard`)
//! - The versioned wire codec cards travel in
//! - A directory of peers' cards with the data-safety checks built on it

pub mod activity;
pub mod card;
pub mod codec;
pub mod directory;
pub mod error;
pub mod handles;
pub mod publisher;

pub use activity::{ActivityKind, ActivityState, BackfillLocation};
pub use card::{Activity, BusinessCard, BusinessCardBuilder};
pub use directory::{CardDirectory, TransitionNote};
pub use error::{ReplicationError, Result};
pub use handles::{BackfillerCard, BroadcasterCard, MailboxAddress, QueryRouterCard, ReplierCard};
pub use publisher::CardPublisher;
