//! Core library for the cluster membership and replica-role layer.
//!
//! This crate provides the fundamental abstractions shared by every other
//! crate in the workspace:
//! - Server, peer and activity identities
//! - Peer network addresses
//! - Regions of the keyspace and version bookkeeping
//! - The `WatchableMap` change feed that replaces callback subscriptions

pub mod error;
pub mod node;
pub mod region;
pub mod watchable;

pub use error::{Error, Result};
pub use node::{ActivityId, BackfillSessionId, BranchId, PeerAddress, PeerId, ServerId};
pub use region::{Region, RegionMap, Version, VersionRange};
pub use watchable::{Change, MapSubscription, SubscribeMode, WatchableMap};
