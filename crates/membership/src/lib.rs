//! Cluster membership: keeping contact with known servers.
//!
//! This crate reacts to peers connecting and disconnecting and keeps trying
//! to reach servers that dropped off:
//! - `AddressBook` mirrors which peer each server is connected as
//! - `ConnectionWatcher` caches addresses and spawns retriers
//! - `ReconnectRetrier` dials with bounded exponential backoff
//! - `NetworkLogger` reports servers coming and going

pub mod address_book;
pub mod backoff;
pub mod config;
pub mod dialer;
pub mod error;
pub mod network_logger;
pub mod retrier;
pub mod watcher;

pub use address_book::{AddressBook, ConnectionPair};
pub use backoff::{Backoff, BackoffPolicy};
pub use config::MembershipConfig;
pub use dialer::{Dialer, RecordingDialer};
pub use error::ConfigError;
pub use network_logger::NetworkLogger;
pub use retrier::{ReconnectRetrier, RetryOutcome};
pub use watcher::{ConnectionWatcher, WatcherHandle, WatcherStats};
