//! Operator tool for the cluster membership and replica-role layers.
//!
//! Provides commands for:
//! - Printing the reconnection backoff schedule
//! - Simulating servers flapping against the connection watcher
//! - Encoding and inspecting business cards

pub mod commands;
pub mod config;

pub use commands::Command;
pub use config::CliConfig;
