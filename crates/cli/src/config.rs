//! Command-line configuration.
//!
//! Settings come from the membership JSON file first; flags and their
//! `CLUSTERCTL_*` environment variables override individual values.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use membership::MembershipConfig;

use crate::commands::Command;

/// Cluster membership and replica-role tool.
#[derive(Parser, Debug)]
#[command(name = "clusterctl", version, about)]
pub struct CliConfig {
    /// Membership config file (JSON). Missing file means defaults.
    #[arg(
        short,
        long,
        env = "CLUSTERCTL_CONFIG",
        default_value = "membership.json",
        global = true
    )]
    pub config: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Override the first reconnection delay
    #[arg(long, env = "CLUSTERCTL_INITIAL_BACKOFF_MS", global = true)]
    pub initial_backoff_ms: Option<u64>,

    /// Override the reconnection delay cap
    #[arg(long, env = "CLUSTERCTL_MAX_BACKOFF_MS", global = true)]
    pub max_backoff_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

impl CliConfig {
    /// Default log directive for this invocation.
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "info"
        }
    }

    /// Load the membership config and apply flag overrides.
    pub fn membership(&self) -> anyhow::Result<MembershipConfig> {
        let mut config = MembershipConfig::load_or_default(&self.config)
            .with_context(|| format!("loading {}", self.config.display()))?;
        if let Some(initial_ms) = self.initial_backoff_ms {
            config.backoff.initial_ms = initial_ms;
        }
        if let Some(max_ms) = self.max_backoff_ms {
            config.backoff.max_ms = max_ms;
        }
        config.validate().context("invalid backoff settings")?;
        Ok(config)
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let membership = self.membership()?;
        self.command.run(&membership).await
    }
}
