//! Subcommands.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Subcommand;
use corelib::{
    ActivityId, BackfillSessionId, BranchId, PeerAddress, PeerId, Region, RegionMap, ServerId,
    Version, VersionRange,
};
use membership::{
    AddressBook, Backoff, ConnectionWatcher, MembershipConfig, NetworkLogger, RecordingDialer,
};
use parking_lot::Mutex;
use replication::{
    codec, ActivityState, BackfillLocation, BackfillerCard, BusinessCard, MailboxAddress,
    ReplierCard,
};
use tokio_util::sync::CancellationToken;

/// First port handed out to simulated servers.
const SIMULATED_BASE_PORT: u16 = 29015;

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the reconnection delays the configured policy produces
    Backoff {
        /// Number of delays to print
        #[arg(short = 'n', long, default_value_t = 20)]
        steps: usize,
    },

    /// Run a watcher against simulated servers that drop and come back
    Simulate {
        /// Simulated servers
        #[arg(long, default_value_t = 3)]
        servers: u16,

        /// Disconnect rounds
        #[arg(long, default_value_t = 2)]
        flaps: u32,

        /// Dials a server needs before it answers
        #[arg(long, default_value_t = 3)]
        answer_after: u32,
    },

    /// Build a sample business card and show its encodings
    Card {
        /// Print the binary encoding as hex as well
        #[arg(long)]
        hex: bool,
    },
}

impl Command {
    pub async fn run(&self, config: &MembershipConfig) -> anyhow::Result<()> {
        match self {
            Command::Backoff { steps } => {
                print_backoff(config, *steps);
                Ok(())
            }
            Command::Simulate {
                servers,
                flaps,
                answer_after,
            } => simulate(config, *servers, *flaps, *answer_after).await,
            Command::Card { hex } => print_card(*hex),
        }
    }
}

fn print_backoff(config: &MembershipConfig, steps: usize) {
    let mut elapsed = Duration::ZERO;
    for (attempt, delay) in Backoff::schedule(config.backoff).take(steps).enumerate() {
        elapsed += delay;
        println!(
            "attempt {:>3}  wait {:>6} ms  total {:>8} ms",
            attempt + 1,
            delay.as_millis(),
            elapsed.as_millis()
        );
    }
}

/// Connect `servers` simulated servers, drop them all `flaps` times and wait
/// for the watcher to bring each one back.
async fn simulate(
    config: &MembershipConfig,
    servers: u16,
    flaps: u32,
    answer_after: u32,
) -> anyhow::Result<()> {
    if servers == 0 || answer_after == 0 {
        bail!("--servers and --answer-after must be positive");
    }

    let book = Arc::new(AddressBook::new());
    let mut directory: HashMap<PeerAddress, ServerId> = HashMap::new();
    for index in 0..servers {
        let port = SIMULATED_BASE_PORT
            .checked_add(index)
            .context("too many simulated servers")?;
        let address = PeerAddress::new(SocketAddr::from((Ipv4Addr::LOCALHOST, port)));
        directory.insert(address, ServerId(u128::from(index) + 1));
    }

    let hook_book = Arc::clone(&book);
    let hook_directory = directory.clone();
    let dials: Mutex<HashMap<ServerId, u32>> = Mutex::new(HashMap::new());
    let dialer = Arc::new(RecordingDialer::with_hook(move |address: &PeerAddress| {
        let Some(&server) = hook_directory.get(address) else {
            return;
        };
        let answered = {
            let mut dials = dials.lock();
            let count = dials.entry(server).or_insert(0);
            *count += 1;
            if *count >= answer_after {
                *count = 0;
                true
            } else {
                false
            }
        };
        if answered {
            hook_book.connect(PeerId::generate(), server, address.clone());
        }
    }));

    let cancel = CancellationToken::new();
    let logger = NetworkLogger::new(config.local_server, Arc::clone(&book));
    let logger_task = logger.spawn(cancel.child_token());
    let watcher = ConnectionWatcher::new(
        Arc::clone(&book),
        dialer.clone(),
        config,
        cancel.child_token(),
    )
    .spawn();

    for (address, server) in &directory {
        book.connect(PeerId::generate(), *server, address.clone());
    }

    // Enough time for every dial a server needs plus slack.
    let round_budget: Duration = Backoff::schedule(config.backoff)
        .take(answer_after as usize)
        .sum::<Duration>()
        + Duration::from_secs(1);

    let everyone = usize::from(servers);
    for round in 1..=flaps {
        wait_for(round_budget, || watcher.tracked_servers().len() == everyone)
            .await
            .with_context(|| format!("round {} started before every server was tracked", round))?;

        tracing::info!(round, "dropping every server");
        for server in directory.values() {
            if let Some(peer) = book.peer_for(server) {
                book.disconnect(peer);
            }
        }

        let expected = u64::from(servers) * u64::from(round);
        wait_for(round_budget, || watcher.stats().retries_reconnected >= expected)
            .await
            .with_context(|| format!("round {} did not reconnect in {:?}", round, round_budget))?;
    }

    let stats = watcher.stats();
    watcher.shutdown().await;
    cancel.cancel();
    logger_task.await.context("network logger task failed")?;

    println!("servers              {}", servers);
    println!("rounds               {}", flaps);
    println!("dials                {}", dialer.attempt_count());
    println!("retries spawned      {}", stats.retries_spawned);
    println!("retries reconnected  {}", stats.retries_reconnected);
    println!("retries cancelled    {}", stats.retries_cancelled);
    println!("mixed states seen    {}", stats.mixed_state_events);
    Ok(())
}

/// Poll `done` until it holds or `budget` runs out.
async fn wait_for(
    budget: Duration,
    mut done: impl FnMut() -> bool,
) -> Result<(), tokio::time::error::Elapsed> {
    tokio::time::timeout(budget, async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
}

fn sample_card() -> anyhow::Result<BusinessCard> {
    let local = PeerId(1);
    let backfiller = BackfillerCard {
        backfill: MailboxAddress::new(local, 0, 1),
        cancel_backfill: MailboxAddress::new(local, 0, 2),
    };
    let half = 1u64 << 63;
    let handoff = half - (1 << 32);

    let card = BusinessCard::builder()
        .activity(
            ActivityId(1),
            Region::new(0, Some(handoff))?,
            ActivityState::SecondaryUpToDate {
                branch: BranchId(7),
                replier: ReplierCard {
                    synchronize: MailboxAddress::new(local, 0, 3),
                    backfiller: backfiller.clone(),
                },
            },
        )
        .activity(
            ActivityId(2),
            Region::new(half, None)?,
            ActivityState::NothingPending {
                current_state: RegionMap::single(
                    Region::new(half, None)?,
                    VersionRange::at(Version::new(BranchId(7), 12)),
                ),
                backfiller,
            },
        )
        .activity(
            ActivityId(3),
            Region::new(handoff, Some(half))?,
            ActivityState::SecondaryBackfilling {
                backfill: BackfillLocation::new(BackfillSessionId(9), PeerId(2), ActivityId(4)),
            },
        )
        .build()?;
    Ok(card)
}

fn print_card(hex: bool) -> anyhow::Result<()> {
    let card = sample_card()?;
    let bytes = codec::encode(&card)?;
    let decoded = codec::decode(&bytes)?;
    if decoded != card {
        bail!("card changed across encoding");
    }

    println!("{}", codec::to_json(&decoded)?);
    println!("encoded: {} bytes, format {}", bytes.len(), codec::CARD_FORMAT_VERSION);
    if hex {
        let text: String = bytes.iter().map(|byte| format!("{:02x}", byte)).collect();
        println!("{}", text);
    }
    Ok(())
}
