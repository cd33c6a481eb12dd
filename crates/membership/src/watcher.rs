//! Turns peer connect/disconnect events into reconnection retries.
//!
//! # Ownership
//!
//! The watcher is an actor: the address cache (`ServerId -> PeerAddress`) and
//! the tracked-connected set (`PeerId -> ServerId`) live inside its task and
//! nothing else writes them. Retriers receive an immutable copy of the one
//! address they need.
//!
//! # State evaluation
//!
//! For every change to either feed the watcher re-reads both for that peer:
//!
//! | identity | connection | action |
//! |---|---|---|
//! | present | present | cache address, track peer |
//! | absent | absent | if tracked: untrack, spawn retrier |
//! | one of the two | | transient, counted, no action |

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use corelib::{MapSubscription, PeerAddress, PeerId, ServerId, SubscribeMode, WatchableMap};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::address_book::{AddressBook, ConnectionPair};
use crate::backoff::BackoffPolicy;
use crate::config::MembershipConfig;
use crate::dialer::Dialer;
use crate::retrier::{ReconnectRetrier, RetryOutcome};

/// Counters describing what the watcher has done so far.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WatcherStats {
    pub retries_spawned: u64,
    pub retries_reconnected: u64,
    pub retries_cancelled: u64,
    /// Evaluations that found only one of identity/connection present.
    pub mixed_state_events: u64,
}

#[derive(Default)]
struct StatsCounters {
    retries_spawned: AtomicU64,
    retries_reconnected: AtomicU64,
    retries_cancelled: AtomicU64,
    mixed_state_events: AtomicU64,
}

impl StatsCounters {
    fn snapshot(&self) -> WatcherStats {
        WatcherStats {
            retries_spawned: self.retries_spawned.load(Ordering::Relaxed),
            retries_reconnected: self.retries_reconnected.load(Ordering::Relaxed),
            retries_cancelled: self.retries_cancelled.load(Ordering::Relaxed),
            mixed_state_events: self.mixed_state_events.load(Ordering::Relaxed),
        }
    }
}

struct InFlight {
    generation: u64,
    cancel: CancellationToken,
}

type Joined = (ServerId, u64, RetryOutcome);

/// Actor reacting to the address book. Create with [`ConnectionWatcher::new`],
/// start with [`ConnectionWatcher::spawn`].
pub struct ConnectionWatcher {
    book: Arc<AddressBook>,
    dialer: Arc<dyn Dialer>,
    policy: BackoffPolicy,
    cancel: CancellationToken,

    addresses: HashMap<ServerId, PeerAddress>,
    tracked: HashMap<PeerId, ServerId>,
    in_flight: HashMap<ServerId, InFlight>,
    next_generation: u64,
    retries: JoinSet<Joined>,

    active: Arc<WatchableMap<ServerId, u64>>,
    /// Published mirror of `tracked`, keyed by server.
    connected: Arc<WatchableMap<ServerId, PeerId>>,
    stats: Arc<StatsCounters>,
}

impl ConnectionWatcher {
    /// Build a watcher. Retriers get child tokens of `cancel`, so cancelling
    /// it stops the watcher and every retry it started.
    pub fn new(
        book: Arc<AddressBook>,
        dialer: Arc<dyn Dialer>,
        config: &MembershipConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            book,
            dialer,
            policy: config.backoff,
            cancel,
            addresses: HashMap::new(),
            tracked: HashMap::new(),
            in_flight: HashMap::new(),
            next_generation: 0,
            retries: JoinSet::new(),
            active: Arc::new(WatchableMap::new()),
            connected: Arc::new(WatchableMap::new()),
            stats: Arc::new(StatsCounters::default()),
        }
    }

    /// Start the actor on the current tokio runtime.
    ///
    /// Subscriptions are opened before returning: the connection feed replays
    /// existing connections, the identity feed only reports later changes.
    pub fn spawn(self) -> WatcherHandle {
        let identities = self.book.peer_to_server().subscribe(SubscribeMode::OnChange);
        let connections = self.book.connections().subscribe(SubscribeMode::Initial);

        let cancel = self.cancel.clone();
        let active = Arc::clone(&self.active);
        let connected = Arc::clone(&self.connected);
        let stats = Arc::clone(&self.stats);
        let task = tokio::spawn(self.run(identities, connections));
        WatcherHandle {
            cancel,
            active,
            connected,
            stats,
            task: Some(task),
        }
    }

    async fn run(
        mut self,
        mut identities: MapSubscription<PeerId, ServerId>,
        mut connections: MapSubscription<PeerId, ConnectionPair>,
    ) {
        tracing::debug!("connection watcher started");
        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => break,

                Some(change) = identities.next() => {
                    self.on_connect_or_disconnect(change.key);
                }

                Some(change) = connections.next() => {
                    self.on_connect_or_disconnect(change.key);
                }

                Some(joined) = self.retries.join_next(), if !self.retries.is_empty() => {
                    self.reap(joined);
                }

                else => break,
            }
        }

        // Stop every retrier and wait for it to exit.
        self.cancel.cancel();
        while let Some(joined) = self.retries.join_next().await {
            self.reap(joined);
        }
        tracing::debug!("connection watcher stopped");
    }

    fn on_connect_or_disconnect(&mut self, peer: PeerId) {
        let server = self.book.peer_to_server().get_key(&peer);
        let connection = self.book.connections().get_key(&peer);

        match (server, connection) {
            (Some(server), Some(connection)) => {
                self.addresses.insert(server, connection.address);
                self.tracked.insert(peer, server);
                self.connected.set_key(server, peer);
            }
            (None, None) => {
                if let Some(server) = self.tracked.remove(&peer) {
                    if self.connected.get_key(&server) == Some(peer) {
                        self.connected.delete_key(&server);
                    }
                    self.spawn_retry(server);
                }
            }
            (Some(_), None) | (None, Some(_)) => {
                self.stats.mixed_state_events.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("membership_mixed_state_total").increment(1);
                tracing::trace!(peer = %peer, "peer identity and connection not yet converged");
            }
        }
    }

    fn spawn_retry(&mut self, server: ServerId) {
        let Some(address) = self.addresses.get(&server).cloned() else {
            tracing::error!(server = %server, "disconnected server has no last known address");
            panic!("no last known address for server {}", server);
        };

        // A previous retrier already saw this server reconnect; make sure it
        // is gone before its successor starts.
        if let Some(previous) = self.in_flight.remove(&server) {
            previous.cancel.cancel();
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        let cancel = self.cancel.child_token();
        let retrier = ReconnectRetrier::new(
            server,
            address.clone(),
            &self.book,
            Arc::clone(&self.dialer),
            self.policy,
            cancel.clone(),
        );

        self.in_flight.insert(server, InFlight { generation, cancel });
        self.active.set_key(server, generation);
        self.retries
            .spawn(async move { (server, generation, retrier.run().await) });

        self.stats.retries_spawned.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("membership_reconnect_spawned_total").increment(1);
        tracing::info!(server = %server, address = %address, "server disconnected, retrying");
    }

    fn reap(&mut self, joined: Result<Joined, JoinError>) {
        let (server, generation, outcome) = match joined {
            Ok(joined) => joined,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => {
                tracing::warn!(error = %err, "reconnect task aborted");
                return;
            }
        };

        match outcome {
            RetryOutcome::Reconnected { .. } => {
                self.stats.retries_reconnected.fetch_add(1, Ordering::Relaxed);
            }
            RetryOutcome::Cancelled { .. } => {
                self.stats.retries_cancelled.fetch_add(1, Ordering::Relaxed);
            }
        }

        let current = self
            .in_flight
            .get(&server)
            .map_or(false, |in_flight| in_flight.generation == generation);
        if !current {
            return;
        }
        self.in_flight.remove(&server);
        self.active.delete_key(&server);

        // The reconnection the retrier saw may already be gone again. If no
        // peer carries the server and none is tracked, nothing else will
        // notice the loss, so keep retrying.
        if matches!(outcome, RetryOutcome::Reconnected { .. })
            && !self.cancel.is_cancelled()
            && self.book.peer_for(&server).is_none()
            && !self.tracked.values().any(|tracked| *tracked == server)
        {
            tracing::debug!(server = %server, "reconnection did not last, retrying again");
            self.spawn_retry(server);
        }
    }
}

/// Handle to a running [`ConnectionWatcher`].
///
/// Dropping the handle leaves the watcher running until its token is
/// cancelled.
pub struct WatcherHandle {
    cancel: CancellationToken,
    active: Arc<WatchableMap<ServerId, u64>>,
    connected: Arc<WatchableMap<ServerId, PeerId>>,
    stats: Arc<StatsCounters>,
    task: Option<JoinHandle<()>>,
}

impl WatcherHandle {
    pub fn stats(&self) -> WatcherStats {
        self.stats.snapshot()
    }

    /// Servers with a retrier in flight.
    pub fn active_retries(&self) -> Vec<ServerId> {
        self.active.snapshot().into_keys().collect()
    }

    /// Feed of in-flight retriers, valued by spawn generation.
    pub fn active_feed(&self) -> &WatchableMap<ServerId, u64> {
        &self.active
    }

    /// Servers the watcher has seen fully connected and not yet lost.
    pub fn tracked_servers(&self) -> Vec<ServerId> {
        self.connected.snapshot().into_keys().collect()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the watcher and every retrier, then wait for them to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                if err.is_panic() {
                    std::panic::resume_unwind(err.into_panic());
                }
            }
        }
    }
}
