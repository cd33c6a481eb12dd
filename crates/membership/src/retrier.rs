//! Reconnection retry loop for one disconnected server.
//!
//! # Algorithm
//!
//! 1. Ask the dialer to join the server's last known address (fire-and-forget)
//! 2. Wait for whichever comes first:
//!    - the server is mapped to a live peer again
//!    - the retry is cancelled
//!    - the backoff timer elapses
//! 3. On reconnection or cancellation stop; on timeout grow the backoff and
//!    go back to 1
//!
//! Running out of patience is not an outcome: the loop keeps dialing at the
//! capped delay until one of the two stop signals arrives.

use std::sync::Arc;

use corelib::{MapSubscription, PeerAddress, PeerId, ServerId, SubscribeMode};
use tokio_util::sync::CancellationToken;

use crate::address_book::AddressBook;
use crate::backoff::{Backoff, BackoffPolicy};
use crate::dialer::Dialer;

/// How a retry loop ended. Neither case is an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryOutcome {
    /// The server regained a live peer mapping.
    Reconnected { attempts: u32 },
    /// The owner stopped the retry.
    Cancelled { attempts: u32 },
}

impl RetryOutcome {
    /// Dial attempts issued before the loop stopped.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Reconnected { attempts } | RetryOutcome::Cancelled { attempts } => {
                *attempts
            }
        }
    }
}

/// Background retry task for a single server.
///
/// Holds an immutable snapshot of the server's last known address; it never
/// touches the watcher's address cache.
pub struct ReconnectRetrier {
    server: ServerId,
    address: PeerAddress,
    dialer: Arc<dyn Dialer>,
    policy: BackoffPolicy,
    cancel: CancellationToken,
    reconnected: MapSubscription<ServerId, PeerId>,
    /// The server already had a live peer when the retrier was built.
    connected_at_start: bool,
}

impl ReconnectRetrier {
    /// Prepare a retrier.
    ///
    /// Subscribes to the server-to-peer feed immediately, so a reconnection
    /// that lands before the task first runs is still observed. A server that
    /// is already mapped to a peer at this point counts as reconnected.
    pub fn new(
        server: ServerId,
        address: PeerAddress,
        book: &AddressBook,
        dialer: Arc<dyn Dialer>,
        policy: BackoffPolicy,
        cancel: CancellationToken,
    ) -> Self {
        // Subscribe before reading so no mapping falls between the two.
        let reconnected = book.server_to_peer().subscribe(SubscribeMode::OnChange);
        let connected_at_start = book.peer_for(&server).is_some();
        Self {
            server,
            address,
            dialer,
            policy,
            cancel,
            reconnected,
            connected_at_start,
        }
    }

    pub fn server(&self) -> ServerId {
        self.server
    }

    /// Run until reconnected or cancelled.
    pub async fn run(mut self) -> RetryOutcome {
        let mut backoff = Backoff::new(self.policy);
        let mut attempts = 0u32;

        if self.connected_at_start {
            return self.finish(RetryOutcome::Reconnected { attempts });
        }

        loop {
            // A cancelled retrier must not dial again.
            if self.cancel.is_cancelled() {
                return self.finish(RetryOutcome::Cancelled { attempts });
            }

            self.dialer.join(&self.address);
            attempts += 1;
            tracing::debug!(
                server = %self.server,
                address = %self.address,
                attempt = attempts,
                backoff = ?backoff.current(),
                "dialing disconnected server"
            );

            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    return self.finish(RetryOutcome::Cancelled { attempts });
                }

                () = wait_for_peer(&mut self.reconnected, self.server) => {
                    return self.finish(RetryOutcome::Reconnected { attempts });
                }

                () = tokio::time::sleep(backoff.current()) => {
                    backoff.advance();
                }
            }
        }
    }

    fn finish(&self, outcome: RetryOutcome) -> RetryOutcome {
        match outcome {
            RetryOutcome::Reconnected { attempts } => {
                tracing::info!(server = %self.server, attempts, "server reconnected");
            }
            RetryOutcome::Cancelled { attempts } => {
                tracing::info!(server = %self.server, attempts, "reconnect retry cancelled");
            }
        }
        outcome
    }
}

/// Resolves once `server` is mapped to some peer.
async fn wait_for_peer(subs: &mut MapSubscription<ServerId, PeerId>, server: ServerId) {
    while let Some(change) = subs.next().await {
        if change.key == server && change.value.is_some() {
            return;
        }
    }
    // The address book is gone; only cancellation can end the loop now.
    std::future::pending::<()>().await
}
