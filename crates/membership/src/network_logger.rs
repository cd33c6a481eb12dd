//! Log lines for servers connecting and disconnecting.
//!
//! Also maintains the set of servers this node can currently see, which other
//! components publish to build the cluster-wide connectivity picture.

use std::sync::Arc;

use corelib::{Change, PeerId, ServerId, SubscribeMode, WatchableMap};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::address_book::AddressBook;

pub struct NetworkLogger {
    local: Option<ServerId>,
    book: Arc<AddressBook>,
    connected: Arc<WatchableMap<ServerId, ()>>,
}

impl NetworkLogger {
    /// `local` is this node's own identity, which is never reported.
    pub fn new(local: Option<ServerId>, book: Arc<AddressBook>) -> Self {
        Self {
            local,
            book,
            connected: Arc::new(WatchableMap::new()),
        }
    }

    /// Servers currently visible from this node.
    pub fn connected_servers(&self) -> Arc<WatchableMap<ServerId, ()>> {
        Arc::clone(&self.connected)
    }

    /// Follow the address book until `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        let mut subs = self.book.server_to_peer().subscribe(SubscribeMode::Initial);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    change = subs.next() => match change {
                        Some(change) => self.on_change(change),
                        None => break,
                    },
                }
            }
        })
    }

    fn on_change(&self, change: Change<ServerId, PeerId>) {
        let server = change.key;
        if Some(server) == self.local {
            return;
        }
        match change.value {
            Some(peer) => {
                if self.connected.contains_key(&server) {
                    tracing::debug!(server = %server, peer = %peer, "server moved to a new peer");
                } else {
                    tracing::info!(server = %server, peer = %peer, "connected to server");
                }
                self.connected.set_key(server, ());
            }
            None => {
                if self.connected.delete_key(&server).is_some() {
                    tracing::info!(server = %server, "disconnected from server");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corelib::PeerAddress;
    use std::time::Duration;

    fn addr() -> PeerAddress {
        PeerAddress::new("10.0.0.1:29015".parse().unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracks_visible_servers() {
        let book = Arc::new(AddressBook::new());
        book.connect(PeerId(1), ServerId(10), addr());

        let logger = NetworkLogger::new(Some(ServerId(99)), Arc::clone(&book));
        let connected = logger.connected_servers();
        let cancel = CancellationToken::new();
        let task = logger.spawn(cancel.clone());

        book.connect(PeerId(2), ServerId(20), addr());
        book.connect(PeerId(3), ServerId(99), addr());
        tokio::time::sleep(Duration::from_millis(1)).await;

        let visible: Vec<_> = connected.snapshot().into_keys().collect();
        assert_eq!(visible, vec![ServerId(10), ServerId(20)]);

        book.disconnect(PeerId(1));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(!connected.contains_key(&ServerId(10)));

        cancel.cancel();
        task.await.unwrap();
    }
}
