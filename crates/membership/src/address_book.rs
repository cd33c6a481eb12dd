//! In-process view of which servers are connected as which peers.
//!
//! The transport and the server-identity directory are separate sources in a
//! real deployment, so a connection and its identity appear and disappear in
//! two steps. `AddressBook` keeps those as two independent feeds keyed by
//! `PeerId` plus the reverse `ServerId -> PeerId` index, and deliberately
//! exposes the intermediate "only one side known" states to observers.

use corelib::{PeerAddress, PeerId, ServerId, WatchableMap};

/// One live transport connection to a peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionPair {
    /// Address the peer can be dialed at.
    pub address: PeerAddress,
}

/// Change feeds describing peer identities and connections.
#[derive(Default)]
pub struct AddressBook {
    peer_to_server: WatchableMap<PeerId, ServerId>,
    server_to_peer: WatchableMap<ServerId, PeerId>,
    connections: WatchableMap<PeerId, ConnectionPair>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peer_to_server(&self) -> &WatchableMap<PeerId, ServerId> {
        &self.peer_to_server
    }

    pub fn server_to_peer(&self) -> &WatchableMap<ServerId, PeerId> {
        &self.server_to_peer
    }

    pub fn connections(&self) -> &WatchableMap<PeerId, ConnectionPair> {
        &self.connections
    }

    /// Full connection of `server` as `peer`: transport first, then identity.
    pub fn connect(&self, peer: PeerId, server: ServerId, address: PeerAddress) {
        self.connect_without_identity(peer, address);
        self.learn_identity(peer, server);
    }

    /// Tear down `peer`: identity first, then transport.
    pub fn disconnect(&self, peer: PeerId) {
        self.forget_identity(peer);
        self.connections.delete_key(&peer);
    }

    /// Transport-level connection whose server identity is not yet known.
    pub fn connect_without_identity(&self, peer: PeerId, address: PeerAddress) {
        self.connections.set_key(peer, ConnectionPair { address });
    }

    /// Associate `peer` with `server`.
    pub fn learn_identity(&self, peer: PeerId, server: ServerId) {
        self.peer_to_server.set_key(peer, server);
        self.server_to_peer.set_key(server, peer);
    }

    /// Drop the identity of `peer`, keeping its transport connection.
    pub fn forget_identity(&self, peer: PeerId) {
        if let Some(server) = self.peer_to_server.delete_key(&peer) {
            // A newer peer for the same server must not be unmapped.
            if self.server_to_peer.get_key(&server) == Some(peer) {
                self.server_to_peer.delete_key(&server);
            }
        }
    }

    /// Peer currently serving as `server`, if connected.
    pub fn peer_for(&self, server: &ServerId) -> Option<PeerId> {
        self.server_to_peer.get_key(server)
    }

    /// Drop the transport connection only, leaving the identity behind.
    pub fn drop_connection(&self, peer: PeerId) {
        self.connections.delete_key(&peer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corelib::SubscribeMode;

    fn addr(port: u16) -> PeerAddress {
        PeerAddress::new(format!("127.0.0.1:{}", port).parse().unwrap())
    }

    #[test]
    fn test_connect_populates_all_feeds() {
        let book = AddressBook::new();
        book.connect(PeerId(1), ServerId(10), addr(1));

        assert_eq!(book.peer_to_server().get_key(&PeerId(1)), Some(ServerId(10)));
        assert_eq!(book.peer_for(&ServerId(10)), Some(PeerId(1)));
        assert_eq!(
            book.connections().get_key(&PeerId(1)).map(|c| c.address),
            Some(addr(1))
        );
    }

    #[test]
    fn test_disconnect_clears_all_feeds() {
        let book = AddressBook::new();
        book.connect(PeerId(1), ServerId(10), addr(1));
        book.disconnect(PeerId(1));

        assert!(book.peer_to_server().is_empty());
        assert!(book.server_to_peer().is_empty());
        assert!(book.connections().is_empty());
    }

    #[test]
    fn test_stale_peer_does_not_unmap_newer_peer() {
        let book = AddressBook::new();
        book.connect(PeerId(1), ServerId(10), addr(1));
        book.connect(PeerId(2), ServerId(10), addr(1));
        book.disconnect(PeerId(1));

        assert_eq!(book.peer_for(&ServerId(10)), Some(PeerId(2)));
    }

    #[test]
    fn test_connect_emits_transport_before_identity() {
        let book = AddressBook::new();
        let mut conns = book.connections().subscribe(SubscribeMode::OnChange);
        let mut ids = book.peer_to_server().subscribe(SubscribeMode::OnChange);

        book.connect_without_identity(PeerId(1), addr(1));
        assert_eq!(conns.try_next().map(|c| c.key), Some(PeerId(1)));
        assert!(ids.try_next().is_none());

        book.learn_identity(PeerId(1), ServerId(10));
        assert_eq!(ids.try_next().map(|c| c.key), Some(PeerId(1)));
    }
}
