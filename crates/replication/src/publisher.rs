//! Publication of this node's own business card.
//!
//! Only the local role-transition policy writes here, and always a whole
//! card. Observers get read-only receivers that see the latest card.

use bytes::Bytes;
use tokio::sync::watch;

use crate::card::BusinessCard;
use crate::codec;
use crate::error::Result;

pub struct CardPublisher {
    tx: watch::Sender<BusinessCard>,
}

impl CardPublisher {
    /// Start out publishing an empty card.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(BusinessCard::empty());
        Self { tx }
    }

    /// Replace the published card. Intermediate cards may never be seen by
    /// slow observers.
    pub fn publish(&self, card: BusinessCard) {
        tracing::debug!(activities = card.len(), "publishing business card");
        self.tx.send_replace(card);
    }

    pub fn current(&self) -> BusinessCard {
        self.tx.borrow().clone()
    }

    /// Current card in wire form.
    pub fn encoded(&self) -> Result<Bytes> {
        codec::encode(&self.tx.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<BusinessCard> {
        self.tx.subscribe()
    }
}

impl Default for CardPublisher {
    fn default() -> Self {
        Self::new()
    }
}
