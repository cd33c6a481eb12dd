//! Read-only view of the business cards peers have published.
//!
//! Cards arrive through gossip with no ordering guarantee between peers and
//! last-write-wins per peer. The directory therefore never assumes it saw
//! every intermediate state: an unexpected jump between two roles is
//! reported as a [`TransitionNote`] and otherwise accepted.

use corelib::{ActivityId, PeerId, WatchableMap};

use crate::activity::ActivityKind;
use crate::card::BusinessCard;
use crate::codec;
use crate::error::Result;

/// An observed role change that is not an edge of the transition table.
///
/// Usually means intermediate cards were skipped or arrived out of order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionNote {
    pub peer: PeerId,
    pub activity: ActivityId,
    pub from: ActivityKind,
    pub to: ActivityKind,
}

/// Latest card seen from each peer, for one namespace.
#[derive(Default)]
pub struct CardDirectory {
    cards: WatchableMap<PeerId, BusinessCard>,
}

impl CardDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace `peer`'s card wholesale.
    ///
    /// Returns the transitions that skipped edges of the table.
    pub fn apply(&self, peer: PeerId, card: BusinessCard) -> Vec<TransitionNote> {
        let notes = match self.cards.get_key(&peer) {
            Some(previous) => unexpected_transitions(peer, &previous, &card),
            None => Vec::new(),
        };
        for note in &notes {
            tracing::warn!(
                peer = %note.peer,
                activity = %note.activity,
                from = %note.from,
                to = %note.to,
                "unexpected activity transition"
            );
        }
        self.cards.set_key(peer, card);
        notes
    }

    /// Decode and apply a card from the wire.
    ///
    /// On a decode error the previously known card stays in place.
    pub fn apply_encoded(&self, peer: PeerId, bytes: &[u8]) -> Result<Vec<TransitionNote>> {
        match codec::decode(bytes) {
            Ok(card) => Ok(self.apply(peer, card)),
            Err(err) => {
                tracing::warn!(peer = %peer, error = %err, "discarding undecodable business card");
                Err(err)
            }
        }
    }

    /// Forget a peer that left the namespace.
    pub fn remove(&self, peer: &PeerId) -> Option<BusinessCard> {
        self.cards.delete_key(peer)
    }

    pub fn get(&self, peer: &PeerId) -> Option<BusinessCard> {
        self.cards.get_key(peer)
    }

    /// Change feed of peers' cards.
    pub fn feed(&self) -> &WatchableMap<PeerId, BusinessCard> {
        &self.cards
    }

    /// Activities on other peers that backfill from `activity` on `peer`,
    /// either directly or as a backfill a pending primary waits on.
    pub fn backfills_depending_on(
        &self,
        peer: PeerId,
        activity: ActivityId,
    ) -> Vec<(PeerId, ActivityId)> {
        let mut dependents = Vec::new();
        for (other_peer, card) in self.cards.snapshot() {
            for (other_activity, entry) in card.iter() {
                if entry
                    .state
                    .backfill_sources()
                    .iter()
                    .any(|location| location.sources_from(peer, activity))
                {
                    dependents.push((other_peer, *other_activity));
                }
            }
        }
        dependents
    }

    /// Whether `activity` on `peer` may erase its data or withdraw its
    /// backfiller: no peer's latest card still depends on it.
    pub fn safe_to_release(&self, peer: PeerId, activity: ActivityId) -> bool {
        self.backfills_depending_on(peer, activity).is_empty()
    }
}

fn unexpected_transitions(
    peer: PeerId,
    previous: &BusinessCard,
    next: &BusinessCard,
) -> Vec<TransitionNote> {
    next.iter()
        .filter_map(|(id, activity)| {
            let from = previous.get(id)?.state.kind();
            let to = activity.state.kind();
            (!from.can_transition_to(to)).then_some(TransitionNote {
                peer,
                activity: *id,
                from,
                to,
            })
        })
        .collect()
}
