//! Handles other replicas use to talk to a role.
//!
//! Each handle is a bundle of mailbox addresses. Only their identity matters
//! here; the protocols behind them live elsewhere.

use corelib::{BranchId, PeerId, Region};
use serde::{Deserialize, Serialize};

/// Address of one mailbox on one peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MailboxAddress {
    pub peer: PeerId,
    pub thread: u32,
    pub mailbox: u64,
}

impl MailboxAddress {
    pub fn new(peer: PeerId, thread: u32, mailbox: u64) -> Self {
        Self {
            peer,
            thread,
            mailbox,
        }
    }
}

/// Entry point of a primary's write stream for one branch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcasterCard {
    pub branch: BranchId,
    /// Where listeners register to receive the stream.
    pub registrar: MailboxAddress,
}

/// Lets other replicas backfill from this one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillerCard {
    pub backfill: MailboxAddress,
    pub cancel_backfill: MailboxAddress,
}

/// Up-to-date replica answering reads and serving backfills.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplierCard {
    pub synchronize: MailboxAddress,
    pub backfiller: BackfillerCard,
}

/// Routes queries for `region` to the primary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRouterCard {
    pub multiplexer: MailboxAddress,
    pub region: Region,
}
