//! Roles a node can hold for one region.
//!
//! # Lifecycle
//!
//! The role-transition policy moves an activity along these edges:
//!
//! ```text
//! Nothing -> SecondaryBackfilling -> SecondaryUpToDate -> PrimaryPending -> PrimaryActive
//!
//! PrimaryActive     \
//!                    -> NothingPending -> NothingErasing -> Nothing
//! SecondaryUpToDate /
//!
//! SecondaryUpToDate -> SecondaryNoPrimary -> SecondaryBackfilling
//! ```
//!
//! # Data Safety
//!
//! `NothingPending` and `SecondaryNoPrimary` keep offering a backfiller until
//! every peer that backfills from them has visibly moved on (see
//! `CardDirectory::safe_to_release`). Skipping that wait can lose the only
//! copy of a region.
//!
//! # Wire Stability
//!
//! Variant order is the wire tag. Never reorder or remove a variant; a new
//! role needs a new card format version.

use corelib::{ActivityId, BackfillSessionId, BranchId, PeerId, RegionMap, VersionRange};
use serde::{Deserialize, Serialize};

use crate::handles::{BackfillerCard, BroadcasterCard, QueryRouterCard, ReplierCard};

/// Names one backfill: the session and the activity it copies from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackfillLocation {
    pub session: BackfillSessionId,
    pub peer: PeerId,
    pub activity: ActivityId,
}

impl BackfillLocation {
    pub fn new(session: BackfillSessionId, peer: PeerId, activity: ActivityId) -> Self {
        Self {
            session,
            peer,
            activity,
        }
    }

    /// True if this backfill copies from `activity` on `peer`.
    pub fn sources_from(&self, peer: PeerId, activity: ActivityId) -> bool {
        self.peer == peer && self.activity == activity
    }
}

/// What a node is doing for one region.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityState {
    /// Wants to be primary, waiting on backfills it triggered elsewhere.
    PrimaryPending {
        backfills_waited_on: Vec<BackfillLocation>,
    },
    /// Serving as primary.
    PrimaryActive {
        broadcaster: BroadcasterCard,
        /// Unset briefly after promotion, until the local listener exists.
        replier: Option<ReplierCard>,
        query_router: Option<QueryRouterCard>,
    },
    /// In-sync secondary on `branch`.
    SecondaryUpToDate {
        branch: BranchId,
        replier: ReplierCard,
    },
    /// Wants to be secondary but has no reachable primary.
    SecondaryNoPrimary {
        current_state: RegionMap<VersionRange>,
        backfiller: BackfillerCard,
    },
    /// Becoming secondary; copying data first.
    SecondaryBackfilling { backfill: BackfillLocation },
    /// Wants to drop the region but must stay until nobody needs its data.
    NothingPending {
        current_state: RegionMap<VersionRange>,
        backfiller: BackfillerCard,
    },
    /// Holds nothing, does nothing.
    Nothing,
    /// Erasing data already agreed to be abandoned. Behaves like `Nothing`;
    /// exists so operators can see the erase in progress.
    NothingErasing,
}

/// Fieldless mirror of [`ActivityState`] for matching and display.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActivityKind {
    PrimaryPending,
    PrimaryActive,
    SecondaryUpToDate,
    SecondaryNoPrimary,
    SecondaryBackfilling,
    NothingPending,
    Nothing,
    NothingErasing,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 8] = [
        ActivityKind::PrimaryPending,
        ActivityKind::PrimaryActive,
        ActivityKind::SecondaryUpToDate,
        ActivityKind::SecondaryNoPrimary,
        ActivityKind::SecondaryBackfilling,
        ActivityKind::NothingPending,
        ActivityKind::Nothing,
        ActivityKind::NothingErasing,
    ];

    /// Whether the transition policy ever moves an activity from `self` to
    /// `next`. Republishing the same role is always allowed.
    pub fn can_transition_to(self, next: ActivityKind) -> bool {
        use ActivityKind::*;

        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Nothing, SecondaryBackfilling)
                | (SecondaryBackfilling, SecondaryUpToDate)
                | (SecondaryUpToDate, PrimaryPending)
                | (PrimaryPending, PrimaryActive)
                | (PrimaryActive, NothingPending)
                | (SecondaryUpToDate, NothingPending)
                | (NothingPending, NothingErasing)
                | (NothingErasing, Nothing)
                | (SecondaryUpToDate, SecondaryNoPrimary)
                | (SecondaryNoPrimary, SecondaryBackfilling)
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            ActivityKind::PrimaryPending => "primary-pending",
            ActivityKind::PrimaryActive => "primary",
            ActivityKind::SecondaryUpToDate => "secondary",
            ActivityKind::SecondaryNoPrimary => "secondary-no-primary",
            ActivityKind::SecondaryBackfilling => "secondary-backfilling",
            ActivityKind::NothingPending => "nothing-pending",
            ActivityKind::Nothing => "nothing",
            ActivityKind::NothingErasing => "nothing-erasing",
        }
    }
}

impl std::fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl ActivityState {
    pub fn kind(&self) -> ActivityKind {
        match self {
            ActivityState::PrimaryPending { .. } => ActivityKind::PrimaryPending,
            ActivityState::PrimaryActive { .. } => ActivityKind::PrimaryActive,
            ActivityState::SecondaryUpToDate { .. } => ActivityKind::SecondaryUpToDate,
            ActivityState::SecondaryNoPrimary { .. } => ActivityKind::SecondaryNoPrimary,
            ActivityState::SecondaryBackfilling { .. } => ActivityKind::SecondaryBackfilling,
            ActivityState::NothingPending { .. } => ActivityKind::NothingPending,
            ActivityState::Nothing => ActivityKind::Nothing,
            ActivityState::NothingErasing => ActivityKind::NothingErasing,
        }
    }

    /// Backfiller this activity offers to other replicas, if any.
    pub fn backfiller(&self) -> Option<&BackfillerCard> {
        match self {
            ActivityState::PrimaryActive { replier, .. } => {
                replier.as_ref().map(|replier| &replier.backfiller)
            }
            ActivityState::SecondaryUpToDate { replier, .. } => Some(&replier.backfiller),
            ActivityState::SecondaryNoPrimary { backfiller, .. }
            | ActivityState::NothingPending { backfiller, .. } => Some(backfiller),
            _ => None,
        }
    }

    pub fn offers_backfiller(&self) -> bool {
        self.backfiller().is_some()
    }

    /// Backfills this activity depends on completing.
    pub fn backfill_sources(&self) -> &[BackfillLocation] {
        match self {
            ActivityState::PrimaryPending {
                backfills_waited_on,
            } => backfills_waited_on,
            ActivityState::SecondaryBackfilling { backfill } => std::slice::from_ref(backfill),
            _ => &[],
        }
    }

    /// Whether the node still keeps data for the region in this role.
    pub fn holds_data(&self) -> bool {
        !matches!(
            self,
            ActivityState::Nothing | ActivityState::NothingErasing
        )
    }
}
