//! End-to-end tests for business cards as peers see them.
//!
//! # Test Strategy
//!
//! 1. **Wire format**: Every role survives the binary codec and JSON
//! 2. **Rejection**: Unknown tags and broken cards never yield a partial card
//! 3. **Gossip ordering**: Skipped or reordered cards are noted, not fatal
//! 4. **Data safety**: A backfill source is held until dependents move on

use corelib::{
    ActivityId, BackfillSessionId, BranchId, PeerId, Region, RegionMap, Version, VersionRange,
};
use replication::codec::{self, CARD_FORMAT_VERSION};
use replication::{
    ActivityKind, ActivityState, BackfillLocation, BackfillerCard, BroadcasterCard, BusinessCard,
    CardDirectory, MailboxAddress, QueryRouterCard, ReplicationError, ReplierCard,
};

fn mailbox(peer: u128, mailbox: u64) -> MailboxAddress {
    MailboxAddress::new(PeerId(peer), 0, mailbox)
}

fn backfiller(peer: u128) -> BackfillerCard {
    BackfillerCard {
        backfill: mailbox(peer, 10),
        cancel_backfill: mailbox(peer, 11),
    }
}

fn replier(peer: u128) -> ReplierCard {
    ReplierCard {
        synchronize: mailbox(peer, 20),
        backfiller: backfiller(peer),
    }
}

fn current_state() -> RegionMap<VersionRange> {
    RegionMap::single(
        Region::universe(),
        VersionRange::new(Version::zero(), Version::new(BranchId(5), 42)),
    )
}

fn location(peer: u128, activity: u128) -> BackfillLocation {
    BackfillLocation::new(BackfillSessionId(99), PeerId(peer), ActivityId(activity))
}

fn every_state() -> Vec<ActivityState> {
    vec![
        ActivityState::PrimaryPending {
            backfills_waited_on: vec![location(2, 1), location(3, 1)],
        },
        ActivityState::PrimaryActive {
            broadcaster: BroadcasterCard {
                branch: BranchId(5),
                registrar: mailbox(1, 30),
            },
            replier: Some(replier(1)),
            query_router: Some(QueryRouterCard {
                multiplexer: mailbox(1, 40),
                region: Region::universe(),
            }),
        },
        ActivityState::SecondaryUpToDate {
            branch: BranchId(5),
            replier: replier(1),
        },
        ActivityState::SecondaryNoPrimary {
            current_state: current_state(),
            backfiller: backfiller(1),
        },
        ActivityState::SecondaryBackfilling {
            backfill: location(2, 7),
        },
        ActivityState::NothingPending {
            current_state: current_state(),
            backfiller: backfiller(1),
        },
        ActivityState::Nothing,
        ActivityState::NothingErasing,
    ]
}

fn card_with(activity: u128, state: ActivityState) -> BusinessCard {
    BusinessCard::builder()
        .activity(ActivityId(activity), Region::universe(), state)
        .build()
        .unwrap()
}

// ============================================================================
// Wire Format Tests
// ============================================================================

#[test]
fn test_every_role_survives_codec() {
    let states = every_state();
    assert_eq!(states.len(), ActivityKind::ALL.len());

    for state in states {
        let kind = state.kind();
        let card = card_with(1, state);

        let decoded = codec::decode(&codec::encode(&card).unwrap()).unwrap();
        assert_eq!(decoded, card, "binary form of {}", kind);

        let json = codec::to_json(&card).unwrap();
        assert_eq!(codec::from_json(&json).unwrap(), card, "JSON form of {}", kind);
    }
}

#[test]
fn test_card_with_many_regions() {
    let card = BusinessCard::builder()
        .activity(
            ActivityId(1),
            Region::new(0, Some(1 << 62)).unwrap(),
            ActivityState::SecondaryUpToDate {
                branch: BranchId(5),
                replier: replier(1),
            },
        )
        .activity(
            ActivityId(2),
            Region::new(1 << 62, None).unwrap(),
            ActivityState::Nothing,
        )
        .build()
        .unwrap();

    let decoded = codec::decode(&codec::encode(&card).unwrap()).unwrap();
    assert_eq!(decoded.len(), 2);
    assert_eq!(
        decoded.activity_for_key(u64::MAX).map(|(id, _)| *id),
        Some(ActivityId(2))
    );
}

// ============================================================================
// Rejection Tests
// ============================================================================

#[test]
fn test_unknown_activity_tag_rejected() {
    let mut bytes = codec::encode(&card_with(1, ActivityState::Nothing))
        .unwrap()
        .to_vec();
    // `Nothing` has no payload, so its u32 tag ends the body.
    let tag = bytes.len() - 4;
    assert_eq!(&bytes[tag..], &6u32.to_le_bytes()[..]);
    bytes[tag..].copy_from_slice(&8u32.to_le_bytes());

    assert!(matches!(
        codec::decode(&bytes),
        Err(ReplicationError::Malformed(_))
    ));
}

#[test]
fn test_overlapping_card_rejected_on_decode() {
    let records = vec![
        (ActivityId(1), Region::universe(), ActivityState::Nothing),
        (ActivityId(2), Region::universe(), ActivityState::Nothing),
    ];
    let json = serde_json::to_string(&records).unwrap();
    assert!(codec::from_json(&json).is_err());
}

#[test]
fn test_future_format_rejected() {
    let mut bytes = codec::encode(&BusinessCard::empty()).unwrap().to_vec();
    bytes[0] = CARD_FORMAT_VERSION + 1;
    assert!(matches!(
        codec::decode(&bytes),
        Err(ReplicationError::UnsupportedVersion(_))
    ));
}

// ============================================================================
// Gossip Ordering Tests
// ============================================================================

#[test]
fn test_backfill_then_up_to_date_in_order() {
    let directory = CardDirectory::new();
    let peer = PeerId(2);

    let first = directory.apply(
        peer,
        card_with(
            7,
            ActivityState::SecondaryBackfilling {
                backfill: location(1, 1),
            },
        ),
    );
    let second = directory.apply(
        peer,
        card_with(
            7,
            ActivityState::SecondaryUpToDate {
                branch: BranchId(5),
                replier: replier(2),
            },
        ),
    );

    assert!(first.is_empty());
    assert!(second.is_empty());
}

#[test]
fn test_reordered_cards_are_tolerated() {
    let directory = CardDirectory::new();
    let peer = PeerId(2);

    directory.apply(
        peer,
        card_with(
            7,
            ActivityState::SecondaryUpToDate {
                branch: BranchId(5),
                replier: replier(2),
            },
        ),
    );
    // The older backfilling card arrives late.
    let notes = directory.apply(
        peer,
        card_with(
            7,
            ActivityState::SecondaryBackfilling {
                backfill: location(1, 1),
            },
        ),
    );

    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].from, ActivityKind::SecondaryUpToDate);
    assert_eq!(notes[0].to, ActivityKind::SecondaryBackfilling);
    assert_eq!(
        directory.get(&peer).unwrap().get(&ActivityId(7)).unwrap().state.kind(),
        ActivityKind::SecondaryBackfilling
    );
}

#[test]
fn test_encoded_cards_feed_the_directory() {
    let directory = CardDirectory::new();
    let card = card_with(3, ActivityState::Nothing);
    let bytes = codec::encode(&card).unwrap();

    let notes = directory.apply_encoded(PeerId(4), &bytes).unwrap();
    assert!(notes.is_empty());
    assert_eq!(directory.get(&PeerId(4)), Some(card));
}

// ============================================================================
// Data Safety Tests
// ============================================================================

#[test]
fn test_source_held_until_backfill_completes() {
    let directory = CardDirectory::new();
    let source = PeerId(1);
    let source_activity = ActivityId(1);

    directory.apply(
        source,
        card_with(
            1,
            ActivityState::NothingPending {
                current_state: current_state(),
                backfiller: backfiller(1),
            },
        ),
    );
    directory.apply(
        PeerId(2),
        card_with(
            7,
            ActivityState::SecondaryBackfilling {
                backfill: location(1, 1),
            },
        ),
    );
    assert!(!directory.safe_to_release(source, source_activity));

    directory.apply(
        PeerId(2),
        card_with(
            7,
            ActivityState::SecondaryUpToDate {
                branch: BranchId(5),
                replier: replier(2),
            },
        ),
    );
    assert!(directory.safe_to_release(source, source_activity));
}

#[test]
fn test_pending_primary_holds_every_source() {
    let directory = CardDirectory::new();
    directory.apply(
        PeerId(9),
        card_with(
            1,
            ActivityState::PrimaryPending {
                backfills_waited_on: vec![location(2, 1), location(3, 1)],
            },
        ),
    );

    assert!(!directory.safe_to_release(PeerId(2), ActivityId(1)));
    assert!(!directory.safe_to_release(PeerId(3), ActivityId(1)));
    assert!(directory.safe_to_release(PeerId(4), ActivityId(1)));

    directory.remove(&PeerId(9));
    assert!(directory.safe_to_release(PeerId(2), ActivityId(1)));
}
