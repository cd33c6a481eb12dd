//! Versioned binary encoding of business cards.
//!
//! # Format
//!
//! ```text
//! +---------+------------------------------------------+
//! | version | bincode(Vec<(ActivityId, Region, State)>) |
//! |  1 byte |  fixed-width little-endian integers       |
//! +---------+------------------------------------------+
//! ```
//!
//! Decoding is all-or-nothing: an unknown version, an unknown activity tag,
//! trailing bytes or a card violating its invariants all fail the whole call.

use bincode::Options;
use bytes::{BufMut, Bytes, BytesMut};

use crate::card::BusinessCard;
use crate::error::{ReplicationError, Result};

/// Current card format. Bump when the activity tag space changes.
pub const CARD_FORMAT_VERSION: u8 = 1;

/// Upper bound on an encoded card body.
pub const MAX_CARD_BYTES: u64 = 16 * 1024 * 1024;

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .with_limit(MAX_CARD_BYTES)
        .reject_trailing_bytes()
}

/// Encode a card for the publication channel.
pub fn encode(card: &BusinessCard) -> Result<Bytes> {
    let body = options().serialize(card)?;
    let mut buf = BytesMut::with_capacity(1 + body.len());
    buf.put_u8(CARD_FORMAT_VERSION);
    buf.put_slice(&body);
    Ok(buf.freeze())
}

/// Decode a card received from a peer.
pub fn decode(bytes: &[u8]) -> Result<BusinessCard> {
    let (&version, body) = bytes.split_first().ok_or(ReplicationError::Truncated)?;
    if version != CARD_FORMAT_VERSION {
        return Err(ReplicationError::UnsupportedVersion(version));
    }
    Ok(options().deserialize(body)?)
}

/// Pretty JSON for operators. Uses the same closed tag space.
pub fn to_json(card: &BusinessCard) -> Result<String> {
    Ok(serde_json::to_string_pretty(card)?)
}

pub fn from_json(text: &str) -> Result<BusinessCard> {
    Ok(serde_json::from_str(text)?)
}
