//! Error types for business cards.

use corelib::ActivityId;

/// Result type alias for the replication crate.
pub type Result<T> = std::result::Result<T, ReplicationError>;

/// Errors building or decoding business cards.
///
/// A card that fails to decode is unusable as a whole; callers must not fall
/// back to any part of it.
#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    #[error("activity {0} appears more than once")]
    DuplicateActivity(ActivityId),
    #[error("activities {0} and {1} cover overlapping regions")]
    OverlappingActivities(ActivityId, ActivityId),
    #[error("empty business card payload")]
    Truncated,
    #[error("unsupported business card format version {0}")]
    UnsupportedVersion(u8),
    #[error("malformed business card: {0}")]
    Malformed(#[from] bincode::Error),
    #[error("malformed business card json: {0}")]
    Json(#[from] serde_json::Error),
}
