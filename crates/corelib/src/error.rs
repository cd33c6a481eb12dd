//! Error types for the core library.

/// Result type alias for the core library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the core library.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Region bounds do not describe a non-empty interval
    #[error("Invalid region: {0}")]
    InvalidRegion(String),
    /// Two regions that must be disjoint share keys
    #[error("Overlapping regions: {0} and {1}")]
    OverlappingRegions(String, String),
    /// Peer address without any host to dial
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    /// Identifier text could not be parsed
    #[error("Invalid identifier: {0}")]
    InvalidId(String),
}
