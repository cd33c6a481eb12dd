//! Identity and address abstractions for cluster participants.
//!
//! A `ServerId` names a logical cluster member across reconnections while a
//! `PeerId` names one live connection instance of it. Both are compact
//! newtypes over `u128` so comparisons and hashing are very fast.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
        pub struct $name(pub u128);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().as_u128())
            }

            /// The all-zero identifier, used as an explicit "unset" marker.
            pub const fn nil() -> Self {
                Self(0)
            }

            pub fn is_nil(&self) -> bool {
                self.0 == 0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:032x}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                u128::from_str_radix(s, 16)
                    .map($name)
                    .map_err(|e| Error::InvalidId(format!("{}: {}", s, e)))
            }
        }

        // Hex strings in human readable formats, raw integers on the wire.
        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                if serializer.is_human_readable() {
                    serializer.serialize_str(&self.to_string())
                } else {
                    serializer.serialize_u128(self.0)
                }
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                if deserializer.is_human_readable() {
                    let text = String::deserialize(deserializer)?;
                    text.parse().map_err(de::Error::custom)
                } else {
                    u128::deserialize(deserializer).map($name)
                }
            }
        }
    };
}

define_id!(
    /// Logical cluster member, stable across reconnections.
    ServerId
);

define_id!(
    /// One live connection instance of a server.
    ///
    /// The mapping `ServerId -> PeerId` only exists while connected; a server
    /// that reconnects shows up under a new `PeerId`.
    PeerId
);

define_id!(
    /// Scopes one activity record within a node's business card.
    ActivityId
);

define_id!(
    /// Identifies a branch of a region's history, created by a primary.
    BranchId
);

define_id!(
    /// Identifies one backfill session between two replicas.
    BackfillSessionId
);

/// Network location(s) used to dial a peer.
///
/// Retained per server even after it disconnects so that reconnection can be
/// attempted. Keep it cheap to clone; retriers take an immutable snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<SocketAddr>", into = "Vec<SocketAddr>")]
pub struct PeerAddress {
    hosts: Vec<SocketAddr>,
}

impl PeerAddress {
    /// Address with a single host.
    pub fn new(host: SocketAddr) -> Self {
        Self { hosts: vec![host] }
    }

    /// Address reachable through any of `hosts`, in preference order.
    pub fn with_hosts(hosts: Vec<SocketAddr>) -> Result<Self> {
        if hosts.is_empty() {
            return Err(Error::InvalidAddress("no hosts".to_string()));
        }
        Ok(Self { hosts })
    }

    pub fn hosts(&self) -> &[SocketAddr] {
        &self.hosts
    }

    /// Preferred host to dial first.
    pub fn primary(&self) -> SocketAddr {
        self.hosts[0]
    }
}

impl TryFrom<Vec<SocketAddr>> for PeerAddress {
    type Error = Error;

    fn try_from(hosts: Vec<SocketAddr>) -> Result<Self> {
        Self::with_hosts(hosts)
    }
}

impl From<PeerAddress> for Vec<SocketAddr> {
    fn from(address: PeerAddress) -> Self {
        address.hosts
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, host) in self.hosts.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", host)?;
        }
        Ok(())
    }
}
