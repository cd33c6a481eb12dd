//! Regions of the keyspace and the version state attached to them.
//!
//! # Keyspace
//!
//! Keys are hashed onto a 64-bit space. A `Region` is a half-open interval
//! `[start, end)` over that space; an `end` of `None` runs to the end of the
//! keyspace, so `Region::universe()` covers every key.
//!
//! # Invariants
//!
//! - A region is never empty (`start < end`)
//! - Regions inside one `RegionMap` are pairwise disjoint

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::node::BranchId;

/// Half-open interval over the 64-bit key-hash space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Region {
    start: u64,
    end: Option<u64>,
}

impl Region {
    /// Create a region covering `[start, end)`.
    ///
    /// # Errors
    /// `Error::InvalidRegion` if the interval would be empty.
    pub fn new(start: u64, end: Option<u64>) -> Result<Self> {
        if let Some(end) = end {
            if end <= start {
                return Err(Error::InvalidRegion(format!("[{}, {})", start, end)));
            }
        }
        Ok(Self { start, end })
    }

    /// The whole keyspace.
    pub const fn universe() -> Self {
        Self { start: 0, end: None }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> Option<u64> {
        self.end
    }

    #[inline]
    pub fn contains_key(&self, key: u64) -> bool {
        key >= self.start && self.end.map_or(true, |end| key < end)
    }

    /// True if the two regions share at least one key.
    pub fn intersects(&self, other: &Region) -> bool {
        let self_before_other = self.end.map_or(false, |end| end <= other.start);
        let other_before_self = other.end.map_or(false, |end| end <= self.start);
        !self_before_other && !other_before_self
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "[{:016x}, {:016x})", self.start, end),
            None => write!(f, "[{:016x}, +inf)", self.start),
        }
    }
}

/// A point in a branch's history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    pub branch: BranchId,
    pub timestamp: u64,
}

impl Version {
    pub fn new(branch: BranchId, timestamp: u64) -> Self {
        Self { branch, timestamp }
    }

    /// Version of a region that has never been written.
    pub fn zero() -> Self {
        Self {
            branch: BranchId::nil(),
            timestamp: 0,
        }
    }
}

/// Range of versions a replica's data may be at (it may be mid-backfill).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionRange {
    pub earliest: Version,
    pub latest: Version,
}

impl VersionRange {
    pub fn new(earliest: Version, latest: Version) -> Self {
        Self { earliest, latest }
    }

    /// Range collapsed onto a single version.
    pub fn at(version: Version) -> Self {
        Self::new(version, version)
    }

    /// True when the data is known to be at exactly one version.
    pub fn is_coherent(&self) -> bool {
        self.earliest == self.latest
    }
}

/// Values attached to pairwise-disjoint regions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<(Region, V)>", into = "Vec<(Region, V)>")]
#[serde(bound(
    serialize = "V: Serialize + Clone",
    deserialize = "V: Deserialize<'de>"
))]
pub struct RegionMap<V> {
    entries: Vec<(Region, V)>,
}

impl<V> RegionMap<V> {
    /// Build a map, rejecting overlapping regions.
    ///
    /// Entries are kept sorted by region start.
    pub fn new(mut entries: Vec<(Region, V)>) -> Result<Self> {
        entries.sort_by_key(|(region, _)| *region);
        for pair in entries.windows(2) {
            if pair[0].0.intersects(&pair[1].0) {
                return Err(Error::OverlappingRegions(
                    pair[0].0.to_string(),
                    pair[1].0.to_string(),
                ));
            }
        }
        Ok(Self { entries })
    }

    /// Map with a single region.
    pub fn single(region: Region, value: V) -> Self {
        Self {
            entries: vec![(region, value)],
        }
    }

    /// Value for the region containing `key`, if any.
    pub fn get(&self, key: u64) -> Option<&V> {
        self.entries
            .iter()
            .find(|(region, _)| region.contains_key(key))
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Region, V)> {
        self.entries.iter()
    }

    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.entries.iter().map(|(region, _)| region)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> TryFrom<Vec<(Region, V)>> for RegionMap<V> {
    type Error = Error;

    fn try_from(entries: Vec<(Region, V)>) -> Result<Self> {
        Self::new(entries)
    }
}

impl<V> From<RegionMap<V>> for Vec<(Region, V)> {
    fn from(map: RegionMap<V>) -> Self {
        map.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_region_rejects_empty_interval() {
        assert!(Region::new(10, Some(10)).is_err());
        assert!(Region::new(10, Some(5)).is_err());
        assert!(Region::new(10, Some(11)).is_ok());
        assert!(Region::new(u64::MAX, None).is_ok());
    }

    #[test]
    fn test_region_contains() {
        let region = Region::new(100, Some(200)).unwrap();
        assert!(!region.contains_key(99));
        assert!(region.contains_key(100));
        assert!(region.contains_key(199));
        assert!(!region.contains_key(200));
        assert!(Region::universe().contains_key(u64::MAX));
    }

    #[test]
    fn test_adjacent_regions_are_disjoint() {
        let left = Region::new(0, Some(100)).unwrap();
        let right = Region::new(100, None).unwrap();
        assert!(!left.intersects(&right));
        assert!(!right.intersects(&left));
        assert!(Region::universe().intersects(&right));
    }

    #[test]
    fn test_region_map_rejects_overlap() {
        let a = Region::new(0, Some(100)).unwrap();
        let b = Region::new(50, Some(150)).unwrap();
        let err = RegionMap::new(vec![(a, 1), (b, 2)]).unwrap_err();
        assert!(matches!(err, Error::OverlappingRegions(_, _)));
    }

    #[test]
    fn test_region_map_lookup() {
        let a = Region::new(0, Some(100)).unwrap();
        let b = Region::new(100, None).unwrap();
        let map = RegionMap::new(vec![(b, "right"), (a, "left")]).unwrap();
        assert_eq!(map.get(5), Some(&"left"));
        assert_eq!(map.get(5000), Some(&"right"));
        assert_eq!(map.regions().next(), Some(&a));
    }

    #[test]
    fn test_version_range_coherence() {
        let branch = BranchId(7);
        assert!(VersionRange::at(Version::new(branch, 3)).is_coherent());
        assert!(!VersionRange::new(Version::zero(), Version::new(branch, 3)).is_coherent());
    }

    proptest! {
        #[test]
        fn prop_intersects_is_symmetric(a in 0u64..1000, la in 1u64..500, b in 0u64..1000, lb in 1u64..500) {
            let r1 = Region::new(a, Some(a + la)).unwrap();
            let r2 = Region::new(b, Some(b + lb)).unwrap();
            prop_assert_eq!(r1.intersects(&r2), r2.intersects(&r1));
        }

        #[test]
        fn prop_disjoint_regions_share_no_key(a in 0u64..1000, la in 1u64..100, b in 0u64..1000, lb in 1u64..100) {
            let r1 = Region::new(a, Some(a + la)).unwrap();
            let r2 = Region::new(b, Some(b + lb)).unwrap();
            if !r1.intersects(&r2) {
                for key in a..a + la {
                    prop_assert!(!r2.contains_key(key));
                }
            }
        }
    }
}
