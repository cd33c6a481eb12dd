//! Per-namespace business card: everything a node currently does.
//!
//! A node publishes one card per namespace and always replaces it whole.
//! Peers treat the latest card they received as the authoritative snapshot
//! of that node's roles and never edit it.
//!
//! # Invariants
//!
//! - Each `ActivityId` appears once
//! - Regions of different activities are disjoint
//!
//! Both are checked on construction and on deserialization, so a
//! `BusinessCard` value is always valid.
//!
//! # Serialized Form
//!
//! An ordered list of `(ActivityId, Region, ActivityState)` tuples, sorted by
//! activity id.

use std::collections::BTreeMap;

use corelib::{ActivityId, Region};
use serde::{Deserialize, Serialize};

use crate::activity::ActivityState;
use crate::error::{ReplicationError, Result};

/// One entry of a business card.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Activity {
    pub region: Region,
    pub state: ActivityState,
}

/// Wire form of one activity.
pub type ActivityRecord = (ActivityId, Region, ActivityState);

/// A node's roles for one namespace.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ActivityRecord>", into = "Vec<ActivityRecord>")]
pub struct BusinessCard {
    activities: BTreeMap<ActivityId, Activity>,
}

impl BusinessCard {
    /// Card with no activities.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a card from activity records.
    ///
    /// # Errors
    /// - `DuplicateActivity` if an id repeats
    /// - `OverlappingActivities` if two regions share keys
    pub fn new(records: impl IntoIterator<Item = ActivityRecord>) -> Result<Self> {
        let mut activities: BTreeMap<ActivityId, Activity> = BTreeMap::new();
        for (id, region, state) in records {
            if let Some((other, _)) = activities
                .iter()
                .find(|(_, activity)| activity.region.intersects(&region))
            {
                if *other != id {
                    return Err(ReplicationError::OverlappingActivities(*other, id));
                }
            }
            if activities.insert(id, Activity { region, state }).is_some() {
                return Err(ReplicationError::DuplicateActivity(id));
            }
        }
        Ok(Self { activities })
    }

    pub fn builder() -> BusinessCardBuilder {
        BusinessCardBuilder::default()
    }

    pub fn get(&self, id: &ActivityId) -> Option<&Activity> {
        self.activities.get(id)
    }

    /// Activities in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&ActivityId, &Activity)> {
        self.activities.iter()
    }

    /// Activity responsible for `key`, if any.
    pub fn activity_for_key(&self, key: u64) -> Option<(&ActivityId, &Activity)> {
        self.activities
            .iter()
            .find(|(_, activity)| activity.region.contains_key(key))
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    /// Copy out the wire records.
    pub fn records(&self) -> Vec<ActivityRecord> {
        self.activities
            .iter()
            .map(|(id, activity)| (*id, activity.region, activity.state.clone()))
            .collect()
    }
}

impl TryFrom<Vec<ActivityRecord>> for BusinessCard {
    type Error = ReplicationError;

    fn try_from(records: Vec<ActivityRecord>) -> Result<Self> {
        Self::new(records)
    }
}

impl From<BusinessCard> for Vec<ActivityRecord> {
    fn from(card: BusinessCard) -> Self {
        card.activities
            .into_iter()
            .map(|(id, activity)| (id, activity.region, activity.state))
            .collect()
    }
}

/// Builder for [`BusinessCard`].
///
/// # Example
///
/// ```rust
/// use corelib::{ActivityId, Region};
/// use replication::{ActivityState, BusinessCard};
///
/// let card = BusinessCard::builder()
///     .activity(ActivityId(1), Region::universe(), ActivityState::Nothing)
///     .build()
///     .unwrap();
/// assert_eq!(card.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct BusinessCardBuilder {
    records: Vec<ActivityRecord>,
}

impl BusinessCardBuilder {
    pub fn activity(mut self, id: ActivityId, region: Region, state: ActivityState) -> Self {
        self.records.push((id, region, state));
        self
    }

    pub fn build(self) -> Result<BusinessCard> {
        BusinessCard::new(self.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(start: u64, end: u64) -> Region {
        Region::new(start, Some(end)).unwrap()
    }

    #[test]
    fn test_disjoint_activities_accepted() {
        let card = BusinessCard::builder()
            .activity(ActivityId(2), region(100, 200), ActivityState::Nothing)
            .activity(ActivityId(1), region(0, 100), ActivityState::NothingErasing)
            .build()
            .unwrap();

        assert_eq!(card.len(), 2);
        let ids: Vec<_> = card.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![ActivityId(1), ActivityId(2)]);
        assert_eq!(card.activity_for_key(150).map(|(id, _)| *id), Some(ActivityId(2)));
        assert!(card.activity_for_key(500).is_none());
    }

    #[test]
    fn test_overlapping_activities_rejected() {
        let err = BusinessCard::builder()
            .activity(ActivityId(1), region(0, 100), ActivityState::Nothing)
            .activity(ActivityId(2), region(50, 150), ActivityState::Nothing)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ReplicationError::OverlappingActivities(ActivityId(1), ActivityId(2))
        ));
    }

    #[test]
    fn test_duplicate_activity_rejected() {
        let err = BusinessCard::builder()
            .activity(ActivityId(1), region(0, 100), ActivityState::Nothing)
            .activity(ActivityId(1), region(0, 100), ActivityState::NothingErasing)
            .build()
            .unwrap_err();
        assert!(matches!(err, ReplicationError::DuplicateActivity(ActivityId(1))));
    }

    #[test]
    fn test_records_are_sorted_by_id() {
        let card = BusinessCard::new(vec![
            (ActivityId(9), region(0, 10), ActivityState::Nothing),
            (ActivityId(3), region(10, 20), ActivityState::Nothing),
        ])
        .unwrap();
        let records = card.records();
        assert_eq!(records[0].0, ActivityId(3));
        assert_eq!(records[1].0, ActivityId(9));
        assert_eq!(BusinessCard::try_from(records).unwrap(), card);
    }
}
