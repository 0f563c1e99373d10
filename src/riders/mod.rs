pub mod context;

pub use context::{RaceContext, UNKNOWN_RIDER, load_roster_file};

use std::collections::{BTreeSet, HashMap};

use itertools::Itertools;
use log::{info, warn};

use crate::feed::{GroupId, RiderId, Snapshot};

/// Last known state of a rider seen in at least one snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RiderStatus {
    pub rider_id: RiderId,
    /// Group the rider was in when last seen
    pub group_id: GroupId,
    /// Consecutive snapshots the rider has been absent from, 0 when present
    pub missing_for: u32,
}

/// Follows group membership across snapshots and reports riders that drop out of the feed.
///
/// Missing riders keep their last known group, so a rider who disappears for a few
/// snapshots and comes back is reported relative to where they were last seen.
#[derive(Clone, Debug, Default)]
pub struct RiderTracker {
    known: HashMap<RiderId, GroupId>,
    missing_for: HashMap<RiderId, u32>,
}

impl RiderTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a snapshot into the known riders and return the ids that were known before
    /// but are absent from `snapshot`.
    ///
    /// An absence may mean a withdrawal, a mechanical or a lost transponder; nothing is done
    /// about it here beyond reporting it.
    pub fn update(&mut self, snapshot: &Snapshot) -> BTreeSet<RiderId> {
        let current: HashMap<RiderId, GroupId> = snapshot
            .riders()
            .map(|(group, rider)| (rider.id, group.group_id))
            .collect();

        let missing: BTreeSet<RiderId> = self
            .known
            .keys()
            .filter(|id| !current.contains_key(id))
            .copied()
            .collect();

        for id in &missing {
            *self.missing_for.entry(*id).or_insert(0) += 1;
        }
        for (id, group_id) in current {
            if self.known.insert(id, group_id).is_none() {
                info!("New rider {} in group {}", id, group_id);
            }
            self.missing_for.remove(&id);
        }

        if !missing.is_empty() {
            warn!("missing: {}", missing.iter().join(", "));
        }
        missing
    }

    /// Group a rider was last seen in.
    pub fn last_group(&self, id: RiderId) -> Option<GroupId> {
        self.known.get(&id).copied()
    }

    /// Every rider seen so far with its last known group, ordered by id.
    pub fn riders(&self) -> Vec<RiderStatus> {
        self.known
            .iter()
            .map(|(&rider_id, &group_id)| RiderStatus {
                rider_id,
                group_id,
                missing_for: self.missing_for.get(&rider_id).copied().unwrap_or(0),
            })
            .sorted_by_key(|s| s.rider_id)
            .collect()
    }
}
