pub mod client;
pub mod collector;
pub mod producer;

pub use client::FeedClient;
pub use collector::{PollSettings, StopReason, collect_race};
pub use producer::{LiveFeedProducer, MockSnapshotProducer, SnapshotProducer};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::PelotonError;

pub type RiderId = u32;
pub type GroupId = u32;

/// A geographic coordinate in decimal degrees.
///
/// Serialized with the feed's field names so route endpoints deserialize straight into it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Waypoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl Waypoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// One rider as reported inside a group of the race snapshot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Rider {
    pub id: RiderId,
    pub latitude: f64,
    pub longitude: f64,
    /// km/h
    #[serde(default)]
    pub current_speed: f64,
    /// km
    #[serde(default)]
    pub distance_to_finish: f64,
    #[serde(default)]
    pub position_in_the_group: u32,
    #[serde(default)]
    pub has_yellow_jersey: bool,

    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl Rider {
    pub fn position(&self) -> Waypoint {
        Waypoint::new(self.latitude, self.longitude)
    }
}

impl From<&Rider> for Waypoint {
    fn from(rider: &Rider) -> Self {
        rider.position()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Group {
    pub group_id: GroupId,
    #[serde(default)]
    pub group_name: String,
    #[serde(default)]
    pub group_size: u32,
    /// km
    #[serde(default)]
    pub group_distance_to_finish: f64,
    /// Official gap to the leading group, seconds
    #[serde(default)]
    pub gap_to_leading_group_t: f64,
    #[serde(default)]
    pub riders: Vec<Rider>,

    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl Group {
    /// First rider listed in the group, used as the group's position on course.
    pub fn lead_rider(&self) -> Option<&Rider> {
        self.riders.first()
    }
}

/// One telemetry update covering all groups and riders at a single instant.
///
/// Fields the tracker does not use are kept in `extra` so persisted snapshots keep the
/// full payload.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Snapshot {
    #[serde(rename = "TimeStampEpochInt")]
    pub timestamp: i64,
    pub groups: Vec<Group>,

    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl Snapshot {
    /// Parse a feed body. A `null` or blank body means the feed had no content and yields
    /// `Ok(None)`; anything else must decode and validate.
    pub fn parse(body: &str, origin: &str) -> Result<Option<Snapshot>, PelotonError> {
        if body.trim().is_empty() {
            return Ok(None);
        }
        let snapshot: Option<Snapshot> =
            serde_json::from_str(body).map_err(|e| PelotonError::SnapshotParseError {
                origin: origin.to_string(),
                source: e,
            })?;
        match snapshot {
            Some(snapshot) => {
                snapshot.validate()?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    /// Checks the invariants the trackers rely on: a positive timestamp, a lead group with
    /// at least one rider, and valid coordinates for every rider.
    pub fn validate(&self) -> Result<(), PelotonError> {
        let invalid = |reason: String| PelotonError::InvalidSnapshot {
            timestamp: self.timestamp,
            reason,
        };

        if self.timestamp <= 0 {
            return Err(invalid("timestamp must be positive".to_string()));
        }
        let Some(lead_group) = self.groups.first() else {
            return Err(invalid("snapshot has no groups".to_string()));
        };
        if lead_group.riders.is_empty() {
            return Err(invalid(format!(
                "lead group {} has no riders",
                lead_group.group_id
            )));
        }
        for group in &self.groups {
            if let Some(rider) = group.riders.iter().find(|r| !r.position().is_valid()) {
                return Err(invalid(format!(
                    "rider {} in group {} has invalid coordinates ({}, {})",
                    rider.id, group.group_id, rider.latitude, rider.longitude
                )));
            }
        }
        Ok(())
    }

    /// The head of the race: first rider of the first group.
    pub fn leader(&self) -> Option<&Rider> {
        self.groups.first().and_then(Group::lead_rider)
    }

    pub fn riders(&self) -> impl Iterator<Item = (&Group, &Rider)> {
        self.groups
            .iter()
            .flat_map(|g| g.riders.iter().map(move |r| (g, r)))
    }
}

/// Response of the current stage endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StageInfo {
    pub stage_id: u32,
}

/// One entry of the race roster.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RosterEntry {
    pub id: RiderId,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub nationality: String,
    #[serde(default)]
    pub is_withdrawn: bool,
}
