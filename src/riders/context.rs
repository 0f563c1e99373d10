use std::{
    collections::{BTreeSet, HashMap},
    fs,
    path::Path,
};

use log::{debug, info};

use crate::errors::PelotonError;
use crate::feed::{RiderId, RosterEntry};

/// Label used for riders missing from the roster.
pub const UNKNOWN_RIDER: &str = "unknown";

/// Race-wide lookup state built once at startup: rider display names and the set of
/// riders the report follows individually.
#[derive(Clone, Debug, Default)]
pub struct RaceContext {
    names: HashMap<RiderId, String>,
    tracked: BTreeSet<RiderId>,
}

impl RaceContext {
    /// Build the context from a roster.
    ///
    /// Riders of `tracked_nationality` that have not withdrawn are followed, together with
    /// every id in `extra_riders` regardless of status.
    pub fn new(
        roster: &[RosterEntry],
        tracked_nationality: Option<&str>,
        extra_riders: &[RiderId],
    ) -> Self {
        let names = roster
            .iter()
            .map(|r| (r.id, format!("{}, {}", r.last_name, r.first_name)))
            .collect();

        let mut tracked: BTreeSet<RiderId> = match tracked_nationality {
            Some(nationality) => roster
                .iter()
                .filter(|r| !r.is_withdrawn && r.nationality.eq_ignore_ascii_case(nationality))
                .map(|r| r.id)
                .collect(),
            None => BTreeSet::new(),
        };
        tracked.extend(extra_riders.iter().copied());

        info!(
            "Race context: {} riders in roster, following {}",
            roster.len(),
            tracked.len()
        );
        Self { names, tracked }
    }

    /// "Last, First" for a known rider, [`UNKNOWN_RIDER`] otherwise.
    pub fn rider_name(&self, id: RiderId) -> &str {
        self.names.get(&id).map(String::as_str).unwrap_or(UNKNOWN_RIDER)
    }

    pub fn is_tracked(&self, id: RiderId) -> bool {
        self.tracked.contains(&id)
    }

    pub fn tracked_riders(&self) -> &BTreeSet<RiderId> {
        &self.tracked
    }
}

/// Read a roster cached on disk in the format of the roster endpoint.
pub fn load_roster_file(path: &Path) -> Result<Vec<RosterEntry>, PelotonError> {
    let content = fs::read_to_string(path).map_err(|e| PelotonError::FileReadError {
        path: path.to_path_buf(),
        source: e,
    })?;
    let roster: Vec<RosterEntry> =
        serde_json::from_str(&content).map_err(|e| PelotonError::FileParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
    debug!("Loaded {} roster entries from {:?}", roster.len(), path);
    Ok(roster)
}
