use std::{
    collections::VecDeque,
    fs,
    path::{Path, PathBuf},
};

use log::{debug, info, warn};

use crate::errors::PelotonError;

use super::{FeedClient, Snapshot};

/// A source of race snapshots.
///
/// This trait abstracts where snapshots come from, so the polling loop works the same way
/// against the live tracking API and against snapshots recorded earlier.
///
/// # Lifecycle
///
/// 1. Call `start()` once before polling
/// 2. Call `snapshot()` once per poll
pub trait SnapshotProducer {
    /// Prepare the source.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be used at all.
    fn start(&mut self) -> Result<(), PelotonError>;

    /// Fetch the next snapshot.
    ///
    /// Returns `Ok(None)` when the source answered without content. Transient failures
    /// (see [`PelotonError::is_transient`]) may succeed on the next call;
    /// `PelotonError::FeedExhausted` means no further snapshot will ever come.
    fn snapshot(&mut self) -> Result<Option<Snapshot>, PelotonError>;

    /// Whether the wall-clock staleness check applies to this source.
    fn is_live(&self) -> bool;
}

/// Polls the live race endpoint.
pub struct LiveFeedProducer {
    client: FeedClient,
}

impl LiveFeedProducer {
    pub fn new(client: FeedClient) -> Self {
        Self { client }
    }
}

impl SnapshotProducer for LiveFeedProducer {
    fn start(&mut self) -> Result<(), PelotonError> {
        info!("Polling live feed at {}", self.client.race_url());
        Ok(())
    }

    fn snapshot(&mut self) -> Result<Option<Snapshot>, PelotonError> {
        self.client.snapshot()
    }

    fn is_live(&self) -> bool {
        true
    }
}

/// MockSnapshotProducer replays snapshots that were recorded earlier or built in code.
///
/// This enables:
/// - Unit testing of the polling loop without network access
/// - Replaying a stage from the snapshot files written during a live session
pub struct MockSnapshotProducer {
    bodies: VecDeque<Replay>,
}

enum Replay {
    Snapshot(Box<Snapshot>),
    Body { origin: String, body: String },
}

impl MockSnapshotProducer {
    /// Replay the given snapshots in order.
    pub fn from_snapshots(snapshots: Vec<Snapshot>) -> Self {
        Self {
            bodies: snapshots
                .into_iter()
                .map(|s| Replay::Snapshot(Box::new(s)))
                .collect(),
        }
    }

    /// Replay raw feed bodies, each parsed and validated as if it came from the network.
    pub fn from_bodies(bodies: Vec<String>) -> Self {
        Self {
            bodies: bodies
                .into_iter()
                .enumerate()
                .map(|(i, body)| Replay::Body {
                    origin: format!("body #{}", i),
                    body,
                })
                .collect(),
        }
    }

    /// Replay every `*.json` snapshot file in `dir`, ordered by the epoch timestamp in the
    /// file name.
    ///
    /// Unreadable files are skipped with a warning; a file that fails to parse is reported
    /// when its turn comes.
    pub fn from_dir(dir: &Path) -> Result<Self, PelotonError> {
        let entries = fs::read_dir(dir).map_err(|e| PelotonError::FileReadError {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let mut files: Vec<(i64, PathBuf)> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|path| {
                let timestamp = path.file_stem()?.to_str()?.parse::<i64>().ok();
                if timestamp.is_none() {
                    debug!("Skipping {:?}, not named after a timestamp", path);
                }
                timestamp.map(|t| (t, path))
            })
            .collect();
        files.sort();
        info!("Replaying {} snapshot files from {:?}", files.len(), dir);

        let mut bodies = VecDeque::with_capacity(files.len());
        for (_, path) in files {
            match fs::read_to_string(&path) {
                Ok(body) => bodies.push_back(Replay::Body {
                    origin: path.display().to_string(),
                    body,
                }),
                Err(e) => warn!("Could not read {:?}: {}", path, e),
            }
        }
        Ok(Self { bodies })
    }

    pub fn remaining(&self) -> usize {
        self.bodies.len()
    }
}

impl SnapshotProducer for MockSnapshotProducer {
    fn start(&mut self) -> Result<(), PelotonError> {
        // Mock producer doesn't need to connect to anything
        Ok(())
    }

    fn snapshot(&mut self) -> Result<Option<Snapshot>, PelotonError> {
        match self.bodies.pop_front() {
            None => Err(PelotonError::FeedExhausted),
            Some(Replay::Snapshot(snapshot)) => {
                snapshot.validate()?;
                Ok(Some(*snapshot))
            }
            Some(Replay::Body { origin, body }) => Snapshot::parse(&body, &origin),
        }
    }

    fn is_live(&self) -> bool {
        false
    }
}
