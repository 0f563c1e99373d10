use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::Sender,
    },
    thread,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use log::{debug, error, info, warn};

use crate::PelotonError;
use crate::course::{PositionTracker, Route};
use crate::report::{FastestRider, RaceReport};
use crate::riders::{RaceContext, RiderTracker};

use super::{Snapshot, producer::SnapshotProducer};

const SHUTDOWN_CHECK_MS: u64 = 100;

/// Timing of the polling loop.
#[derive(Clone, Debug, PartialEq)]
pub struct PollSettings {
    /// Delay between two polls
    pub interval: Duration,
    /// A live feed whose timestamp lags wall-clock time by more than this is over
    pub stale_after: Duration,
    /// Failed polls in a row before giving up, 0 never gives up. Empty bodies are not
    /// failures, the feed answers `null` until the stage starts.
    pub max_consecutive_failures: u32,
}

/// Why the polling loop ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    Shutdown,
    StaleFeed { last_timestamp: i64 },
    Exhausted,
    TooManyFailures { failures: u32 },
}

/// Everything the loop mutates while following a race.
///
/// Owned by the polling loop only, one snapshot is applied completely before the next
/// one is fetched.
#[derive(Clone, Debug)]
pub struct RaceState {
    pub tracker: PositionTracker,
    pub riders: RiderTracker,
    pub fastest: FastestRider,
    last_timestamp: Option<i64>,
}

impl RaceState {
    pub fn new(route: Arc<Route>) -> Self {
        Self {
            tracker: PositionTracker::new(route),
            riders: RiderTracker::new(),
            fastest: FastestRider::default(),
            last_timestamp: None,
        }
    }

    pub fn last_timestamp(&self) -> Option<i64> {
        self.last_timestamp
    }

    /// Apply one validated snapshot: record the leader, query every group's gap to the head
    /// and refresh the roster.
    ///
    /// Snapshots that do not advance past the last applied timestamp are ignored and
    /// yield `None`.
    pub fn apply(&mut self, snapshot: &Snapshot, context: &RaceContext) -> Option<RaceReport> {
        if self.last_timestamp.is_some_and(|last| snapshot.timestamp <= last) {
            debug!("Ignoring snapshot {}, no newer than the last one", snapshot.timestamp);
            return None;
        }
        let leader = snapshot.leader()?;
        self.last_timestamp = Some(snapshot.timestamp);

        self.tracker.record_head(leader.position(), snapshot.timestamp);
        if self.fastest.observe(snapshot, context) {
            info!("New max speed {} km/h by {}", self.fastest.speed, self.fastest.name);
        }
        let missing = self.riders.update(snapshot);
        let missing = self
            .riders
            .riders()
            .into_iter()
            .filter(|status| missing.contains(&status.rider_id))
            .collect();
        RaceReport::build(snapshot, &self.tracker, context, &self.fastest, missing)
    }
}

pub fn now_epoch_s() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Whether a snapshot taken at `timestamp` is older than `stale_after` at `now`.
pub fn is_stale(timestamp: i64, now: i64, stale_after: Duration) -> bool {
    now - timestamp > stale_after.as_secs() as i64
}

/// Sleep for `interval`, waking early on shutdown. Returns true if shutdown was requested.
fn wait(interval: Duration, shutdown: &AtomicBool) -> bool {
    let deadline = Instant::now() + interval;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        thread::sleep((deadline - now).min(Duration::from_millis(SHUTDOWN_CHECK_MS)));
    }
}

/// Poll `producer` until the race is over or shutdown is requested.
///
/// Each snapshot is applied to `state` and the resulting report sent to `report_sender`;
/// the raw snapshot also goes to `snapshot_writer_sender` when given. Transient feed
/// errors and empty bodies skip the poll without touching `state`. Only transient errors
/// count toward `max_consecutive_failures`.
pub fn collect_race(
    mut producer: impl SnapshotProducer,
    state: &mut RaceState,
    context: &RaceContext,
    settings: &PollSettings,
    report_sender: Sender<RaceReport>,
    mut snapshot_writer_sender: Option<Sender<Snapshot>>,
    shutdown: &AtomicBool,
) -> Result<StopReason, PelotonError> {
    producer.start()?;
    let mut failures: u32 = 0;

    loop {
        if shutdown.load(Ordering::Relaxed) {
            return Ok(StopReason::Shutdown);
        }

        match producer.snapshot() {
            Err(PelotonError::FeedExhausted) => {
                info!("Feed exhausted");
                return Ok(StopReason::Exhausted);
            }
            Err(e) if e.is_transient() => {
                failures += 1;
                warn!("Skipping poll ({} in a row): {}", failures, e);
            }
            Err(e) => return Err(e),
            Ok(None) => {
                failures = 0;
                info!("no content");
            }
            Ok(Some(snapshot)) => {
                failures = 0;
                if producer.is_live()
                    && is_stale(snapshot.timestamp, now_epoch_s(), settings.stale_after)
                {
                    info!("no update since {}... quitting...", snapshot.timestamp);
                    return Ok(StopReason::StaleFeed {
                        last_timestamp: snapshot.timestamp,
                    });
                }

                if let Some(report) = state.apply(&snapshot, context) {
                    report_sender.send(report)?;
                }

                if let Some(writer_sender) = &snapshot_writer_sender {
                    if let Err(e) = writer_sender.send(snapshot) {
                        error!("Snapshot writer stopped, no longer saving snapshots: {}", e);
                        snapshot_writer_sender = None;
                    }
                }
            }
        }

        let cap = settings.max_consecutive_failures;
        if cap > 0 && failures > cap {
            error!("Giving up after {} failed polls", failures);
            return Ok(StopReason::TooManyFailures { failures });
        }

        if wait(settings.interval, shutdown) {
            return Ok(StopReason::Shutdown);
        }
    }
}
