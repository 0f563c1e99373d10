// Leader crossing times along the route and time-behind-head queries

use std::sync::Arc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use uom::si::f64::Length;

use crate::feed::Waypoint;

use super::route::{Projection, Route};

/// Leader fixes further than this from the nearest waypoint are still recorded, but logged.
const OFF_COURSE_WARN_M: f64 = 1_000.;

/// How a crossing time was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provenance {
    /// A leader fix projected directly onto the waypoint
    Observed,
    /// Linearly interpolated between two set waypoints, lower confidence
    Interpolated,
}

/// Time at which the leader was at a waypoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crossing {
    /// Epoch seconds
    pub timestamp: i64,
    pub provenance: Provenance,
}

/// One optional crossing per route waypoint.
///
/// Slots are never cleared. An observed slot can be replaced by a later observation at the
/// same index, an interpolated slot is only ever written into an empty one. Timestamps are
/// not guaranteed to increase with the index.
#[derive(Clone, Debug, PartialEq)]
pub struct CrossingTable {
    slots: Vec<Option<Crossing>>,
}

impl CrossingTable {
    pub fn new(len: usize) -> Self {
        Self {
            slots: vec![None; len],
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Crossing> {
        self.slots.get(index).copied().flatten()
    }

    /// Number of slots holding a crossing.
    pub fn filled(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn timestamps(&self) -> Vec<Option<i64>> {
        self.slots.iter().map(|s| s.map(|c| c.timestamp)).collect()
    }

    fn observe(&mut self, index: usize, timestamp: i64) {
        self.slots[index] = Some(Crossing {
            timestamp,
            provenance: Provenance::Observed,
        });
    }

    /// Interpolate the empty slots between `index` and the nearest set slot below it.
    ///
    /// The backward scan stops at the start of the table: when nothing below `index` is
    /// set there is nothing to interpolate from and the table is left alone. Returns the
    /// number of slots written.
    fn fill_gap_before(&mut self, index: usize) -> usize {
        let Some(end) = self.get(index) else {
            return 0;
        };
        let Some((start_index, start)) = (0..index)
            .rev()
            .find_map(|i| self.slots[i].map(|crossing| (i, crossing)))
        else {
            return 0;
        };

        let span = index - start_index;
        let step = (end.timestamp - start.timestamp) as f64 / span as f64;
        for k in 1..span {
            let timestamp = (start.timestamp as f64 + k as f64 * step).round() as i64;
            self.slots[start_index + k] = Some(Crossing {
                timestamp,
                provenance: Provenance::Interpolated,
            });
        }
        span - 1
    }
}

/// Time gap between a point on course and the moment the leader passed it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HeadGap {
    /// Seconds since the leader crossed the point's waypoint
    pub seconds: i64,
    pub provenance: Provenance,
    /// Waypoint index the point was projected onto
    pub index: usize,
    /// Distance between the point and that waypoint
    pub distance: Length,
}

/// Tracks where the head of the race has been along the route.
///
/// Every leader fix is projected onto the route and its timestamp stored at the matching
/// waypoint. Waypoints skipped between two fixes are filled in assuming the leader rode at
/// a constant pace between them, so the error of an interpolated slot is bounded by the
/// time between the two fixes divided by the number of slots filled.
#[derive(Clone, Debug)]
pub struct PositionTracker {
    route: Arc<Route>,
    crossings: CrossingTable,
    last_observed_index: Option<usize>,
}

impl PositionTracker {
    pub fn new(route: Arc<Route>) -> Self {
        let crossings = CrossingTable::new(route.len());
        Self {
            route,
            crossings,
            last_observed_index: None,
        }
    }

    pub fn route(&self) -> &Arc<Route> {
        &self.route
    }

    pub fn crossings(&self) -> &CrossingTable {
        &self.crossings
    }

    pub fn crossing(&self, index: usize) -> Option<Crossing> {
        self.crossings.get(index)
    }

    pub fn last_observed_index(&self) -> Option<usize> {
        self.last_observed_index
    }

    /// Record the leader at `position` at `timestamp` (epoch seconds) and fill any
    /// waypoints skipped since the previous fix.
    pub fn record_head(&mut self, position: Waypoint, timestamp: i64) -> Projection {
        let projection = self.route.closest_index(position);
        if projection.distance_m() > OFF_COURSE_WARN_M {
            warn!(
                "Leader fix at ({}, {}) is {:.0} m away from the nearest waypoint {}",
                position.latitude,
                position.longitude,
                projection.distance_m(),
                projection.index
            );
        }

        self.crossings.observe(projection.index, timestamp);
        self.last_observed_index = Some(projection.index);

        let filled = self.crossings.fill_gap_before(projection.index);
        debug!(
            "Leader at waypoint {}/{} at {}, interpolated {} skipped waypoints",
            projection.index,
            self.route.len(),
            timestamp,
            filled
        );
        projection
    }

    /// Seconds between the leader passing the waypoint nearest to `point` and `timestamp`.
    ///
    /// `None` when the leader has not been recorded at that waypoint yet.
    pub fn time_behind_head(&self, point: Waypoint, timestamp: i64) -> Option<i64> {
        self.gap_to_head(point, timestamp).map(|gap| gap.seconds)
    }

    /// Like [`time_behind_head`](Self::time_behind_head) but also reports whether the
    /// crossing was observed or interpolated, and how well `point` matched the route.
    pub fn gap_to_head(&self, point: Waypoint, timestamp: i64) -> Option<HeadGap> {
        let projection = self.route.closest_index(point);
        let crossing = self.crossings.get(projection.index)?;
        Some(HeadGap {
            seconds: timestamp - crossing.timestamp,
            provenance: crossing.provenance,
            index: projection.index,
            distance: projection.distance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn route(len: usize) -> Arc<Route> {
        Arc::new(
            Route::load((0..len).map(|i| Waypoint::new(45.0 + i as f64 * 0.001, 6.0))).unwrap(),
        )
    }

    fn at(tracker: &PositionTracker, index: usize) -> Waypoint {
        tracker.route().waypoint(index).unwrap()
    }

    #[test]
    fn test_skipped_waypoint_is_interpolated() {
        let mut tracker = PositionTracker::new(route(3));
        let a = at(&tracker, 0);
        let c = at(&tracker, 2);

        tracker.record_head(a, 100);
        tracker.record_head(c, 106);

        assert_eq!(
            tracker.crossings().timestamps(),
            vec![Some(100), Some(103), Some(106)]
        );
        assert_eq!(
            tracker.crossing(1).unwrap().provenance,
            Provenance::Interpolated
        );
        assert_eq!(tracker.crossing(2).unwrap().provenance, Provenance::Observed);
        assert_eq!(tracker.last_observed_index(), Some(2));
    }

    #[test]
    fn test_time_behind_head_at_interpolated_waypoint() {
        let mut tracker = PositionTracker::new(route(3));
        tracker.record_head(at(&tracker, 0), 100);
        tracker.record_head(at(&tracker, 2), 106);

        // a little off course, but nearest to the middle waypoint
        let b = at(&tracker, 1);
        let near_b = Waypoint::new(b.latitude + 0.0001, b.longitude + 0.0001);
        assert_eq!(tracker.time_behind_head(near_b, 110), Some(7));

        let gap = tracker.gap_to_head(near_b, 110).unwrap();
        assert_eq!(gap.index, 1);
        assert_eq!(gap.provenance, Provenance::Interpolated);
    }

    #[test]
    fn test_time_behind_head_before_any_fix() {
        let tracker = PositionTracker::new(route(3));
        let b = at(&tracker, 1);
        assert_eq!(tracker.time_behind_head(b, 50), None);
        assert!(tracker.last_observed_index().is_none());
    }

    #[test]
    fn test_time_behind_head_ahead_of_leader() {
        let mut tracker = PositionTracker::new(route(10));
        tracker.record_head(at(&tracker, 3), 100);
        assert_eq!(tracker.time_behind_head(at(&tracker, 7), 120), None);
        assert_eq!(tracker.time_behind_head(at(&tracker, 3), 120), Some(20));
    }

    #[test]
    fn test_first_fix_mid_course_does_not_fill() {
        let mut tracker = PositionTracker::new(route(10));
        tracker.record_head(at(&tracker, 6), 100);
        assert_eq!(tracker.crossings().filled(), 1);
        assert!((0..6).all(|i| tracker.crossing(i).is_none()));
    }

    #[test]
    fn test_repeated_fix_overwrites_observation() {
        let mut tracker = PositionTracker::new(route(5));
        tracker.record_head(at(&tracker, 0), 100);
        tracker.record_head(at(&tracker, 2), 110);
        tracker.record_head(at(&tracker, 2), 115);
        assert_eq!(
            tracker.crossings().timestamps(),
            vec![Some(100), Some(105), Some(115), None, None]
        );
    }

    #[test]
    fn test_leader_jumping_backwards_keeps_later_slots() {
        let mut tracker = PositionTracker::new(route(6));
        tracker.record_head(at(&tracker, 0), 100);
        tracker.record_head(at(&tracker, 4), 140);
        // noisy fix projected behind the previous one
        tracker.record_head(at(&tracker, 3), 145);
        assert_eq!(
            tracker.crossings().timestamps(),
            vec![Some(100), Some(110), Some(120), Some(145), Some(140), None]
        );
        assert_eq!(tracker.last_observed_index(), Some(3));
    }

    #[test]
    fn test_gap_fill_starts_from_nearest_set_slot() {
        let mut table = CrossingTable::new(8);
        table.observe(0, 100);
        table.observe(3, 130);
        table.observe(6, 190);

        assert_eq!(table.fill_gap_before(6), 2);
        assert_eq!(
            table.timestamps(),
            vec![Some(100), None, None, Some(130), Some(150), Some(170), Some(190), None]
        );
        // nothing set below, nothing to fill from
        assert_eq!(table.fill_gap_before(0), 0);
        // slot itself empty
        assert_eq!(table.fill_gap_before(7), 0);
    }

    #[test]
    fn test_single_waypoint_route() {
        let mut tracker = PositionTracker::new(route(1));
        let only = at(&tracker, 0);
        tracker.record_head(only, 10);
        tracker.record_head(Waypoint::new(46.0, 7.0), 20);
        assert_eq!(tracker.crossings().timestamps(), vec![Some(20)]);
        assert_eq!(tracker.time_behind_head(only, 25), Some(5));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_gap_fill_is_monotonic_and_even(
            start in 0usize..20,
            span in 2usize..60,
            t_start in 1_400_000_000i64..1_500_000_000,
            extra in 0i64..5_000,
        ) {
            let mut tracker = PositionTracker::new(route(100));
            let end = start + span;
            let t_end = t_start + span as i64 + extra;

            tracker.record_head(at(&tracker, start), t_start);
            tracker.record_head(at(&tracker, end), t_end);

            let filled: Vec<i64> = (start + 1..end)
                .map(|i| tracker.crossing(i).unwrap().timestamp)
                .collect();
            prop_assert_eq!(filled.len(), span - 1);
            prop_assert!(filled.iter().all(|&t| t > t_start && t < t_end));
            prop_assert!(filled.windows(2).all(|w| w[0] < w[1]));

            // even spacing up to rounding
            let steps: Vec<i64> = std::iter::once(t_start)
                .chain(filled.iter().copied())
                .chain(std::iter::once(t_end))
                .collect::<Vec<_>>()
                .windows(2)
                .map(|w| w[1] - w[0])
                .collect();
            let min = *steps.iter().min().unwrap();
            let max = *steps.iter().max().unwrap();
            prop_assert!(max - min <= 1);
        }

        #[test]
        fn prop_slots_are_never_cleared(
            fixes in proptest::collection::vec((0usize..50, 0i64..10_000), 1..40),
        ) {
            let mut tracker = PositionTracker::new(route(50));
            let mut previously_set = Vec::new();
            for (index, timestamp) in fixes {
                tracker.record_head(at(&tracker, index), timestamp);
                for &i in &previously_set {
                    prop_assert!(tracker.crossing(i).is_some());
                }
                previously_set = (0..50).filter(|&i| tracker.crossing(i).is_some()).collect();
                prop_assert_eq!(tracker.crossing(index).unwrap().timestamp, timestamp);
            }
        }

        #[test]
        fn prop_unset_waypoints_report_none(
            index in 0usize..30,
            timestamp in 0i64..10_000,
        ) {
            let mut tracker = PositionTracker::new(route(30));
            tracker.record_head(at(&tracker, 15), 5_000);
            let expected = if index == 15 { Some(timestamp - 5_000) } else { None };
            prop_assert_eq!(tracker.time_behind_head(at(&tracker, index), timestamp), expected);
        }
    }
}
