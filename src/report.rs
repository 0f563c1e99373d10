// Per-poll race summary rendered to the console

use std::{fmt, sync::mpsc::Receiver};

use itertools::Itertools;
use uom::si::{f64::Length, length::kilometer};

use crate::course::{HeadGap, PositionTracker, Provenance};
use crate::feed::{RiderId, Snapshot};
use crate::riders::{RaceContext, RiderStatus};

const CLEAR_SCREEN: &str = "\x1B[2J\x1B[1;1H";

/// Format seconds as `m:ss`.
pub fn format_gap(total_secs: f64) -> String {
    let sign = if total_secs < 0. { "-" } else { "" };
    let total_secs = total_secs.abs();
    let mins = (total_secs / 60.).floor() as u64;
    let secs = (total_secs % 60.).floor() as u64;
    format!("{}{}:{:02}", sign, mins, secs)
}

/// Highest speed seen so far and who rode it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FastestRider {
    pub rider_id: RiderId,
    /// km/h
    pub speed: f64,
    pub name: String,
}

impl FastestRider {
    /// Update from every rider in `snapshot`. Returns true when the record changed.
    pub fn observe(&mut self, snapshot: &Snapshot, context: &RaceContext) -> bool {
        let mut changed = false;
        for (_, rider) in snapshot.riders() {
            if rider.current_speed > self.speed {
                self.speed = rider.current_speed;
                self.rider_id = rider.id;
                self.name = context.rider_name(rider.id).to_string();
                changed = true;
            }
        }
        changed
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LeaderLine {
    pub rider_id: RiderId,
    /// km
    pub distance_to_finish: f64,
    /// km/h
    pub speed: f64,
    /// Share of the route covered by the head of the race, `None` before the first fix
    pub progress: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RiderLine {
    pub position_in_group: u32,
    pub name: String,
    pub yellow_jersey: bool,
    /// km/h
    pub speed: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GroupLine {
    pub name: String,
    pub size: u32,
    /// Distance to the finish for the lead group, distance behind it for the others
    pub distance: Length,
    /// Official gap reported by the feed, `None` for the lead group
    pub official_gap_s: Option<f64>,
    /// Gap derived from the leader's crossing times along the route
    pub head_gap: Option<HeadGap>,
    /// Followed riders in this group
    pub riders: Vec<RiderLine>,
}

/// Summary of one snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct RaceReport {
    pub timestamp: i64,
    pub leader: LeaderLine,
    pub groups: Vec<GroupLine>,
    pub fastest: Option<FastestRider>,
    /// Riders absent from this snapshot, with where they were last seen
    pub missing: Vec<RiderStatus>,
}

impl RaceReport {
    /// Build the report for `snapshot`. The position tracker must already hold the
    /// snapshot's leader fix. Returns `None` for a snapshot without a leader.
    pub fn build(
        snapshot: &Snapshot,
        tracker: &PositionTracker,
        context: &RaceContext,
        fastest: &FastestRider,
        missing: Vec<RiderStatus>,
    ) -> Option<Self> {
        let leader = snapshot.leader()?;
        let lead_distance = snapshot.groups.first()?.group_distance_to_finish;

        let groups = snapshot
            .groups
            .iter()
            .enumerate()
            .map(|(i, group)| {
                let is_lead_group = i == 0;
                let distance = if is_lead_group {
                    group.group_distance_to_finish
                } else {
                    group.group_distance_to_finish - lead_distance
                };
                let head_gap = if is_lead_group {
                    None
                } else {
                    group
                        .lead_rider()
                        .and_then(|r| tracker.gap_to_head(r.position(), snapshot.timestamp))
                };
                GroupLine {
                    name: group.group_name.clone(),
                    size: group.group_size,
                    distance: Length::new::<kilometer>(distance),
                    official_gap_s: (!is_lead_group).then_some(group.gap_to_leading_group_t),
                    head_gap,
                    riders: group
                        .riders
                        .iter()
                        .filter(|r| context.is_tracked(r.id))
                        .map(|r| RiderLine {
                            position_in_group: r.position_in_the_group,
                            name: context.rider_name(r.id).to_string(),
                            yellow_jersey: r.has_yellow_jersey,
                            speed: r.current_speed,
                        })
                        .collect(),
                }
            })
            .collect();

        Some(Self {
            timestamp: snapshot.timestamp,
            leader: LeaderLine {
                rider_id: leader.id,
                distance_to_finish: leader.distance_to_finish,
                speed: leader.current_speed,
                progress: tracker
                    .last_observed_index()
                    .map(|index| tracker.route().progress(index)),
            },
            groups,
            fastest: (fastest.speed > 0.).then(|| fastest.clone()),
            missing,
        })
    }
}

impl fmt::Display for RaceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "head of the race: {:.1} km to go / current speed: {} km/h",
            self.leader.distance_to_finish, self.leader.speed
        )?;
        match self.leader.progress {
            Some(progress) => writeln!(f, " / {:.0}% of the route", progress * 100.)?,
            None => writeln!(f)?,
        }
        for group in &self.groups {
            if let Some(gap) = &group.head_gap {
                let marker = match gap.provenance {
                    Provenance::Observed => "",
                    Provenance::Interpolated => " (interpolated)",
                };
                writeln!(
                    f,
                    "timediff w/head: {}{}",
                    format_gap(gap.seconds as f64),
                    marker
                )?;
            }
            let km = group.distance.get::<kilometer>();
            match group.official_gap_s {
                None => writeln!(
                    f,
                    "{} has {} riders and {:.1} km left",
                    group.name, group.size, km
                )?,
                Some(gap) => writeln!(
                    f,
                    "{} has {} riders and {:.1} km behind ({})",
                    group.name,
                    group.size,
                    km,
                    format_gap(gap)
                )?,
            }
            for rider in &group.riders {
                writeln!(
                    f,
                    "  {:>3}. {}{} travelling @ {} km/h",
                    rider.position_in_group,
                    if rider.yellow_jersey { "* " } else { "" },
                    rider.name,
                    rider.speed
                )?;
            }
        }
        if let Some(fastest) = &self.fastest {
            writeln!(
                f,
                "max speed: {} km/h by rider {}",
                fastest.speed, fastest.name
            )?;
        }
        if !self.missing.is_empty() {
            let mut missing = self.missing.iter().map(|s| {
                format!(
                    "{} (last in group {}, {} updates)",
                    s.rider_id, s.group_id, s.missing_for
                )
            });
            writeln!(f, "missing: {}", missing.join(", "))?;
        }
        Ok(())
    }
}

/// Print every report received until the sending side hangs up.
pub fn print_reports(report_receiver: Receiver<RaceReport>, clear_screen: bool) {
    for report in &report_receiver {
        if clear_screen {
            print!("{}", CLEAR_SCREEN);
        }
        println!("{}", report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::course::Route;
    use crate::feed::{Group, Rider, RosterEntry, Waypoint};
    use std::sync::Arc;

    fn rider(id: RiderId, lat: f64, speed: f64) -> Rider {
        Rider {
            id,
            latitude: lat,
            longitude: 6.0,
            current_speed: speed,
            distance_to_finish: 40.0,
            position_in_the_group: 1,
            ..Rider::default()
        }
    }

    fn context() -> RaceContext {
        RaceContext::new(
            &[RosterEntry {
                id: 9,
                first_name: "Bauke".to_string(),
                last_name: "Mollema".to_string(),
                nationality: "Netherlands".to_string(),
                is_withdrawn: false,
            }],
            Some("Netherlands"),
            &[],
        )
    }

    fn snapshot(timestamp: i64) -> Snapshot {
        Snapshot {
            timestamp,
            groups: vec![
                Group {
                    group_id: 1,
                    group_name: "Head of the race".to_string(),
                    group_size: 1,
                    group_distance_to_finish: 40.0,
                    riders: vec![rider(31, 45.002, 45.0)],
                    ..Group::default()
                },
                Group {
                    group_id: 2,
                    group_name: "Peloton".to_string(),
                    group_size: 150,
                    group_distance_to_finish: 41.5,
                    gap_to_leading_group_t: 95.,
                    riders: vec![rider(9, 45.001, 52.5)],
                    ..Group::default()
                },
            ],
            ..Snapshot::default()
        }
    }

    #[test]
    fn test_format_gap() {
        assert_eq!(format_gap(0.), "0:00");
        assert_eq!(format_gap(95.), "1:35");
        assert_eq!(format_gap(3605.7), "60:05");
        assert_eq!(format_gap(-7.), "-0:07");
    }

    #[test]
    fn test_fastest_rider() {
        let context = context();
        let mut fastest = FastestRider::default();
        assert!(fastest.observe(&snapshot(100), &context));
        assert_eq!(fastest.rider_id, 9);
        assert_eq!(fastest.name, "Mollema, Bauke");
        assert!(!fastest.observe(&snapshot(105), &context));
    }

    #[test]
    fn test_build_report() {
        let route = Arc::new(
            Route::load((0..3).map(|i| Waypoint::new(45.0 + i as f64 * 0.001, 6.0))).unwrap(),
        );
        let mut tracker = PositionTracker::new(route);
        tracker.record_head(Waypoint::new(45.0, 6.0), 100);
        tracker.record_head(Waypoint::new(45.002, 6.0), 106);

        let context = context();
        let snapshot = snapshot(110);
        let mut fastest = FastestRider::default();
        fastest.observe(&snapshot, &context);

        let report = RaceReport::build(
            &snapshot,
            &tracker,
            &context,
            &fastest,
            vec![RiderStatus {
                rider_id: 5,
                group_id: 1,
                missing_for: 2,
            }],
        )
        .unwrap();

        assert_eq!(report.leader.rider_id, 31);
        assert_eq!(report.leader.progress, Some(1.0));
        assert_eq!(report.groups.len(), 2);
        assert!(report.groups[0].head_gap.is_none());
        assert!(report.groups[0].riders.is_empty());
        assert_eq!(report.groups[1].official_gap_s, Some(95.));
        let gap = report.groups[1].head_gap.unwrap();
        assert_eq!(gap.seconds, 7);
        assert_eq!(gap.provenance, Provenance::Interpolated);
        assert!((report.groups[1].distance.get::<kilometer>() - 1.5).abs() < 1e-9);
        assert_eq!(report.groups[1].riders[0].name, "Mollema, Bauke");

        let text = report.to_string();
        assert!(text.contains(
            "head of the race: 40.0 km to go / current speed: 45 km/h / 100% of the route"
        ));
        assert!(text.contains("timediff w/head: 0:07 (interpolated)"));
        assert!(text.contains("Peloton has 150 riders and 1.5 km behind (1:35)"));
        assert!(text.contains("    1. Mollema, Bauke travelling @ 52.5 km/h"));
        assert!(text.contains("max speed: 52.5 km/h by rider Mollema, Bauke"));
        assert!(text.contains("missing: 5 (last in group 1, 2 updates)"));
    }

    #[test]
    fn test_build_report_without_leader() {
        let tracker = PositionTracker::new(Arc::new(
            Route::load(vec![Waypoint::new(45.0, 6.0)]).unwrap(),
        ));
        let report = RaceReport::build(
            &Snapshot::default(),
            &tracker,
            &RaceContext::default(),
            &FastestRider::default(),
            Vec::new(),
        );
        assert!(report.is_none());
    }
}
