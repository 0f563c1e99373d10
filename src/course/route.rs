// Fixed stage route and nearest-waypoint projection

use std::{fs, path::Path};

use geo::{Distance, Haversine, Point};
use itertools::Itertools;
use log::debug;
use uom::si::{f64::Length, length::meter};

use crate::errors::PelotonError;
use crate::feed::Waypoint;

/// Result of projecting an arbitrary point onto the route.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
    /// Index of the nearest waypoint, i.e. progress along the course
    pub index: usize,
    /// The nearest waypoint itself
    pub waypoint: Waypoint,
    /// Great-circle distance between the projected point and `waypoint`
    pub distance: Length,
}

impl Projection {
    pub fn distance_m(&self) -> f64 {
        self.distance.get::<meter>()
    }
}

/// Ordered, immutable sequence of course waypoints from start to finish.
///
/// The index of a waypoint encodes how far along the course it is, so routes that loop
/// back over themselves are not supported.
#[derive(Clone, Debug, PartialEq)]
pub struct Route {
    waypoints: Vec<Waypoint>,
}

impl Route {
    /// Build a route from the ordered course points.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRoute` if the sequence is empty or contains a point that is not a
    /// valid coordinate.
    pub fn load(points: impl IntoIterator<Item = Waypoint>) -> Result<Self, PelotonError> {
        let waypoints: Vec<Waypoint> = points.into_iter().collect();
        if waypoints.is_empty() {
            return Err(PelotonError::InvalidRoute {
                reason: "route has no waypoints".to_string(),
            });
        }
        if let Some((index, point)) = waypoints.iter().find_position(|p| !p.is_valid()) {
            return Err(PelotonError::InvalidRoute {
                reason: format!(
                    "waypoint {} is not a valid coordinate ({}, {})",
                    index, point.latitude, point.longitude
                ),
            });
        }
        debug!("Loaded route with {} waypoints", waypoints.len());
        Ok(Self { waypoints })
    }

    /// Load a route from a JSON file holding a list of `{Latitude, Longitude}` objects, the
    /// same format the stage route endpoint returns.
    pub fn from_file(path: &Path) -> Result<Self, PelotonError> {
        let content = fs::read_to_string(path).map_err(|e| PelotonError::FileReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let points: Vec<Waypoint> =
            serde_json::from_str(&content).map_err(|e| PelotonError::FileParseError {
                path: path.to_path_buf(),
                source: e,
            })?;
        Self::load(points)
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    /// Always false, a route holds at least one waypoint.
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn waypoint(&self, index: usize) -> Option<Waypoint> {
        self.waypoints.get(index).copied()
    }

    /// Fraction of the course index range covered at `index`, clamped to 0.0-1.0.
    pub fn progress(&self, index: usize) -> f64 {
        if self.waypoints.len() < 2 {
            return 1.0;
        }
        (index as f64 / (self.waypoints.len() - 1) as f64).clamp(0.0, 1.0)
    }

    /// Find the waypoint nearest to `point`.
    ///
    /// Ranking uses the squared difference of raw latitude/longitude pairs, which is cheap
    /// enough to run against every waypoint on every query. Only the winning waypoint gets
    /// an accurate great-circle distance. The ranking degrades on routes spanning a large
    /// range of latitudes, where a degree of longitude shrinks noticeably.
    ///
    /// Never fails: a point far away from the course still gets the best-effort nearest
    /// index, and callers decide from `distance` whether to trust it. Ties go to the
    /// lowest index.
    pub fn closest_index(&self, point: Waypoint) -> Projection {
        let index = self
            .waypoints
            .iter()
            .map(|w| planar_distance_sq(w, &point))
            .position_min_by(|a, b| a.total_cmp(b))
            .unwrap_or(0);
        let waypoint = self.waypoints[index];

        Projection {
            index,
            waypoint,
            distance: great_circle_distance(&waypoint, &point),
        }
    }
}

fn planar_distance_sq(a: &Waypoint, b: &Waypoint) -> f64 {
    let d_lat = a.latitude - b.latitude;
    let d_lon = a.longitude - b.longitude;
    d_lat * d_lat + d_lon * d_lon
}

/// Haversine distance between two coordinates.
pub fn great_circle_distance(a: &Waypoint, b: &Waypoint) -> Length {
    let p1 = Point::new(a.longitude, a.latitude);
    let p2 = Point::new(b.longitude, b.latitude);
    Length::new::<meter>(Haversine::distance(p1, p2))
}
