// Route-relative progress tracking
// Projects positions onto the stage route and records when the head of the race passed
// each waypoint

pub mod route;
pub mod tracker;

// Re-export commonly used types
pub use route::{Projection, Route, great_circle_distance};
pub use tracker::{Crossing, CrossingTable, HeadGap, PositionTracker, Provenance};
