// Library interface for peloton
// This allows integration tests and benches to access internal modules

pub mod config;
pub mod course;
pub mod errors;
pub mod feed;
pub mod report;
pub mod riders;
pub mod writer;

// Re-export commonly used types
pub use config::AppConfig;
pub use course::{PositionTracker, Projection, Provenance, Route};
pub use errors::PelotonError;
pub use feed::collector::{RaceState, StopReason};
pub use feed::{Snapshot, Waypoint};
pub use report::RaceReport;
pub use riders::{RaceContext, RiderTracker};
