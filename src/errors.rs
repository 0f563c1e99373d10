// Error types for peloton

use crate::report::RaceReport;
use snafu::Snafu;
use std::{io, path::PathBuf, sync::mpsc::SendError};

#[derive(Debug, Snafu)]
pub enum PelotonError {
    // Errors while talking to the live feed
    #[snafu(display("Could not build the feed HTTP client"))]
    FeedClientError { source: reqwest::Error },
    #[snafu(display("Request to {url} failed"))]
    FeedRequestError { url: String, source: reqwest::Error },
    #[snafu(display("Could not decode response from {url}"))]
    FeedDecodeError { url: String, source: reqwest::Error },
    #[snafu(display("Feed source has no more snapshots"))]
    FeedExhausted,

    // Snapshot ingestion errors
    #[snafu(display("Could not parse snapshot {origin}"))]
    SnapshotParseError {
        origin: String,
        source: serde_json::Error,
    },
    #[snafu(display("Invalid snapshot at {timestamp}: {reason}"))]
    InvalidSnapshot { timestamp: i64, reason: String },

    // Course and roster loading errors
    #[snafu(display("Invalid route: {reason}"))]
    InvalidRoute { reason: String },
    #[snafu(display("Could not read {path:?}"))]
    FileReadError { path: PathBuf, source: io::Error },
    #[snafu(display("Could not parse {path:?}"))]
    FileParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    // Errors for the snapshot writer
    #[snafu(display("Error writing snapshot file"))]
    WriterError { source: io::Error },
    #[snafu(display("Error serializing snapshot"))]
    WriterSerializeError { source: serde_json::Error },

    // Errors while broadcasting race reports
    #[snafu(display("Error broadcasting race report"))]
    ReportBroadcastError { source: Box<SendError<RaceReport>> },

    // Config management errors
    #[snafu(display("Could not find application data directory to save config file"))]
    NoConfigDir,
    #[snafu(display("Error reading or writing config file"))]
    ConfigIOError { source: io::Error },
    #[snafu(display("Error serializing config file"))]
    ConfigSerializeError { source: serde_json::Error },
}

impl From<SendError<RaceReport>> for PelotonError {
    fn from(value: SendError<RaceReport>) -> Self {
        PelotonError::ReportBroadcastError {
            source: Box::new(value),
        }
    }
}

impl PelotonError {
    /// Whether the polling loop may skip this error and try again on the next poll.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PelotonError::FeedRequestError { .. }
                | PelotonError::FeedDecodeError { .. }
                | PelotonError::SnapshotParseError { .. }
                | PelotonError::InvalidSnapshot { .. }
        )
    }
}
