use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::PelotonError;
use crate::feed::{PollSettings, RiderId, client::DEFAULT_BASE_URL};

const CONFIG_DIR_NAME: &str = "peloton";
const CONFIG_FILE_NAME: &str = "config.json";

pub const POLL_INTERVAL_MS: u64 = 5_000;
pub const STALE_AFTER_S: u64 = 180;
/// Keep polling through feed outages, the staleness check ends a finished stage.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 0;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Root of the live tracking API
    pub base_url: String,
    pub poll_interval_ms: u64,
    /// Stop when the feed timestamp lags wall-clock time by more than this
    pub stale_after_s: u64,
    /// Stop after this many failed polls in a row, 0 for never
    pub max_consecutive_failures: u32,
    /// Cached roster, fetched from the API when unset
    pub roster_file: Option<PathBuf>,
    /// Follow every non-withdrawn rider of this nationality
    pub tracked_nationality: Option<String>,
    /// Riders followed regardless of nationality
    pub extra_rider_ids: Vec<RiderId>,
    /// Where raw snapshots are saved, nothing is saved when unset
    pub snapshot_dir: Option<PathBuf>,
    pub clear_screen: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval_ms: POLL_INTERVAL_MS,
            stale_after_s: STALE_AFTER_S,
            max_consecutive_failures: MAX_CONSECUTIVE_FAILURES,
            roster_file: None,
            tracked_nationality: None,
            extra_rider_ids: Vec::new(),
            snapshot_dir: None,
            clear_screen: false,
        }
    }
}

impl AppConfig {
    pub fn default_path() -> Result<PathBuf, PelotonError> {
        Ok(dirs::config_dir()
            .ok_or(PelotonError::NoConfigDir)?
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME))
    }

    /// Read the config saved in the user's config directory, if there is one.
    pub fn from_local_file() -> Result<Option<Self>, PelotonError> {
        Self::from_file(&Self::default_path()?)
    }

    pub fn from_file(path: &Path) -> Result<Option<Self>, PelotonError> {
        if !path.exists() {
            debug!("No config file at {:?}", path);
            return Ok(None);
        }
        let file = fs::File::open(path).map_err(|e| PelotonError::ConfigIOError { source: e })?;
        serde_json::from_reader(file)
            .map(Some)
            .map_err(|e| PelotonError::ConfigSerializeError { source: e })
    }

    pub fn save(&self) -> Result<(), PelotonError> {
        self.save_to(&Self::default_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), PelotonError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| PelotonError::ConfigIOError { source: e })?;
        }
        let file = fs::File::create(path).map_err(|e| PelotonError::ConfigIOError { source: e })?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| PelotonError::ConfigSerializeError { source: e })
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(self.poll_interval_ms),
            stale_after: Duration::from_secs(self.stale_after_s),
            max_consecutive_failures: self.max_consecutive_failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(
            AppConfig::from_file(&dir.path().join("config.json"))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("peloton").join("config.json");
        let config = AppConfig {
            tracked_nationality: Some("Netherlands".to_string()),
            extra_rider_ids: vec![31],
            poll_interval_ms: 1_000,
            ..AppConfig::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(AppConfig::from_file(&path).unwrap(), Some(config));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"stale_after_s": 60}"#).unwrap();
        let config = AppConfig::from_file(&path).unwrap().unwrap();
        assert_eq!(config.stale_after_s, 60);
        assert_eq!(config.poll_interval_ms, POLL_INTERVAL_MS);
        assert_eq!(config.poll_settings().stale_after, Duration::from_secs(60));
        assert_eq!(config.poll_settings().max_consecutive_failures, 0);
    }

    #[test]
    fn test_invalid_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{").unwrap();
        assert!(matches!(
            AppConfig::from_file(&path),
            Err(PelotonError::ConfigSerializeError { .. })
        ));
    }
}
