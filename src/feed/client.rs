//! Blocking HTTP client for the live tracking API

use std::time::Duration;

use log::{debug, info};
use reqwest::{
    blocking::Client,
    header::{ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, HeaderMap, HeaderValue, REFERER},
};
use serde::de::DeserializeOwned;

use crate::course::Route;
use crate::errors::PelotonError;
use crate::feed::{RosterEntry, Snapshot, StageInfo, Waypoint};

pub const DEFAULT_BASE_URL: &str = "http://letour-livetracking-api.dimensiondata.com/";
const REQUEST_TIMEOUT_S: u64 = 30;
const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Fedora; Linux x86_64; rv:39.0) Gecko/20100101 Firefox/39.0";
const REFERER_URL: &str = "http://letour-livetracking.dimensiondata.com/";

/// Client for the race, stage and rider endpoints of the live tracking API.
///
/// The session keeps connections alive between polls and sends the same headers a
/// browser on the public tracking page would.
pub struct FeedClient {
    client: Client,
    base_url: String,
}

impl FeedClient {
    pub fn new(base_url: &str) -> Result<Self, PelotonError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/javascript, */*; q=0.01"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        headers.insert(REFERER, HeaderValue::from_static(REFERER_URL));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_S))
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| PelotonError::FeedClientError { source: e })?;

        let base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn race_url(&self) -> String {
        format!("{}race/", self.base_url)
    }

    fn stages_url(&self) -> String {
        format!("{}race/stages", self.base_url)
    }

    fn get_text(&self, url: &str) -> Result<String, PelotonError> {
        debug!("GET {}", url);
        self.client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| PelotonError::FeedRequestError {
                url: url.to_string(),
                source: e,
            })?
            .text()
            .map_err(|e| PelotonError::FeedDecodeError {
                url: url.to_string(),
                source: e,
            })
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, PelotonError> {
        debug!("GET {}", url);
        self.client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| PelotonError::FeedRequestError {
                url: url.to_string(),
                source: e,
            })?
            .json()
            .map_err(|e| PelotonError::FeedDecodeError {
                url: url.to_string(),
                source: e,
            })
    }

    /// Fetch the current race snapshot. `Ok(None)` when the feed has no content.
    pub fn snapshot(&self) -> Result<Option<Snapshot>, PelotonError> {
        let url = self.race_url();
        let body = self.get_text(&url)?;
        Snapshot::parse(&body, &url)
    }

    pub fn current_stage(&self) -> Result<u32, PelotonError> {
        let stage: StageInfo = self.get_json(&format!("{}/current", self.stages_url()))?;
        info!("Current stage is {}", stage.stage_id);
        Ok(stage.stage_id)
    }

    /// Fetch the route of `stage_id`, or of the current stage when `None`.
    pub fn route(&self, stage_id: Option<u32>) -> Result<Route, PelotonError> {
        let stage_id = match stage_id {
            Some(id) => id,
            None => self.current_stage()?,
        };
        let points: Vec<Waypoint> =
            self.get_json(&format!("{}/{}/route", self.stages_url(), stage_id))?;
        info!("Stage {} route has {} points", stage_id, points.len());
        Route::load(points)
    }

    pub fn roster(&self) -> Result<Vec<RosterEntry>, PelotonError> {
        self.get_json(&format!("{}rider", self.base_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let client = FeedClient::new("http://localhost:8080").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080/");
        assert_eq!(client.race_url(), "http://localhost:8080/race/");
        assert_eq!(client.stages_url(), "http://localhost:8080/race/stages");
    }

    #[test]
    fn test_unreachable_feed_is_transient() {
        // nothing listens on port 9 of localhost
        let client = FeedClient::new("http://127.0.0.1:9/").unwrap();
        let err = client.snapshot().unwrap_err();
        assert!(err.is_transient());
    }
}
