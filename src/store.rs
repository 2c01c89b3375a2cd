use std::time::Duration;

use reqwest::{StatusCode, Url};
use serde::Deserialize;

use crate::{assignment::StoredAssignment, error::StoreError, Error, Result};

/// Read access to the authoritative assignment data.
///
/// Implementations only return assignments of flags that are not archived.
pub trait AssignmentStore {
    fn fetch_assignment(
        &self,
        flag_key: &str,
        env_key: &str,
    ) -> std::result::Result<Option<StoredAssignment>, StoreError>;
}

impl<T> AssignmentStore for T
where
    T: Fn(&str, &str) -> std::result::Result<Option<StoredAssignment>, StoreError>,
{
    fn fetch_assignment(
        &self,
        flag_key: &str,
        env_key: &str,
    ) -> std::result::Result<Option<StoredAssignment>, StoreError> {
        self(flag_key, env_key)
    }
}

const FLAGS_ENDPOINT: &str = "/api/flags/";
const API_KEY_HEADER: &str = "X-API-Key";

/// Flag as returned by `GET /api/flags/{key}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlagResponse {
    #[serde(default)]
    is_archived: bool,
    #[serde(default)]
    assignments: Vec<AssignmentResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignmentResponse {
    env_key: String,
    is_enabled: bool,
    #[serde(default, alias = "percentage")]
    percentage_rollout: Option<i64>,
    #[serde(default)]
    rules_json: Option<String>,
}

/// [`AssignmentStore`] reading from the flag management API over HTTP.
pub struct HttpAssignmentStore {
    client: reqwest::blocking::Client,
    base_url: Url,
    api_key: String,
}

impl HttpAssignmentStore {
    /// Default request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, api_key, Self::DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(Error::InvalidBaseUrl)?;
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(HttpAssignmentStore {
            client,
            base_url,
            api_key: api_key.into(),
        })
    }

    fn flag_url(&self, flag_key: &str) -> std::result::Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| StoreError::Unavailable("base_url cannot be a base".to_owned()))?
            .pop_if_empty()
            .extend(FLAGS_ENDPOINT.split('/').filter(|s| !s.is_empty()))
            .push(flag_key);
        Ok(url)
    }
}

impl AssignmentStore for HttpAssignmentStore {
    fn fetch_assignment(
        &self,
        flag_key: &str,
        env_key: &str,
    ) -> std::result::Result<Option<StoredAssignment>, StoreError> {
        let url = self.flag_url(flag_key)?;

        log::debug!(target: "toggled", flag_key, env_key; "fetching assignment");
        let response = self
            .client
            .get(url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Ok(None),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                log::warn!(target: "toggled", "assignment store rejected the api key");
                return Err(StoreError::Unauthorized);
            }
            code => return Err(StoreError::UnexpectedStatus(code.as_u16())),
        }

        let body = response.bytes()?;
        let flag: FlagResponse = serde_json::from_slice(&body)
            .map_err(|err| StoreError::InvalidResponse(std::sync::Arc::new(err)))?;

        Ok(select_assignment(flag, env_key))
    }
}

fn select_assignment(flag: FlagResponse, env_key: &str) -> Option<StoredAssignment> {
    if flag.is_archived {
        return None;
    }
    flag.assignments
        .into_iter()
        .find(|assignment| assignment.env_key == env_key)
        .map(|assignment| StoredAssignment {
            is_enabled: assignment.is_enabled,
            percentage: assignment.percentage_rollout,
            rules_json: assignment.rules_json,
        })
}
