//! Sauce Labs REST adapter.
//!
//! Two calls only: `GET` and `PUT` on `/rest/v1/{username}/jobs/{id}`,
//! authenticated with HTTP basic auth.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::{StatusCode, Url};
use sauce_reconcile_core::error::GatewayError;
use sauce_reconcile_core::gateway::{RemoteJob, RemoteJobGateway};
use sauce_reconcile_core::job_record::Changeset;
use tracing::debug;

const USER_AGENT: &str = concat!("sauce-reconcile/", env!("CARGO_PKG_VERSION"));

/// Blocking client for the Sauce Labs jobs API.
pub struct SauceRestGateway {
    base_url: Url,
    username: String,
    access_key: String,
    http_client: Client,
}

impl SauceRestGateway {
    /// Build a client for `endpoint` (e.g. `https://saucelabs.com/`). Only
    /// the scheme and authority of `endpoint` are used.
    pub fn new(
        endpoint: &str,
        username: impl Into<String>,
        access_key: impl Into<String>,
    ) -> Result<Self, GatewayError> {
        let http_client = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(60))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|error| GatewayError::Transport(error.to_string()))?;
        let base_url = Url::parse(endpoint).map_err(|error| {
            GatewayError::Transport(format!("invalid endpoint {endpoint}: {error}"))
        })?;

        Ok(Self {
            base_url,
            username: username.into(),
            access_key: access_key.into(),
            http_client,
        })
    }

    fn job_url(&self, job_id: &str) -> Result<Url, GatewayError> {
        job_url(&self.base_url, &self.username, job_id)
    }
}

/// Absolute `/rest/v1/...` path on the endpoint's host; any path in the
/// endpoint itself is replaced.
fn job_url(base_url: &Url, username: &str, job_id: &str) -> Result<Url, GatewayError> {
    base_url
        .join(&format!("/rest/v1/{username}/jobs/{job_id}"))
        .map_err(|error| GatewayError::Transport(format!("invalid job URL: {error}")))
}

/// Map a non-success response onto a gateway error.
fn check_status(response: Response, job_id: &str) -> Result<Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            GatewayError::Unauthorized(status.as_u16())
        }
        StatusCode::NOT_FOUND => GatewayError::NotFound(job_id.to_string()),
        _ => {
            let body = response
                .text()
                .unwrap_or_else(|_| "unable to read response body".to_string());
            GatewayError::Transport(format!("HTTP {}: {body}", status.as_u16()))
        }
    })
}

impl RemoteJobGateway for SauceRestGateway {
    fn job_details(&self, job_id: &str) -> Result<RemoteJob, GatewayError> {
        let url = self.job_url(job_id)?;
        debug!(job_id, %url, "Fetching job details");

        let response = self
            .http_client
            .get(url)
            .basic_auth(&self.username, Some(&self.access_key))
            .send()
            .map_err(|error| GatewayError::Transport(error.to_string()))?;

        check_status(response, job_id)?
            .json::<RemoteJob>()
            .map_err(|error| GatewayError::Decode(error.to_string()))
    }

    fn update_job(&self, job_id: &str, changes: &Changeset) -> Result<(), GatewayError> {
        let url = self.job_url(job_id)?;
        debug!(job_id, fields = ?changes.field_names(), "Updating job");

        let response = self
            .http_client
            .put(url)
            .basic_auth(&self.username, Some(&self.access_key))
            .json(changes)
            .send()
            .map_err(|error| GatewayError::Transport(error.to_string()))?;

        check_status(response, job_id).map(|_| ())
    }
}
