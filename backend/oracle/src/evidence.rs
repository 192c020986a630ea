//! External evidence providers.
//!
//! Strategies never talk HTTP themselves; they ask an [`EvidenceSource`] for a
//! single measurement of a subject and compare it against the milestone's
//! threshold.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::debug;

use crate::errors::{OracleError, Result};

/// Which provider feed a metric comes from.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Feed {
    Imagery,
    Telemetry,
}

impl Feed {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feed::Imagery => "imagery",
            Feed::Telemetry => "telemetry",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Measurement {
    pub value: u64,
    /// Provider-side identifier of the observation, kept for the audit log.
    pub reference: String,
}

#[async_trait]
pub trait EvidenceSource: Send + Sync {
    async fn measure(&self, feed: Feed, subject: &str, metric: &str) -> Result<Measurement>;
}

/// Evidence provider reached over HTTPS with a bearer credential.
pub struct HttpEvidenceSource {
    client: Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
}

impl HttpEvidenceSource {
    pub fn new(
        client: Client,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout,
        }
    }
}

impl HttpEvidenceSource {
    /// `{endpoint}/{feed}/{subject}` with the subject as one escaped path
    /// segment, whatever characters it holds.
    fn measurement_url(&self, feed: Feed, subject: &str) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| OracleError::ExternalFetch(format!("{}: {e}", self.endpoint)))?;
        url.path_segments_mut()
            .map_err(|_| {
                OracleError::ExternalFetch(format!("{} cannot carry a path", self.endpoint))
            })?
            .pop_if_empty()
            .push(feed.as_str())
            .push(subject);
        Ok(url)
    }
}

#[async_trait]
impl EvidenceSource for HttpEvidenceSource {
    async fn measure(&self, feed: Feed, subject: &str, metric: &str) -> Result<Measurement> {
        let url = self.measurement_url(feed, subject)?;
        let url = url.as_str();
        let response = self
            .client
            .get(url)
            .query(&[("metric", metric)])
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| fetch_error(url, e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OracleError::ExternalFetch(format!(
                "{url} answered {status}"
            )));
        }

        let measurement: Measurement = response
            .json()
            .await
            .map_err(|e| fetch_error(url, e, self.timeout))?;
        debug!(
            "Measured {metric}={} for {subject} ({})",
            measurement.value, measurement.reference
        );
        Ok(measurement)
    }
}

fn fetch_error(url: &str, e: reqwest::Error, timeout: Duration) -> OracleError {
    if e.is_timeout() {
        OracleError::ExternalFetch(format!("{url} timed out after {timeout:?}"))
    } else {
        OracleError::ExternalFetch(format!("{url}: {e}"))
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
