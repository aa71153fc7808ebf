//! HTTP client for the broker surface, used by the capture submitter
//! and the importer poller. Both sides take their endpoint from the
//! same `BrokerConfig`.

use crate::config::BrokerConfig;
use scene::{Error, Result};
use serde::Deserialize;
use serde_json::value::RawValue;
use std::time::Duration;

/// One delivered job as the poller sees it.
#[derive(Debug)]
pub struct DeliveredJob {
    pub id: String,
    /// Verbatim payload JSON.
    pub payload: String,
}

#[derive(Deserialize)]
struct PollResponse {
    job: Option<JobEnvelope>,
}

#[derive(Deserialize)]
struct JobEnvelope {
    id: String,
    payload: Box<RawValue>,
}

#[derive(Deserialize)]
struct SubmitResponse {
    ok: bool,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

pub struct BrokerClient {
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
    long_poll: Duration,
}

impl BrokerClient {
    /// Build a client against the configured broker endpoint.
    ///
    /// # Errors
    /// Fails when the underlying HTTP client cannot initialize.
    pub fn new(config: &BrokerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            // Long-polls block up to the window; leave headroom.
            .timeout(config.long_poll() + Duration::from_secs(10))
            .build()
            .map_err(|err| Error::IncompleteTransfer(format!("client init failed: {err}")))?;
        Ok(Self {
            base_url: config.base_url(),
            api_key: config.api_key.clone(),
            http,
            long_poll: config.long_poll(),
        })
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("x-api-key", key),
            None => builder,
        }
    }

    /// Liveness ping; also refreshes this peer's telemetry slot.
    ///
    /// # Errors
    /// `IncompleteTransfer` when the broker is unreachable.
    pub async fn health(&self, source: &str) -> Result<serde_json::Value> {
        let response = self
            .request(
                self.http
                    .get(format!("{}/health?source={source}", self.base_url)),
            )
            .send()
            .await
            .map_err(connection_error)?;
        response.json().await.map_err(connection_error)
    }

    /// Submit one payload body (full schema, chunk, or compressed
    /// wrapper).
    ///
    /// # Errors
    /// `PayloadTooLarge` and `IncompleteTransfer` mirror the broker's
    /// responses.
    pub async fn submit(&self, body: String) -> Result<Option<String>> {
        let size = body.len();
        let response = self
            .request(self.http.post(format!("{}/jobs", self.base_url)))
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(connection_error)?;
        let status = response.status();
        let parsed: SubmitResponse = response.json().await.map_err(connection_error)?;
        if status == reqwest::StatusCode::PAYLOAD_TOO_LARGE {
            return Err(Error::PayloadTooLarge { size, limit: 0 });
        }
        if !parsed.ok {
            return Err(Error::IncompleteTransfer(
                parsed.error.unwrap_or_else(|| status.to_string()),
            ));
        }
        Ok(parsed.id)
    }

    /// One long-poll cycle. `None` when the window expired empty.
    ///
    /// # Errors
    /// `IncompleteTransfer` when the broker is unreachable or the
    /// response is malformed.
    pub async fn poll_next(&self) -> Result<Option<DeliveredJob>> {
        let response = self
            .request(self.http.get(format!("{}/jobs/next", self.base_url)))
            .send()
            .await
            .map_err(connection_error)?;
        let text = response.text().await.map_err(connection_error)?;
        let parsed: PollResponse = serde_json::from_str(&text)
            .map_err(|err| Error::IncompleteTransfer(format!("malformed poll response: {err}")))?;
        Ok(parsed.job.map(|job| DeliveredJob {
            id: job.id,
            payload: job.payload.get().to_owned(),
        }))
    }

    /// Poll until a job arrives, cycling long-poll windows.
    ///
    /// # Errors
    /// Propagates the first transport error.
    pub async fn wait_for_job(&self) -> Result<DeliveredJob> {
        loop {
            if let Some(job) = self.poll_next().await? {
                return Ok(job);
            }
            log::debug!(
                "long-poll window of {} ms expired empty; re-polling",
                self.long_poll.as_millis()
            );
        }
    }
}

fn connection_error(err: reqwest::Error) -> Error {
    Error::IncompleteTransfer(format!("broker request failed: {err}"))
}
