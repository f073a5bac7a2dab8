//! HTTP client for worker delivery and health probing.
//!
//! Wraps reqwest with the engine's timeout semantics: the per-delivery
//! timeout is applied per request, and a zero timeout means no timeout is
//! enforced at all. Network failures are categorized for the dispatcher.

use std::{collections::HashMap, time::Duration};

use bytes::Bytes;
use ferry_core::WorkerResponse;
use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{EngineError, Result};

/// Configuration for the worker HTTP client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// User agent string for all requests.
    pub user_agent: String,
    /// Per-delivery timeout. Zero disables the timeout entirely.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("ferry/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: Duration::from_millis(crate::DEFAULT_DELIVERY_TIMEOUT_MS),
        }
    }
}

/// A delivery request bound for the worker webhook.
#[derive(Debug, Clone)]
pub struct WorkerRequest {
    /// Engine-generated correlation id, also sent as `X-Request-Id`.
    pub request_id: Uuid,
    /// Destination webhook URL.
    pub url: String,
    /// Content type of the payload.
    pub content_type: String,
    /// Message metadata headers built by the dispatcher.
    pub headers: HashMap<String, String>,
    /// Raw message body.
    pub body: Bytes,
}

/// HTTP client for posting messages to the worker.
///
/// Connection pooling comes from the underlying reqwest client, so one
/// instance is shared by all concurrent dispatch tasks.
#[derive(Debug, Clone)]
pub struct WorkerClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl WorkerClient {
    /// Creates a new worker client.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Configuration` if the HTTP client cannot be
    /// built with the provided settings.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                EngineError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, config })
    }

    /// Posts a message to the worker and returns the response status.
    ///
    /// Any HTTP response, success or not, is an `Ok` result; the caller
    /// classifies the status. `Err` means the request never produced a
    /// response.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Timeout` when the per-delivery timeout elapses
    /// and `EngineError::Network` for connection-level failures.
    pub async fn deliver(&self, request: WorkerRequest) -> Result<WorkerResponse> {
        let span = info_span!(
            "worker_delivery",
            request_id = %request.request_id,
            url = %request.url,
        );

        async move {
            let mut http_request = self
                .client
                .post(&request.url)
                .header(CONTENT_TYPE, request.content_type.as_str())
                .body(request.body.clone());

            for (name, value) in &request.headers {
                let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) else {
                    warn!(header = %name, "invalid header name, skipping");
                    continue;
                };
                let Ok(header_value) = HeaderValue::from_str(value) else {
                    warn!(header = %name, "invalid header value, skipping");
                    continue;
                };
                http_request = http_request.header(header_name, header_value);
            }

            if !self.config.timeout.is_zero() {
                http_request = http_request.timeout(self.config.timeout);
            }

            let response = match http_request.send().await {
                Ok(response) => response,
                Err(e) => {
                    if e.is_timeout() {
                        return Err(EngineError::timeout(self.config.timeout));
                    }
                    if e.is_connect() {
                        return Err(EngineError::network(format!("connection failed: {e}")));
                    }
                    return Err(EngineError::network(e.to_string()));
                },
            };

            let status = response.status().as_u16();
            match status {
                200..=299 => debug!(status, "worker accepted message"),
                400..=499 => warn!(status, "worker returned client error"),
                500..=599 => warn!(status, "worker returned server error"),
                _ => warn!(status, "worker returned unexpected status"),
            }

            Ok(WorkerResponse::new(status))
        }
        .instrument(span)
        .await
    }

    /// Probes the worker health endpoint once.
    ///
    /// Any 2xx response counts as healthy; network failures and error
    /// statuses do not.
    pub async fn probe(&self, url: &str) -> bool {
        match self.client.get(url).send().await {
            Ok(response) => {
                let healthy = response.status().is_success();
                debug!(url, status = response.status().as_u16(), healthy, "health probe");
                healthy
            },
            Err(e) => {
                debug!(url, error = %e, "health probe failed");
                false
            },
        }
    }
}
