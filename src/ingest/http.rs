// src/ingest/http.rs
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::error::TransportError;
use crate::ingest::limit_chars;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const LIVENESS_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_ATTEMPTS: u8 = 3;
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(100);
const MIN_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(10);

const LOGGED_BODY_CHARS: usize = 500;

/// Shared GET/HEAD client for provider adapters: bounded timeout, fixed number of
/// attempts, fixed pause between them.
#[derive(Clone, Debug)]
pub struct RequestExecutor {
    client: Client,
    timeout: Duration,
    max_attempts: u8,
    backoff: Duration,
}

impl Default for RequestExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestExecutor {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            timeout: DEFAULT_TIMEOUT,
            max_attempts: DEFAULT_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Total attempts, first one included. Zero is treated as one.
    pub fn with_retries(mut self, attempts: u8) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Shrink the per-attempt timeout so every attempt and the pauses between them end
    /// inside `budget`, with a tenth of it kept back for decoding. Never raises it.
    pub fn fit_within(mut self, budget: Duration) -> Self {
        let attempts = u32::from(self.max_attempts);
        let pauses = self.backoff * (attempts - 1);
        let usable = (budget - budget / 10).saturating_sub(pauses);
        let share = (usable / attempts).max(MIN_ATTEMPT_TIMEOUT);
        self.timeout = self.timeout.min(share);
        self
    }

    /// Longest `get_json` can keep retrying before it gives up.
    pub fn worst_case(&self) -> Duration {
        let attempts = u32::from(self.max_attempts);
        self.timeout * attempts + self.backoff * (attempts - 1)
    }

    /// GET `url` with `query` and decode the body as JSON.
    ///
    /// Connect/timeout errors, 5xx and 429 are retried. Any other non-2xx fails at once.
    pub async fn get_json(
        &self,
        url: &str,
        query: &[(String, String)],
    ) -> Result<Value, TransportError> {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .get(url)
                .query(query)
                .timeout(self.timeout)
                .send()
                .await;

            match res {
                Ok(rsp) => {
                    let status = rsp.status();
                    if status.is_success() {
                        let body = rsp.text().await.map_err(|e| TransportError::Malformed {
                            url: url.to_string(),
                            reason: e.to_string(),
                        })?;
                        return serde_json::from_str(&body).map_err(|e| {
                            TransportError::Malformed {
                                url: url.to_string(),
                                reason: e.to_string(),
                            }
                        });
                    }
                    if is_transient_status(status) && attempt < self.max_attempts {
                        tracing::debug!(target: "ingest", %url, status = status.as_u16(), attempt, "retrying");
                        tokio::time::sleep(self.backoff).await;
                        continue;
                    }
                    let body = rsp.text().await.unwrap_or_default();
                    let body = limit_chars(&body, LOGGED_BODY_CHARS);
                    tracing::warn!(
                        target: "ingest",
                        %url,
                        status = status.as_u16(),
                        body = %body,
                        "provider responded with non-success status"
                    );
                    return Err(TransportError::Status {
                        url: url.to_string(),
                        status: status.as_u16(),
                        body,
                    });
                }
                Err(e) => {
                    let transient = e.is_connect() || e.is_timeout() || e.is_request();
                    if transient && attempt < self.max_attempts {
                        tracing::debug!(target: "ingest", %url, error = %e, attempt, "retrying");
                        tokio::time::sleep(self.backoff).await;
                        continue;
                    }
                    return Err(TransportError::Request {
                        url: url.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    /// HEAD liveness check with a short timeout. Never fails; any error is `false`.
    pub async fn is_reachable(&self, url: &str) -> bool {
        match self
            .client
            .head(url)
            .timeout(LIVENESS_TIMEOUT.min(self.timeout))
            .send()
            .await
        {
            Ok(rsp) => rsp.status().is_success(),
            Err(e) => {
                tracing::debug!(target: "ingest", %url, error = %e, "availability check failed");
                false
            }
        }
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}
