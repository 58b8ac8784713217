use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use crate::constants::{
    DEFAULT_BACKOFF_MS, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_SECS, MAX_RETRY_AFTER_SECS,
};
use crate::error::NetworkError;
use crate::infra::{HttpClientPort, HttpRequest, RateLimiter};
use crate::metrics::FetchMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: Duration::from_millis(DEFAULT_BACKOFF_MS),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the zero-based `attempt` failed.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// GETs pages with retry, exponential backoff and a shared courtesy delay.
#[derive(Clone)]
pub struct Fetcher {
    http: Arc<dyn HttpClientPort>,
    limiter: RateLimiter,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(http: Arc<dyn HttpClientPort>, limiter: RateLimiter, policy: RetryPolicy) -> Self {
        Self {
            http,
            limiter,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn fetch(&self, url: &str) -> Result<String, NetworkError> {
        self.fetch_with(url, &self.policy).await
    }

    /// Fetch `url`, retrying timeouts, transport errors, 5xx and 429.
    ///
    /// Other 4xx statuses fail on the first attempt. A numeric `Retry-After`
    /// on a 429 replaces the computed backoff, capped at five minutes.
    #[instrument(skip(self, policy), fields(max_retries = policy.max_retries))]
    pub async fn fetch_with(&self, url: &str, policy: &RetryPolicy) -> Result<String, NetworkError> {
        let attempts = policy.max_retries.max(1);
        let mut attempt = 0;
        loop {
            self.limiter.acquire().await;
            FetchMetrics::record_attempt();
            let started = Instant::now();
            let outcome = self
                .http
                .execute(HttpRequest::get(url).with_timeout(policy.timeout))
                .await;
            FetchMetrics::record_duration(started.elapsed().as_secs_f64());

            let (err, retry_after) = match outcome {
                Ok(resp) if resp.is_success() => {
                    debug!(attempt = attempt + 1, bytes = resp.body.len(), "fetched");
                    return Ok(resp.body);
                }
                Ok(resp) => (
                    NetworkError::Status {
                        url: url.to_string(),
                        status: resp.status,
                    },
                    resp.retry_after,
                ),
                Err(e) => (e, None),
            };

            if !err.is_retryable() {
                FetchMetrics::record_failure();
                return Err(err);
            }
            attempt += 1;
            if attempt >= attempts {
                FetchMetrics::record_failure();
                warn!(attempts, error = %err, "retries exhausted");
                return Err(NetworkError::RetriesExhausted {
                    url: url.to_string(),
                    attempts,
                    last: Box::new(err),
                });
            }

            FetchMetrics::record_retry(retry_reason(&err));
            let delay = retry_delay(policy, &err, retry_after, attempt - 1);
            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "request failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Wait before the next attempt once the zero-based `attempt` failed.
///
/// A 429 carrying a numeric `Retry-After` waits that long, capped at five
/// minutes. Anything else backs off exponentially.
pub fn retry_delay(
    policy: &RetryPolicy,
    err: &NetworkError,
    retry_after: Option<u64>,
    attempt: u32,
) -> Duration {
    match (err, retry_after) {
        (NetworkError::Status { status: 429, .. }, Some(secs)) => {
            Duration::from_secs(secs.min(MAX_RETRY_AFTER_SECS))
        }
        _ => policy.backoff(attempt),
    }
}

fn retry_reason(err: &NetworkError) -> &'static str {
    match err {
        NetworkError::Timeout { .. } => "timeout",
        NetworkError::Status { status: 429, .. } => "rate_limited",
        NetworkError::Status { .. } => "server_error",
        _ => "transport",
    }
}
