use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

/// Courtesy delay between outbound requests.
///
/// Clones share one clock, so the minimum interval holds across every worker
/// that issues requests through the same limiter.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    min_interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                min_interval,
                next_slot: Mutex::new(None),
            }),
        }
    }

    /// A limiter that never waits.
    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn min_interval(&self) -> Duration {
        self.inner.min_interval
    }

    /// Wait until this caller may start a request.
    pub async fn acquire(&self) {
        if self.inner.min_interval.is_zero() {
            return;
        }
        // Reserve a slot under the lock, sleep outside it.
        let start_at = {
            let mut next = self.inner.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next {
                Some(t) if t > now => t,
                _ => now,
            };
            *next = Some(slot + self.inner.min_interval);
            slot
        };
        let wait = start_at.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            trace!(wait_ms = wait.as_millis() as u64, "rate limiter sleeping");
            tokio::time::sleep_until(start_at).await;
        }
    }
}
