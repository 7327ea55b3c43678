//! Single-flight request throttle for the billing provider.
//!
//! Every billing call goes through one [`RequestThrottle`]: at most one request
//! is in flight at a time and consecutive request starts are spaced at least
//! [`ThrottleConfig::min_interval`] apart. This keeps a full sweep under the
//! provider's rate limit regardless of how many users are processed.
//!
//! # Examples
//!
//! ```rust
//! use std::time::Duration;
//!
//! use membership_sync::reliability::{RequestThrottle, ThrottleConfig};
//!
//! # async fn example() {
//! let throttle = RequestThrottle::new(ThrottleConfig { min_interval: Duration::from_millis(5) });
//!
//! let first = throttle.run(async { 1 }).await;
//! let second = throttle.run(async { 2 }).await;
//! assert_eq!(first + second, 3);
//! # }
//! ```

use std::time::Duration;

use tokio::{
    sync::Mutex,
    time::{Instant, sleep_until},
};
use tracing::{debug, instrument};

/// Configuration for [`RequestThrottle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleConfig {
    /// Minimum spacing between the starts of two consecutive requests.
    ///
    /// Default: 1 second
    pub min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self { min_interval: Duration::from_secs(1) }
    }
}

/// Serializes requests and spaces their start times.
///
/// The lock is held for the whole request, so requests run one at a time in
/// the order they reached the lock. A request that waited for the lock still
/// honors the interval measured from the previous request's start.
///
/// # Thread Safety
///
/// Safe to share across tasks. Waiting is asynchronous and cancellation-safe:
/// dropping a waiting future leaves the throttle unchanged.
#[derive(Debug)]
pub struct RequestThrottle {
    config: ThrottleConfig,
    /// Start time of the most recent request, `None` before the first one.
    last_start: Mutex<Option<Instant>>,
}

impl RequestThrottle {
    /// Creates a throttle that has not yet issued any request.
    #[must_use]
    pub fn new(config: ThrottleConfig) -> Self {
        Self { config, last_start: Mutex::new(None) }
    }

    /// Returns the configured minimum interval.
    #[must_use]
    pub fn min_interval(&self) -> Duration {
        self.config.min_interval
    }

    /// Runs `request` once the previous request finished and the interval since
    /// its start elapsed.
    #[instrument(skip_all, level = "debug")]
    pub async fn run<Fut, T>(&self, request: Fut) -> T
    where
        Fut: Future<Output = T>,
    {
        let mut last_start = self.last_start.lock().await;

        if let Some(previous) = *last_start {
            let ready_at = previous + self.config.min_interval;
            if ready_at > Instant::now() {
                debug!(wait = ?ready_at.saturating_duration_since(Instant::now()), "Throttling billing request");
                sleep_until(ready_at).await;
            }
        }

        *last_start = Some(Instant::now());
        request.await
    }
}
