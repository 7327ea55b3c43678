//! Circuit breaker guarding the billing provider.
//!
//! When the provider keeps failing, the breaker opens and billing calls fail
//! fast with [`CircuitBreakerError::Open`] instead of queueing behind the
//! throttle. The sweep treats that as a transient error and leaves every
//! user's roles untouched.
//!
//! # States
//!
//! ```text
//! Closed ──[failure_threshold consecutive failures]──> Open
//!   ▲                                                   │
//!   │                                                   │ [reset_timeout]
//!   │                                                   ▼
//!   └────────[success_threshold successes]────────── HalfOpen
//!                         [any failure] ──────────────> Open
//! ```
//!
//! Only outcomes the caller classifies as failures count. A 404 for an
//! unknown customer is an answer, not an outage.

use std::{
    sync::{
        Mutex,
        atomic::{AtomicU8, AtomicU32, Ordering},
    },
    time::Duration,
};

use thiserror::Error;
use tokio::time::Instant;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    /// Calls pass through.
    Closed = 0,
    /// Calls are rejected until the reset timeout elapses.
    Open = 1,
    /// Probe calls pass through; one failure reopens.
    HalfOpen = 2,
}

impl CircuitState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Open,
            2 => Self::HalfOpen,
            _ => Self::Closed,
        }
    }
}

/// Thresholds for [`CircuitBreaker`].
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
///
/// use membership_sync::reliability::CircuitBreakerConfig;
///
/// let config = CircuitBreakerConfig::default();
/// assert_eq!(config.failure_threshold, 5);
/// assert_eq!(config.reset_timeout, Duration::from_secs(60));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit. Default: 5
    pub failure_threshold: u32,
    /// Successful calls in `HalfOpen` that close the circuit. Default: 1
    pub success_threshold: u32,
    /// How long the circuit stays open before probing. Default: 60 seconds
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, success_threshold: 1, reset_timeout: Duration::from_secs(60) }
    }
}

/// Circuit breaker with lock-free state reads.
///
/// # Examples
///
/// ```rust
/// use membership_sync::reliability::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
///
/// # async fn example() {
/// let breaker = CircuitBreaker::new(CircuitBreakerConfig::default());
///
/// let result = breaker.call(|| async { Ok::<_, String>(42) }, |_| true).await;
///
/// assert_eq!(result.ok(), Some(42));
/// assert_eq!(breaker.state(), CircuitState::Closed);
/// # }
/// ```
#[derive(Debug)]
pub struct CircuitBreaker {
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    half_open_successes: AtomicU32,
    opened_at: Mutex<Option<Instant>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    /// Creates a closed circuit breaker.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            state: AtomicU8::new(CircuitState::Closed as u8),
            consecutive_failures: AtomicU32::new(0),
            half_open_successes: AtomicU32::new(0),
            opened_at: Mutex::new(None),
            config,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Runs `operation` unless the circuit is open.
    ///
    /// `is_failure` decides whether an error counts toward opening the circuit.
    ///
    /// # Errors
    ///
    /// Returns [`CircuitBreakerError::Open`] without running `operation` while
    /// the circuit is open, and [`CircuitBreakerError::Inner`] when `operation`
    /// fails.
    pub async fn call<F, Fut, T, E>(
        &self,
        operation: F,
        is_failure: impl Fn(&E) -> bool,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.admit() {
            return Err(CircuitBreakerError::Open);
        }

        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(error) => {
                if is_failure(&error) {
                    self.record_failure();
                } else {
                    self.record_success();
                }
                Err(CircuitBreakerError::Inner(error))
            }
        }
    }

    fn admit(&self) -> bool {
        if self.state() != CircuitState::Open {
            return true;
        }
        let opened_at = *self.opened_at.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match opened_at {
            Some(at) if at.elapsed() >= self.config.reset_timeout => {
                self.half_open_successes.store(0, Ordering::Release);
                self.state.store(CircuitState::HalfOpen as u8, Ordering::Release);
                tracing::info!("Billing circuit half-open, probing provider");
                true
            }
            _ => false,
        }
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
        if self.state() == CircuitState::HalfOpen {
            let successes = self.half_open_successes.fetch_add(1, Ordering::AcqRel) + 1;
            if successes >= self.config.success_threshold {
                self.state.store(CircuitState::Closed as u8, Ordering::Release);
                tracing::info!("Billing circuit closed, provider recovered");
            }
        }
    }

    fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        if self.state() == CircuitState::HalfOpen || failures >= self.config.failure_threshold {
            *self.opened_at.lock().unwrap_or_else(std::sync::PoisonError::into_inner) =
                Some(Instant::now());
            self.state.store(CircuitState::Open as u8, Ordering::Release);
            tracing::warn!(consecutive_failures = failures, "Billing circuit opened");
        }
    }
}

/// Error returned by [`CircuitBreaker::call`].
#[derive(Debug, Error)]
pub enum CircuitBreakerError<E> {
    /// The circuit is open; the operation was not attempted.
    #[error("Circuit breaker is open")]
    Open,

    /// The operation ran and failed.
    #[error(transparent)]
    Inner(E),
}

#[cfg(test)]
#[allow(clippy::let_underscore_must_use, reason = "tests discard expected failures")]
mod tests {
    use super::*;

    fn config(failure_threshold: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold,
            success_threshold: 1,
            reset_timeout: Duration::from_secs(60),
        }
    }

    async fn fail(breaker: &CircuitBreaker) {
        let _ = breaker.call(|| async { Err::<(), _>("outage") }, |_| true).await;
    }

    #[tokio::test]
    async fn test_opens_after_consecutive_failures() {
        let breaker = CircuitBreaker::new(config(3));

        for _ in 0..3 {
            fail(&breaker).await;
        }

        assert_eq!(breaker.state(), CircuitState::Open);
        let result = breaker.call(|| async { Ok::<_, &str>(()) }, |_| true).await;
        assert!(matches!(result, Err(CircuitBreakerError::Open)));
    }

    #[tokio::test]
    async fn test_success_resets_failure_streak() {
        let breaker = CircuitBreaker::new(config(3));

        fail(&breaker).await;
        fail(&breaker).await;
        let _ = breaker.call(|| async { Ok::<_, &str>(()) }, |_| true).await;
        fail(&breaker).await;
        fail(&breaker).await;

        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_unclassified_errors_do_not_trip() {
        let breaker = CircuitBreaker::new(config(1));

        let result = breaker.call(|| async { Err::<(), _>("not found") }, |_| false).await;

        assert!(matches!(result, Err(CircuitBreakerError::Inner("not found"))));
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_reset_timeout_closes_circuit() {
        let breaker = CircuitBreaker::new(config(1));
        fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(61)).await;
        let result = breaker.call(|| async { Ok::<_, &str>("back") }, |_| true).await;

        assert_eq!(result.ok(), Some("back"));
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_half_open_call_reopens() {
        let breaker = CircuitBreaker::new(config(1));
        fail(&breaker).await;

        tokio::time::advance(Duration::from_secs(61)).await;
        fail(&breaker).await;

        assert_eq!(breaker.state(), CircuitState::Open);
        let result = breaker.call(|| async { Ok::<_, &str>(()) }, |_| true).await;
        assert!(matches!(result, Err(CircuitBreakerError::Open)));
    }

    #[test]
    fn test_error_display() {
        let open: CircuitBreakerError<String> = CircuitBreakerError::Open;
        assert_eq!(open.to_string(), "Circuit breaker is open");
        let inner: CircuitBreakerError<String> = CircuitBreakerError::Inner("boom".to_owned());
        assert_eq!(inner.to_string(), "boom");
    }
}
