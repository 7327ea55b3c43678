//! Reliability patterns for billing calls.
//!
//! The billing client wraps every request in a [`CircuitBreaker`] around a
//! [`RequestThrottle`]. Failed calls are never retried in-line; the next sweep
//! is the retry.

mod circuit_breaker;
mod throttle;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState,
};
pub use throttle::{RequestThrottle, ThrottleConfig};
