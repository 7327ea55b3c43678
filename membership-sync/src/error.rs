//! Error types for membership reconciliation.
//!
//! All fallible operations in this crate return [`Result<T>`], which uses
//! [`SyncError`] as its error type. Errors derive [`std::error::Error`] via
//! [`thiserror::Error`].
//!
//! # Error Categories
//!
//! - **Transient** ([`SyncError::Http`], [`SyncError::BillingResponse`],
//!   [`SyncError::CircuitOpen`]): the billing or platform API could not be
//!   reached. The sweep skips the user and tries again next cycle. A transient
//!   failure is never read as "inactive".
//! - **Mutation** ([`SyncError::RoleMutation`]): the platform refused a role
//!   change (missing permission, role hierarchy). Hard failure for the
//!   immediate-apply caller, caught per user by the sweep.
//! - **Configuration** ([`SyncError::Config`]): fatal at startup.
//! - **Command outcomes** ([`SyncError::IdentityNotFound`],
//!   [`SyncError::NoActiveSubscription`], [`SyncError::EmailInUse`], ...):
//!   user-facing results of command operations.
//!
//! # Examples
//!
//! ```
//! use membership_sync::error::{Result, SyncError};
//!
//! fn require_email(email: Option<&str>) -> Result<&str> {
//!     email.ok_or_else(|| SyncError::InvalidEmail("email is required".to_owned()))
//! }
//!
//! assert!(require_email(None).is_err());
//! ```

use thiserror::Error;

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur while reconciling memberships.
///
/// # Error Recovery
///
/// - **Transient errors** ([`is_transient`](Self::is_transient) returns `true`):
///   leave state untouched and retry on the next sweep
/// - **Role mutation errors**: fix the bot's permissions or role position; the
///   next apply recomputes the diff and converges
/// - **Configuration errors**: fix configuration and restart
#[must_use = "errors should be handled, propagated, or explicitly panicked"]
#[derive(Debug, Error)]
pub enum SyncError {
    /// HTTP request to a collaborator failed (connect, timeout, TLS, decode).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The billing provider answered with an error or an unexpected body.
    #[error("Billing provider error: {0}")]
    BillingResponse(String),

    /// Billing calls are suspended after repeated failures.
    #[error("Billing circuit breaker is open")]
    CircuitOpen,

    /// The group platform refused to add or remove a role.
    ///
    /// Usually a permission or role-hierarchy problem: the bot's highest role
    /// must sit above every managed role.
    #[error("Role mutation failed for user {user_id} (role {role_id}): {message}")]
    RoleMutation {
        /// Platform user whose roles were being changed.
        user_id: String,
        /// Role that could not be added or removed.
        role_id: String,
        /// Message reported by the platform.
        message: String,
    },

    /// A non-mutation platform call failed (role listing, member lookup).
    #[error("Group platform error: {0}")]
    Platform(String),

    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The customer-record store failed.
    #[error("Customer store error: {0}")]
    Store(String),

    /// Filesystem error while persisting customer records.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An identifier failed validation.
    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    /// The email address is malformed.
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    /// The email address is already linked to another user.
    #[error("Email is already linked to another user: {0}")]
    EmailInUse(String),

    /// The billing provider has no customer with this email.
    #[error("No billing customer found for {0}")]
    IdentityNotFound(String),

    /// The billing customer exists but has no active subscription or lifetime grant.
    #[error("No active subscription")]
    NoActiveSubscription,

    /// The user has no customer record (never linked an email).
    #[error("User {0} has no linked email")]
    NotLinked(String),
}

impl SyncError {
    /// Returns `true` for failures that say nothing about the user's billing
    /// state and should simply be retried on the next cycle.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Http(_) | Self::BillingResponse(_) | Self::CircuitOpen)
    }
}
