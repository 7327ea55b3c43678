//! Audit events for membership changes.
//!
//! Every role change, reminder, expiry and sweep boundary produces one
//! [`AuditEvent`], logged through `tracing` under the `audit` target so it can
//! be routed separately from diagnostics. Events carry a correlation id: one
//! per sweep run, or one per immediate apply.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::roles::RoleDiff;

/// Types of auditable events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// Active state applied.
    MembershipActivated,
    /// Inactive state applied.
    MembershipDeactivated,
    /// The platform refused a role mutation.
    RoleMutationFailed,
    /// Expiry reminder sent.
    ReminderSent,
    /// Reminder countdown finished; access flag cleared.
    MembershipExpired,
    /// A record's email matched no billing customer.
    IdentityUnresolved,
    /// A sweep run started.
    SweepStarted,
    /// A sweep run finished.
    SweepCompleted,
    /// A user linked a billing email.
    SubscriptionLinked,
    /// A user cancelled their subscription.
    SubscriptionCancelled,
    /// Manual access override toggled.
    AdminOverrideChanged,
}

/// Contextual fields of an audit event. Absent fields are not serialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditDetails {
    /// Roles added.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added: Vec<String>,
    /// Roles removed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<String>,
    /// Reason given for the change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Redacted email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Error message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Free-form note (reminder hours, sweep counters, override state).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Audit log entry.
///
/// # Examples
///
/// ```
/// use membership_sync::audit::{AuditEvent, AuditEventType, audit_log, redact_email};
/// use uuid::Uuid;
///
/// let event = AuditEvent::new(AuditEventType::SubscriptionLinked, "123456789", Uuid::new_v4())
///     .with_email(&redact_email("member@example.com"))
///     .with_reason("claimed via command");
///
/// audit_log(&event);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub event_type: AuditEventType,
    /// Platform user the event is about, or `*` for run-level events.
    pub subject: String,
    /// Correlation id.
    pub correlation_id: Uuid,
    /// Event details.
    pub details: AuditDetails,
}

impl AuditEvent {
    /// Creates an event with empty details.
    #[must_use]
    #[allow(
        clippy::impl_trait_in_params,
        reason = "impl Into<String> is idiomatic for builder methods"
    )]
    pub fn new(event_type: AuditEventType, subject: impl Into<String>, correlation_id: Uuid) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            subject: subject.into(),
            correlation_id,
            details: AuditDetails::default(),
        }
    }

    /// Records the roles of `diff`.
    #[must_use]
    pub fn with_diff(mut self, diff: &RoleDiff) -> Self {
        self.details.added = diff.to_add.iter().map(ToString::to_string).collect();
        self.details.removed = diff.to_remove.iter().map(ToString::to_string).collect();
        self
    }

    /// Records the reason.
    #[must_use]
    #[allow(
        clippy::impl_trait_in_params,
        reason = "impl Into<String> is idiomatic for builder methods"
    )]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.details.reason = Some(reason.into());
        self
    }

    /// Records an already redacted email.
    #[must_use]
    pub fn with_email(mut self, redacted: &str) -> Self {
        self.details.email = Some(redacted.to_owned());
        self
    }

    /// Records an error message.
    #[must_use]
    #[allow(
        clippy::impl_trait_in_params,
        reason = "impl Into<String> is idiomatic for builder methods"
    )]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.details.error = Some(error.into());
        self
    }

    /// Records a free-form note.
    #[must_use]
    #[allow(
        clippy::impl_trait_in_params,
        reason = "impl Into<String> is idiomatic for builder methods"
    )]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.details.note = Some(note.into());
        self
    }
}

/// Logs `event` with target `audit`.
pub fn audit_log(event: &AuditEvent) {
    tracing::info!(
        target: "audit",
        timestamp = %event.timestamp.to_rfc3339(),
        event_type = ?event.event_type,
        subject = %event.subject,
        correlation_id = %event.correlation_id,
        details = ?event.details,
        "AUDIT"
    );
}

/// Redacts an email for logs: first character of the local part and the
/// domain are kept.
///
/// # Examples
///
/// ```
/// use membership_sync::audit::redact_email;
///
/// assert_eq!(redact_email("member@example.com"), "m***@example.com");
/// assert_eq!(redact_email("not-an-email"), "***");
/// ```
#[must_use]
pub fn redact_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() => {
            let first: String = local.chars().take(1).collect();
            format!("{first}***@{domain}")
        }
        _ => "***".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::RoleId;

    #[test]
    fn test_builder_records_diff() {
        let diff = RoleDiff {
            to_add: vec![RoleId::new("30").unwrap()],
            to_remove: vec![RoleId::new("10").unwrap(), RoleId::new("20").unwrap()],
        };
        let event = AuditEvent::new(AuditEventType::MembershipDeactivated, "42", Uuid::nil())
            .with_diff(&diff)
            .with_reason("expired");

        assert_eq!(event.details.added, vec!["30"]);
        assert_eq!(event.details.removed, vec!["10", "20"]);
        assert_eq!(event.details.reason.as_deref(), Some("expired"));
    }

    #[test]
    fn test_serialization_skips_empty_fields() {
        let event = AuditEvent::new(AuditEventType::SweepStarted, "*", Uuid::nil());
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["event_type"], "sweep_started");
        assert_eq!(json["details"], serde_json::json!({}));
    }

    #[test]
    fn test_redact_email_edge_cases() {
        assert_eq!(redact_email("a@b.c"), "a***@b.c");
        assert_eq!(redact_email("@example.com"), "***");
        assert_eq!(redact_email("élodie@example.com"), "é***@example.com");
    }

    #[test]
    fn test_audit_log_does_not_panic_without_subscriber() {
        audit_log(&AuditEvent::new(AuditEventType::ReminderSent, "42", Uuid::new_v4()).with_note("48h"));
    }
}
