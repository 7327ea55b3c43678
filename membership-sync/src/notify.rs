//! Notifications to users and to the operational log channel.
//!
//! Delivery is best-effort: [`Notifier::notify`] cannot fail from the
//! caller's point of view. Implementations log and swallow delivery errors.

#[allow(
    redundant_imports,
    reason = "Future needed for RPITIT despite being in Edition 2024 prelude"
)]
use std::future::Future;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::{
    ids::UserId,
    membership::MembershipState,
    roles::RoleDiff,
};

/// Where a notice goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyTarget {
    /// Direct message to a user.
    User(UserId),
    /// The configured operational log channel.
    LogChannel,
}

/// Message content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Access ends soon unless the user renews.
    ExpiryReminder {
        /// Hours left, 48 or 24.
        hours_left: u32,
        /// Renewal link.
        payment_link: Option<String>,
    },
    /// Access has ended.
    Expired {
        /// Renewal link.
        payment_link: Option<String>,
    },
    /// Plain line for the operational log channel.
    Log(String),
}

impl Notice {
    /// Embed title, `None` for plain log lines.
    #[must_use]
    pub fn title(&self) -> Option<&'static str> {
        match self {
            Self::ExpiryReminder { .. } => Some("Your subscription is about to expire"),
            Self::Expired { .. } => Some("Your subscription is expired"),
            Self::Log(_) => None,
        }
    }

    /// Message body.
    #[must_use]
    pub fn body(&self) -> String {
        match self {
            Self::ExpiryReminder { hours_left, payment_link } => format!(
                "{} Your subscription expires within {hours_left} hours.",
                renewal_sentence(payment_link.as_deref())
            ),
            Self::Expired { payment_link } => renewal_sentence(payment_link.as_deref()),
            Self::Log(line) => line.clone(),
        }
    }

    /// Log line describing an applied transition.
    #[must_use]
    pub fn applied(
        at: DateTime<Utc>,
        user: &UserId,
        state: MembershipState,
        diff: &RoleDiff,
        reason: &str,
    ) -> Self {
        Self::Log(format!(
            "[{}] {user} → {state} | roles updated {} ({reason})",
            at.to_rfc3339_opts(SecondsFormat::Secs, true),
            diff.summary()
        ))
    }

    /// Log line for a refused role mutation.
    #[must_use]
    pub fn mutation_failed(user: &UserId, message: &str) -> Self {
        Self::Log(format!("⚠️ Role update failed for <@{user}>: {message}"))
    }

    /// Log line for a finished reminder countdown.
    #[must_use]
    pub fn expired_log(user: &UserId) -> Self {
        Self::Log(format!(
            ":arrow_lower_right: <@{user}> lost all managed roles. Unknown reapplied."
        ))
    }
}

fn renewal_sentence(payment_link: Option<&str>) -> String {
    match payment_link {
        Some(link) => format!("Please visit {link} to keep your exclusive access!"),
        None => "Please renew your subscription to keep your exclusive access!".to_owned(),
    }
}

/// Delivers notices.
pub trait Notifier: Send + Sync {
    /// Sends `notice` to `target`. Never fails; delivery errors are logged.
    fn notify<'a>(
        &'a self,
        target: NotifyTarget,
        notice: &'a Notice,
    ) -> impl Future<Output = ()> + Send + 'a;
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::ids::RoleId;

    #[test]
    fn test_reminder_text() {
        let notice = Notice::ExpiryReminder {
            hours_left: 48,
            payment_link: Some("https://buy.example.com/x".to_owned()),
        };
        assert_eq!(notice.title(), Some("Your subscription is about to expire"));
        assert_eq!(
            notice.body(),
            "Please visit https://buy.example.com/x to keep your exclusive access! Your \
             subscription expires within 48 hours."
        );
    }

    #[test]
    fn test_expired_text_without_link() {
        let notice = Notice::Expired { payment_link: None };
        assert_eq!(notice.title(), Some("Your subscription is expired"));
        assert!(notice.body().starts_with("Please renew"));
    }

    #[test]
    fn test_applied_line() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 1, 0, 0).unwrap();
        let user = UserId::new("42").unwrap();
        let diff = RoleDiff { to_add: vec![RoleId::new("10").unwrap()], to_remove: vec![RoleId::new("30").unwrap()] };

        let notice = Notice::applied(at, &user, MembershipState::Active, &diff, "active subscription");

        assert_eq!(
            notice.body(),
            "[2026-03-01T01:00:00Z] 42 → ACTIVE | roles updated +[10] -[30] (active subscription)"
        );
        assert_eq!(notice.title(), None);
    }

    #[test]
    fn test_failure_and_expiry_lines() {
        let user = UserId::new("42").unwrap();
        assert_eq!(
            Notice::mutation_failed(&user, "Missing Permissions").body(),
            "⚠️ Role update failed for <@42>: Missing Permissions"
        );
        assert!(Notice::expired_log(&user).body().contains("<@42> lost all managed roles"));
    }
}
