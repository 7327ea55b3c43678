//! User- and staff-facing operations.
//!
//! These are what a chat front-end calls after parsing a command. Each one
//! returns a typed result or a [`SyncError`] the front-end can turn into a
//! reply; none of them deal with command syntax.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    audit::{AuditEvent, AuditEventType, audit_log, redact_email},
    billing::{BillingApi, BillingSnapshot, Subscription, SubscriptionStatus},
    engine::{ApplyOutcome, MembershipEngine},
    error::{Result, SyncError},
    ids::UserId,
    membership::MembershipDecision,
    notify::Notifier,
    platform::GroupPlatform,
    store::{CustomerPatch, CustomerRecord, CustomerStore},
};

/// What a successful claim did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimOutcome {
    /// Lifetime purchase found.
    pub lifetime: bool,
    /// Transition applied.
    pub apply: ApplyOutcome,
}

/// One subscription as shown in a status report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionLine {
    /// Plan display name.
    pub plan: String,
    /// Human-readable standing.
    pub standing: String,
    /// End of the paid period.
    pub period_end: Option<DateTime<Utc>>,
}

/// Status report of one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MembershipStatus {
    /// Stored record.
    pub record: CustomerRecord,
    /// One line per subscription. Empty when the email matches no customer.
    pub subscriptions: Vec<SubscriptionLine>,
    /// Date of the lifetime purchase, if any.
    pub lifetime_since: Option<DateTime<Utc>>,
}

/// Checks the shape of an email address: `local@domain`, where the local part
/// uses letters, digits and `+ _ . -`.
///
/// # Errors
///
/// Returns [`SyncError::InvalidEmail`] when the address does not fit.
pub fn validate_email(email: &str) -> Result<&str> {
    let email = email.trim();
    let valid = email.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty()
            && local.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '_' | '.' | '-'))
            && !domain.is_empty()
            && !domain.chars().any(|c| c.is_whitespace() || c.is_control())
    });
    if valid { Ok(email) } else { Err(SyncError::InvalidEmail(redact_email(email))) }
}

fn standing(subscription: &Subscription, now: DateTime<Utc>) -> String {
    if subscription.is_cancel_pending_at(now) {
        "Cancelled (not expired yet)".to_owned()
    } else if subscription.is_active_at(now) {
        "Active".to_owned()
    } else if subscription.status == SubscriptionStatus::Canceled {
        "Cancelled".to_owned()
    } else {
        subscription.status.label().to_owned()
    }
}

impl<B, P, S, N> MembershipEngine<B, P, S, N>
where
    B: BillingApi,
    P: GroupPlatform,
    S: CustomerStore,
    N: Notifier,
{
    /// Links `email` to `user` and grants access.
    ///
    /// # Errors
    ///
    /// - [`SyncError::InvalidEmail`] for a malformed address
    /// - [`SyncError::EmailInUse`] if another user linked the email
    /// - [`SyncError::IdentityNotFound`] if no billing customer owns it
    /// - [`SyncError::NoActiveSubscription`] without an active subscription or
    ///   lifetime purchase
    /// - collaborator errors, including [`SyncError::RoleMutation`]
    #[instrument(skip(self, user, email), fields(user = %user), level = "debug")]
    pub async fn claim_subscription(&self, user: &UserId, email: &str) -> Result<ClaimOutcome> {
        let email = validate_email(email)?;
        let redacted = redact_email(email);
        let _guard = self.lock_user(user).await;

        if let Some(owner) = self.store().find_by_email(email).await?
            && owner.discord_user_id != *user
        {
            return Err(SyncError::EmailInUse(redacted));
        }

        let snapshot = self.fetch_billing(email).await?;
        let verdict = snapshot.evaluate(Utc::now(), self.lifetime_keyword());
        if !verdict.is_active {
            return Err(SyncError::NoActiveSubscription);
        }

        let mut record = self
            .store()
            .find_by_user(user)
            .await?
            .unwrap_or_else(|| CustomerRecord::new(user.clone()));
        record.email = Some(email.to_owned());
        record.had_active_subscription = true;
        record.reminder_stage = None;
        self.store().upsert(record).await?;

        info!(user = %user, email = %redacted, "Subscription linked");
        audit_log(
            &AuditEvent::new(AuditEventType::SubscriptionLinked, user.as_str(), Uuid::new_v4())
                .with_email(&redacted),
        );

        let decision = MembershipDecision::active(verdict.has_lifetime, "subscription claimed");
        let apply = self.apply_locked(user, &decision, None).await?;
        Ok(ClaimOutcome { lifetime: verdict.has_lifetime, apply })
    }

    /// Cancels the user's first active subscription and removes access.
    ///
    /// # Errors
    ///
    /// - [`SyncError::NotLinked`] if the user has no record with an email
    /// - [`SyncError::IdentityNotFound`] if the email matches no customer
    /// - [`SyncError::NoActiveSubscription`] if nothing is active
    /// - collaborator errors
    #[instrument(skip(self, user), fields(user = %user), level = "debug")]
    pub async fn cancel_subscription(&self, user: &UserId) -> Result<ApplyOutcome> {
        let _guard = self.lock_user(user).await;
        let email = self
            .store()
            .find_by_user(user)
            .await?
            .and_then(|record| record.email)
            .ok_or_else(|| SyncError::NotLinked(user.to_string()))?;

        let snapshot = self.fetch_billing(&email).await?;
        let subscription = snapshot
            .first_active_subscription(Utc::now())
            .ok_or(SyncError::NoActiveSubscription)?;
        self.billing().cancel_subscription(&subscription.id).await?;

        info!(user = %user, subscription = %subscription.id, "Subscription cancelled");
        audit_log(
            &AuditEvent::new(AuditEventType::SubscriptionCancelled, user.as_str(), Uuid::new_v4())
                .with_email(&redact_email(&email))
                .with_note(subscription.id.as_str()),
        );

        // An explicit cancellation ends access without a reminder countdown.
        let decision = MembershipDecision::inactive("subscription cancelled by user");
        self.apply_locked(user, &decision, Some(CustomerPatch::access(false))).await
    }

    /// Reports the user's record and subscriptions.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotLinked`] if the user has no record with an
    /// email, or a collaborator error.
    #[instrument(skip(self, user), fields(user = %user), level = "debug")]
    pub async fn membership_status(&self, user: &UserId) -> Result<MembershipStatus> {
        let record = self
            .store()
            .find_by_user(user)
            .await?
            .ok_or_else(|| SyncError::NotLinked(user.to_string()))?;
        let Some(email) = record.email.as_deref() else {
            return Err(SyncError::NotLinked(user.to_string()));
        };

        let snapshot = match self.billing().resolve_identity(email).await? {
            Some(customer) => self.billing().snapshot(&customer).await?,
            None => BillingSnapshot::default(),
        };

        let now = Utc::now();
        let subscriptions = snapshot
            .subscriptions
            .iter()
            .map(|sub| SubscriptionLine {
                plan: sub.plan_name(),
                standing: standing(sub, now),
                period_end: sub.period_end(),
            })
            .collect();
        let lifetime_since =
            self.lifetime_keyword().and_then(|keyword| snapshot.lifetime_purchase(keyword));

        Ok(MembershipStatus { record, subscriptions, lifetime_since })
    }

    /// Turns the manual access override on or off.
    ///
    /// Enabling grants Active right away. Disabling leaves roles alone; the
    /// next sweep reconciles them from billing.
    ///
    /// # Errors
    ///
    /// Returns collaborator errors, including [`SyncError::RoleMutation`].
    #[instrument(skip(self, user), fields(user = %user), level = "debug")]
    pub async fn set_admin_override(&self, user: &UserId, enabled: bool) -> Result<Option<ApplyOutcome>> {
        let _guard = self.lock_user(user).await;
        let mut record = self
            .store()
            .find_by_user(user)
            .await?
            .unwrap_or_else(|| CustomerRecord::new(user.clone()));
        record.admin_access_override = enabled;
        self.store().upsert(record).await?;

        audit_log(
            &AuditEvent::new(AuditEventType::AdminOverrideChanged, user.as_str(), Uuid::new_v4())
                .with_note(if enabled { "enabled" } else { "disabled" }),
        );

        if !enabled {
            return Ok(None);
        }
        let decision = MembershipDecision::active(false, "access granted by staff");
        self.apply_locked(user, &decision, Some(CustomerPatch::access(true))).await.map(Some)
    }

    async fn fetch_billing(&self, email: &str) -> Result<BillingSnapshot> {
        let customer = self
            .billing()
            .resolve_identity(email)
            .await?
            .ok_or_else(|| SyncError::IdentityNotFound(redact_email(email)))?;
        self.billing().snapshot(&customer).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::{billing::ListEnvelope, ids::SubscriptionId};

    fn subscription(status: SubscriptionStatus) -> Subscription {
        Subscription {
            id: SubscriptionId::new("sub_1").unwrap(),
            status,
            cancel_at: None,
            current_period_end: None,
            items: ListEnvelope::default(),
        }
    }

    #[test]
    fn test_validate_email() {
        assert_eq!(validate_email(" member+tag@example.com ").unwrap(), "member+tag@example.com");
        assert!(validate_email("first.last-1_x@sub.example.org").is_ok());

        for bad in ["", "no-at-sign", "@example.com", "member@", "mem ber@example.com", "a@exa mple.com"] {
            assert!(matches!(validate_email(bad), Err(SyncError::InvalidEmail(_))), "{bad}");
        }
    }

    #[test]
    fn test_standing_text() {
        let now = Utc::now();
        assert_eq!(standing(&subscription(SubscriptionStatus::Active), now), "Active");
        assert_eq!(standing(&subscription(SubscriptionStatus::Canceled), now), "Cancelled");

        let mut pending = subscription(SubscriptionStatus::Active);
        pending.cancel_at = Some(now + Duration::days(3));
        pending.current_period_end = Some(now + Duration::days(3));
        assert_eq!(standing(&pending, now), "Cancelled (not expired yet)");

        assert_eq!(
            standing(&subscription(SubscriptionStatus::PastDue), now),
            SubscriptionStatus::PastDue.label()
        );
    }
}
