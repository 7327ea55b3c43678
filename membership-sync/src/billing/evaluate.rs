//! Turning billing facts into an access verdict.

use chrono::{DateTime, Utc};

use super::models::{Payment, Subscription, SubscriptionStatus};
use crate::membership::MembershipDecision;

/// Everything the provider knows about one customer, fetched in one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BillingSnapshot {
    /// All subscriptions, any status.
    pub subscriptions: Vec<Subscription>,
    /// One-off payments.
    pub payments: Vec<Payment>,
}

/// Access verdict for one customer at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingVerdict {
    /// Access should be granted.
    pub is_active: bool,
    /// A lifetime purchase exists.
    pub has_lifetime: bool,
    /// Some subscription reached `unpaid`: the provider gave up collecting.
    pub unpaid: bool,
}

impl BillingVerdict {
    /// The membership decision this verdict calls for.
    #[must_use]
    pub fn decision(&self) -> MembershipDecision {
        if self.is_active {
            let reason = if self.has_lifetime {
                "lifetime purchase on file"
            } else {
                "active subscription"
            };
            MembershipDecision::active(self.has_lifetime, reason)
        } else if self.unpaid {
            MembershipDecision::inactive("subscription unpaid")
        } else {
            MembershipDecision::inactive("no active subscription")
        }
    }
}

impl BillingSnapshot {
    /// First subscription that grants access at `now`.
    #[must_use]
    pub fn first_active_subscription(&self, now: DateTime<Utc>) -> Option<&Subscription> {
        self.subscriptions.iter().find(|sub| sub.is_active_at(now))
    }

    /// Time of the most recent charge whose description contains `keyword`.
    ///
    /// An empty keyword matches nothing.
    #[must_use]
    pub fn lifetime_purchase(&self, keyword: &str) -> Option<DateTime<Utc>> {
        if keyword.is_empty() {
            return None;
        }
        self.payments
            .iter()
            .flat_map(|payment| &payment.charges.data)
            .filter(|charge| charge.description.as_deref().is_some_and(|d| d.contains(keyword)))
            .map(|charge| charge.created)
            .max()
    }

    /// Evaluates access at `now`. `None` for `lifetime_keyword` disables
    /// lifetime detection.
    #[must_use]
    pub fn evaluate(&self, now: DateTime<Utc>, lifetime_keyword: Option<&str>) -> BillingVerdict {
        let has_lifetime =
            lifetime_keyword.and_then(|keyword| self.lifetime_purchase(keyword)).is_some();
        let has_active_subscription = self.first_active_subscription(now).is_some();
        let unpaid = self.subscriptions.iter().any(|sub| sub.status == SubscriptionStatus::Unpaid);

        BillingVerdict { is_active: has_active_subscription || has_lifetime, has_lifetime, unpaid }
    }
}
