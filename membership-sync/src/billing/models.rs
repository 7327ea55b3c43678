//! Billing-provider response models.
//!
//! Only the fields reconciliation reads are modelled; unknown fields are
//! ignored so provider API additions never break deserialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{CustomerId, SubscriptionId};

/// Paginated list wrapper used by every list endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEnvelope<T> {
    /// Page items.
    pub data: Vec<T>,
    /// More items exist beyond this page.
    #[serde(default)]
    pub has_more: bool,
}

impl<T> Default for ListEnvelope<T> {
    fn default() -> Self {
        Self { data: Vec::new(), has_more: false }
    }
}

/// Billing customer, as returned by customer search and retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    /// Customer id.
    pub id: CustomerId,
    /// Email on file.
    #[serde(default)]
    pub email: Option<String>,
}

/// Subscription status as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Paid and current.
    Active,
    /// In a free trial.
    Trialing,
    /// Latest invoice failed; the provider is retrying.
    PastDue,
    /// The provider stopped retrying payment.
    Unpaid,
    /// Terminated.
    Canceled,
    /// First payment not completed yet.
    Incomplete,
    /// First payment never completed.
    IncompleteExpired,
    /// Collection paused.
    Paused,
    /// Any status this crate does not know.
    #[serde(other)]
    Other,
}

impl SubscriptionStatus {
    /// Human-readable label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Trialing => "Trialing",
            Self::PastDue => "Past due",
            Self::Unpaid => "Unpaid",
            Self::Canceled => "Cancelled",
            Self::Incomplete => "Incomplete",
            Self::IncompleteExpired => "Incomplete (expired)",
            Self::Paused => "Paused",
            Self::Other => "Unknown",
        }
    }
}

/// Plan reference on a subscription item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Plan id, e.g. `gold_membership_monthly`.
    pub id: String,
}

/// Line item of a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionItem {
    /// Plan of this item.
    #[serde(default)]
    pub plan: Option<Plan>,
    /// Item-level period end, used by newer API versions.
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub current_period_end: Option<DateTime<Utc>>,
}

/// Recurring subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Subscription id.
    pub id: SubscriptionId,
    /// Current status.
    pub status: SubscriptionStatus,
    /// Scheduled cancellation time, set when the customer cancelled but the
    /// paid period has not run out.
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub cancel_at: Option<DateTime<Utc>>,
    /// End of the current paid period.
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub current_period_end: Option<DateTime<Utc>>,
    /// Line items.
    #[serde(default)]
    pub items: ListEnvelope<SubscriptionItem>,
}

impl Subscription {
    /// End of the paid period, falling back to the first item's period end.
    #[must_use]
    pub fn period_end(&self) -> Option<DateTime<Utc>> {
        self.current_period_end
            .or_else(|| self.items.data.first().and_then(|item| item.current_period_end))
    }

    /// Whether this subscription grants access at `now`.
    ///
    /// True for `active` and `trialing`, and for any subscription with a
    /// scheduled cancellation whose paid period has not ended yet.
    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, SubscriptionStatus::Active | SubscriptionStatus::Trialing)
            || self.is_cancel_pending_at(now)
    }

    /// Cancellation scheduled, paid period still running.
    #[must_use]
    pub fn is_cancel_pending_at(&self, now: DateTime<Utc>) -> bool {
        self.cancel_at.is_some() && self.period_end().is_some_and(|end| end > now)
    }

    /// Display name derived from the first item's plan id.
    ///
    /// Underscores become spaces, words are capitalized, and anything after
    /// the word "Membership" is dropped: `gold_membership_monthly` becomes
    /// `Gold Membership`.
    #[must_use]
    pub fn plan_name(&self) -> String {
        let Some(plan) = self.items.data.first().and_then(|item| item.plan.as_ref()) else {
            return "Subscription".to_owned();
        };

        let mut words = Vec::new();
        for word in plan.id.split('_').filter(|word| !word.is_empty()) {
            let mut chars = word.chars();
            let capitalized: String = match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => continue,
            };
            let is_membership = capitalized.eq_ignore_ascii_case("membership");
            words.push(capitalized);
            if is_membership {
                break;
            }
        }
        words.join(" ")
    }
}

/// A charge attached to a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charge {
    /// Free-text description; lifetime purchases carry a marker keyword here.
    #[serde(default)]
    pub description: Option<String>,
    /// Creation time.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created: DateTime<Utc>,
}

/// One-off payment with its charges.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Payment {
    /// Charges of this payment.
    #[serde(default)]
    pub charges: ListEnvelope<Charge>,
}

/// Error body returned by the provider on non-2xx responses.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub(crate) error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorDetail {
    #[serde(default)]
    pub(crate) message: Option<String>,
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn subscription(json: &str) -> Subscription {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_deserialize_provider_subscription() {
        let sub = subscription(
            r#"{
                "id": "sub_123",
                "object": "subscription",
                "status": "active",
                "cancel_at": null,
                "current_period_end": 1893456000,
                "items": {"object": "list", "data": [{"plan": {"id": "gold_membership_monthly", "amount": 999}}]}
            }"#,
        );
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.period_end().map(|end| end.timestamp()), Some(1_893_456_000));
        assert_eq!(sub.plan_name(), "Gold Membership");
    }

    #[test]
    fn test_unknown_status_is_tolerated() {
        let sub = subscription(r#"{"id": "sub_1", "status": "something_new"}"#);
        assert_eq!(sub.status, SubscriptionStatus::Other);
        assert_eq!(sub.plan_name(), "Subscription");
    }

    #[test]
    fn test_cancel_pending_counts_as_active() {
        let now = Utc::now();
        let mut sub = subscription(r#"{"id": "sub_1", "status": "canceled"}"#);
        sub.cancel_at = Some(now + Duration::days(3));
        sub.current_period_end = Some(now + Duration::days(3));
        assert!(sub.is_active_at(now));

        sub.current_period_end = Some(now - Duration::hours(1));
        assert!(!sub.is_active_at(now));
    }

    #[test]
    fn test_item_period_end_fallback() {
        let sub = subscription(
            r#"{"id": "sub_1", "status": "past_due", "cancel_at": 1893456000,
                "items": {"data": [{"current_period_end": 1893456000}]}}"#,
        );
        assert_eq!(sub.period_end().map(|end| end.timestamp()), Some(1_893_456_000));
    }

    #[test]
    fn test_trialing_and_unpaid() {
        let now = Utc::now();
        assert!(subscription(r#"{"id": "sub_1", "status": "trialing"}"#).is_active_at(now));
        assert!(!subscription(r#"{"id": "sub_1", "status": "unpaid"}"#).is_active_at(now));
    }

    #[test]
    fn test_plan_name_without_membership_word() {
        let sub = subscription(
            r#"{"id": "sub_1", "status": "active", "items": {"data": [{"plan": {"id": "vip__yearly"}}]}}"#,
        );
        assert_eq!(sub.plan_name(), "Vip Yearly");
    }

    #[test]
    fn test_charge_timestamp() {
        let payment: Payment = serde_json::from_str(
            r#"{"id": "pi_1", "charges": {"data": [{"description": "Lifetime access", "created": 1700000000}]}}"#,
        )
        .unwrap();
        assert_eq!(payment.charges.data[0].created.timestamp(), 1_700_000_000);
    }
}
