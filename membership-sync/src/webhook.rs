//! Billing-provider event dispatch.
//!
//! Events only tell the engine *which* customer changed. The customer is
//! always re-evaluated from the provider before anything is applied, so an
//! out-of-order or replayed event cannot grant or revoke access on its own.
//! Receiving the HTTP request and checking its signature happen upstream.

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::{
    audit::redact_email,
    billing::BillingApi,
    engine::{ApplyOutcome, MembershipEngine},
    error::Result,
    ids::{CustomerId, UserId},
    membership::MembershipState,
    notify::Notifier,
    platform::GroupPlatform,
    store::CustomerStore,
};

/// Event types that trigger a re-evaluation.
pub const HANDLED_EVENTS: [&str; 4] = [
    "checkout.session.completed",
    "customer.subscription.created",
    "customer.subscription.updated",
    "customer.subscription.deleted",
];

/// A provider event as delivered to the webhook endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BillingEvent {
    /// Event id.
    pub id: String,
    /// Event type, such as `customer.subscription.updated`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Event payload.
    pub data: EventData,
}

/// Payload wrapper of a [`BillingEvent`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventData {
    /// The object the event is about: a subscription or a checkout session.
    pub object: Value,
}

impl BillingEvent {
    /// Customer id carried by the event object.
    #[must_use]
    pub fn customer_id(&self) -> Option<CustomerId> {
        self.data
            .object
            .get("customer")
            .and_then(Value::as_str)
            .and_then(|id| CustomerId::new(id).ok())
    }

    /// Customer email carried by the event object, if any.
    #[must_use]
    pub fn customer_email(&self) -> Option<&str> {
        let object = &self.data.object;
        [
            object.pointer("/customer_details/email"),
            object.get("customer_email"),
            object.pointer("/billing/customer_email"),
        ]
        .into_iter()
        .flatten()
        .find_map(Value::as_str)
        .filter(|email| !email.trim().is_empty())
    }
}

/// What [`MembershipEngine::handle_billing_event`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The event type is not handled.
    Ignored,
    /// Neither the event nor the provider yielded a customer or email.
    IdentityMissing,
    /// No user linked the customer's email.
    NoLinkedRecord,
    /// The linked user is under manual override.
    AdminOverride,
    /// The customer was re-evaluated and the result applied.
    Applied {
        /// Linked user.
        user: UserId,
        /// State applied.
        state: MembershipState,
        /// Transition result.
        outcome: ApplyOutcome,
    },
}

impl<B, P, S, N> MembershipEngine<B, P, S, N>
where
    B: BillingApi,
    P: GroupPlatform,
    S: CustomerStore,
    N: Notifier,
{
    /// Re-evaluates the customer behind `event` and applies the result.
    ///
    /// # Errors
    ///
    /// Returns collaborator errors; the provider retries failed deliveries.
    #[instrument(skip(self, event), fields(event_id = %event.id, kind = %event.kind), level = "debug")]
    pub async fn handle_billing_event(&self, event: &BillingEvent) -> Result<WebhookOutcome> {
        if !HANDLED_EVENTS.contains(&event.kind.as_str()) {
            debug!("Ignoring billing event");
            return Ok(WebhookOutcome::Ignored);
        }

        let (customer, email) = match (event.customer_id(), event.customer_email()) {
            (Some(customer), Some(email)) => (customer, email.to_owned()),
            (Some(customer), None) => match self.billing().customer_email(&customer).await? {
                Some(email) => (customer, email),
                None => return Ok(WebhookOutcome::IdentityMissing),
            },
            // Guest checkout: no customer object, only an email.
            (None, Some(email)) => match self.billing().resolve_identity(email).await? {
                Some(customer) => (customer, email.to_owned()),
                None => return Ok(WebhookOutcome::IdentityMissing),
            },
            (None, None) => return Ok(WebhookOutcome::IdentityMissing),
        };

        let Some(record) = self.store().find_by_email(&email).await? else {
            debug!(email = %redact_email(&email), "No linked record for billing event");
            return Ok(WebhookOutcome::NoLinkedRecord);
        };
        if record.admin_access_override {
            debug!(user = %record.discord_user_id, "User under admin override, skipping");
            return Ok(WebhookOutcome::AdminOverride);
        }

        let snapshot = self.billing().snapshot(&customer).await?;
        let decision = snapshot.evaluate(Utc::now(), self.lifetime_keyword()).decision();
        let user = record.discord_user_id;
        info!(user = %user, state = %decision.state, "Applying billing event");

        let outcome = self.apply_membership_state(&user, &decision).await?;
        Ok(WebhookOutcome::Applied { user, state: decision.state, outcome })
    }
}
