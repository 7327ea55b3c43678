//! Billing collaborator: the subscription facts access decisions rest on.
//!
//! [`BillingApi`] is the seam the engine talks to. [`StripeClient`] is the
//! production implementation; tests use the fake in [`crate::testing`].

mod evaluate;
pub mod models;
mod stripe;

#[allow(
    redundant_imports,
    reason = "Future needed for RPITIT despite being in Edition 2024 prelude"
)]
use std::future::Future;

pub use evaluate::{BillingSnapshot, BillingVerdict};
pub use models::{Charge, Customer, ListEnvelope, Payment, Plan, Subscription, SubscriptionStatus};
pub use stripe::StripeClient;

use crate::{
    error::Result,
    ids::{CustomerId, SubscriptionId},
};

/// Operations the engine needs from the billing provider.
///
/// Every method may fail transiently; callers treat such failures as "try
/// again later", never as "inactive".
pub trait BillingApi: Send + Sync {
    /// Finds the customer owning `email`.
    ///
    /// Returns `Ok(None)` when no customer matches.
    ///
    /// # Errors
    ///
    /// Returns error if the provider cannot be reached or answers with an error.
    fn resolve_identity<'a>(
        &'a self,
        email: &'a str,
    ) -> impl Future<Output = Result<Option<CustomerId>>> + Send + 'a;

    /// Lists every subscription of `customer`, whatever its status.
    ///
    /// # Errors
    ///
    /// Returns error if the provider cannot be reached or answers with an error.
    fn list_subscriptions<'a>(
        &'a self,
        customer: &'a CustomerId,
    ) -> impl Future<Output = Result<Vec<Subscription>>> + Send + 'a;

    /// Lists one-off payments of `customer`.
    ///
    /// # Errors
    ///
    /// Returns error if the provider cannot be reached or answers with an error.
    fn list_payments<'a>(
        &'a self,
        customer: &'a CustomerId,
    ) -> impl Future<Output = Result<Vec<Payment>>> + Send + 'a;

    /// Cancels a subscription immediately.
    ///
    /// # Errors
    ///
    /// Returns error if the provider cannot be reached or refuses the cancellation.
    fn cancel_subscription<'a>(
        &'a self,
        subscription: &'a SubscriptionId,
    ) -> impl Future<Output = Result<()>> + Send + 'a;

    /// Email on file for `customer`, used by webhook events that only carry
    /// the customer id.
    ///
    /// # Errors
    ///
    /// Returns error if the provider cannot be reached or answers with an error.
    fn customer_email<'a>(
        &'a self,
        customer: &'a CustomerId,
    ) -> impl Future<Output = Result<Option<String>>> + Send + 'a;

    /// Fetches subscriptions and payments of `customer`.
    ///
    /// # Errors
    ///
    /// Returns the first error of the two underlying calls.
    fn snapshot<'a>(
        &'a self,
        customer: &'a CustomerId,
    ) -> impl Future<Output = Result<BillingSnapshot>> + Send + 'a {
        async move {
            let subscriptions = self.list_subscriptions(customer).await?;
            let payments = self.list_payments(customer).await?;
            Ok(BillingSnapshot { subscriptions, payments })
        }
    }
}
