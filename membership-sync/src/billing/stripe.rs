//! Stripe REST client.
//!
//! Every request is admitted by a [`CircuitBreaker`] and then queued on a
//! single-flight [`RequestThrottle`], so at most one request is in flight and
//! request starts are spaced by the configured interval. Transport failures,
//! 429 and 5xx responses count toward opening the circuit; other 4xx answers
//! do not.

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};
use tracing::{debug, instrument};
use url::Url;

use super::{
    BillingApi,
    models::{Customer, ErrorBody, ListEnvelope, Payment, Subscription},
};
use crate::{
    audit::redact_email,
    config::{BillingConfig, SyncConfig},
    error::{Result, SyncError},
    ids::{CustomerId, SubscriptionId},
    reliability::{
        CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, RequestThrottle, ThrottleConfig,
    },
};

/// Page size for list endpoints.
const PAGE_LIMIT: &str = "100";

/// Failure of a single provider call, before mapping to [`SyncError`].
#[derive(Debug)]
enum CallFailure {
    Transport(reqwest::Error),
    Rejected { status: StatusCode, message: String },
}

impl CallFailure {
    fn counts_as_outage(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Rejected { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
        }
    }
}

impl From<CallFailure> for SyncError {
    fn from(failure: CallFailure) -> Self {
        match failure {
            CallFailure::Transport(e) => Self::Http(e),
            CallFailure::Rejected { status, message } => {
                Self::BillingResponse(format!("{status}: {message}"))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct CustomerSearch {
    data: Vec<Customer>,
}

#[derive(Debug, Deserialize)]
struct RetrievedCustomer {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    deleted: bool,
}

/// Billing client for the Stripe REST API.
///
/// # Examples
///
/// ```rust,no_run
/// use membership_sync::{
///     billing::{BillingApi, StripeClient},
///     config::SyncConfig,
/// };
///
/// # async fn example(config: SyncConfig) -> membership_sync::error::Result<()> {
/// let client = StripeClient::from_config(&config)?;
///
/// if let Some(customer) = client.resolve_identity("member@example.com").await? {
///     let snapshot = client.snapshot(&customer).await?;
///     println!("{} subscriptions", snapshot.subscriptions.len());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct StripeClient {
    http: Client,
    base_url: Url,
    api_key: String,
    throttle: RequestThrottle,
    breaker: CircuitBreaker,
}

impl StripeClient {
    /// Creates a client from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if the base URL is not allowed, or
    /// [`SyncError::Http`] if the HTTP client cannot be built.
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        let base_url = config.parse_base_url("billing.base_url", &config.billing.base_url)?;
        Self::new(&config.billing, base_url)
    }

    /// Creates a client against an explicit base URL.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &BillingConfig, base_url: Url) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.timeout().min(std::time::Duration::from_secs(10)))
            .build()?;
        Ok(Self {
            http,
            base_url,
            api_key: config.api_key.clone(),
            throttle: RequestThrottle::new(ThrottleConfig { min_interval: config.min_interval() }),
            breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| SyncError::Config(format!("invalid billing path {path}: {e}")))
    }

    async fn dispatch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let request = request.bearer_auth(&self.api_key);
        let body = self
            .breaker
            .call(|| self.throttle.run(execute(request)), CallFailure::counts_as_outage)
            .await
            .map_err(|e| match e {
                CircuitBreakerError::Open => SyncError::CircuitOpen,
                CircuitBreakerError::Inner(failure) => SyncError::from(failure),
            })?;

        serde_json::from_str(&body)
            .map_err(|e| SyncError::BillingResponse(format!("unexpected response body: {e}")))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = self.url(path)?;
        self.dispatch(self.http.request(Method::GET, url).query(query)).await
    }

    async fn search_customers(&self, query: &str) -> Result<Vec<Customer>> {
        let search: CustomerSearch =
            self.get("/v1/customers/search", &[("query", query), ("limit", PAGE_LIMIT)]).await?;
        Ok(search.data)
    }
}

async fn execute(request: RequestBuilder) -> std::result::Result<String, CallFailure> {
    let response = request.send().await.map_err(CallFailure::Transport)?;
    let status = response.status();
    let body = response.text().await.map_err(CallFailure::Transport)?;
    if status.is_success() {
        return Ok(body);
    }

    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|parsed| parsed.error.message)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_owned());
    Err(CallFailure::Rejected { status, message })
}

/// Quotes a value for the provider's search query language.
fn search_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

impl BillingApi for StripeClient {
    #[instrument(skip(self, email), fields(email = %redact_email(email)), level = "debug")]
    async fn resolve_identity<'a>(&'a self, email: &'a str) -> Result<Option<CustomerId>> {
        // Exact search misses plus-addressed emails; search by the part after
        // '+' and keep exact matches.
        let customers = match email.split_once('+') {
            Some((_, tail)) => {
                let found =
                    self.search_customers(&format!("email~{}", search_literal(tail))).await?;
                found
                    .into_iter()
                    .filter(|customer| {
                        customer.email.as_deref().is_some_and(|found| found.eq_ignore_ascii_case(email))
                    })
                    .collect()
            }
            None => self.search_customers(&format!("email:{}", search_literal(email))).await?,
        };

        let customer = customers.into_iter().next().map(|customer| customer.id);
        debug!(found = customer.is_some(), "Customer lookup finished");
        Ok(customer)
    }

    #[instrument(skip(self, customer), fields(customer = %customer), level = "debug")]
    async fn list_subscriptions<'a>(&'a self, customer: &'a CustomerId) -> Result<Vec<Subscription>> {
        let page: ListEnvelope<Subscription> = self
            .get(
                "/v1/subscriptions",
                &[("customer", customer.as_str()), ("status", "all"), ("limit", PAGE_LIMIT)],
            )
            .await?;
        Ok(page.data)
    }

    #[instrument(skip(self, customer), fields(customer = %customer), level = "debug")]
    async fn list_payments<'a>(&'a self, customer: &'a CustomerId) -> Result<Vec<Payment>> {
        let page: ListEnvelope<Payment> = self
            .get("/v1/payment_intents", &[("customer", customer.as_str()), ("limit", PAGE_LIMIT)])
            .await?;
        Ok(page.data)
    }

    #[instrument(skip(self, subscription), fields(subscription = %subscription), level = "debug")]
    async fn cancel_subscription<'a>(&'a self, subscription: &'a SubscriptionId) -> Result<()> {
        let url = self.url(&format!("/v1/subscriptions/{subscription}"))?;
        let _: serde::de::IgnoredAny = self.dispatch(self.http.request(Method::DELETE, url)).await?;
        Ok(())
    }

    #[instrument(skip(self, customer), fields(customer = %customer), level = "debug")]
    async fn customer_email<'a>(&'a self, customer: &'a CustomerId) -> Result<Option<String>> {
        let retrieved: RetrievedCustomer = self.get(&format!("/v1/customers/{customer}"), &[]).await?;
        Ok(if retrieved.deleted { None } else { retrieved.email })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_literal_escapes_quotes() {
        assert_eq!(search_literal("a@example.com"), "'a@example.com'");
        assert_eq!(search_literal("o'neil@example.com"), "'o\\'neil@example.com'");
    }

    #[test]
    fn test_outage_classification() {
        let rejected = |status| CallFailure::Rejected { status, message: String::new() };
        assert!(rejected(StatusCode::INTERNAL_SERVER_ERROR).counts_as_outage());
        assert!(rejected(StatusCode::TOO_MANY_REQUESTS).counts_as_outage());
        assert!(!rejected(StatusCode::NOT_FOUND).counts_as_outage());
        assert!(!rejected(StatusCode::UNAUTHORIZED).counts_as_outage());
    }

    #[test]
    fn test_rejection_maps_to_billing_response() {
        let error = SyncError::from(CallFailure::Rejected {
            status: StatusCode::PAYMENT_REQUIRED,
            message: "No such customer".to_owned(),
        });
        assert!(matches!(error, SyncError::BillingResponse(msg) if msg.contains("No such customer")));
    }
}
