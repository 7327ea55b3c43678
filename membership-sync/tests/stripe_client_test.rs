//! Stripe client against a mock server.

use membership_sync::{
    billing::{BillingApi, StripeClient, SubscriptionStatus},
    config::BillingConfig,
    error::SyncError,
    ids::{CustomerId, SubscriptionId},
};
use serde_json::json;
use url::Url;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path, query_param},
};

fn client(server: &MockServer) -> StripeClient {
    let config = BillingConfig {
        api_key: "sk_test_123".to_owned(),
        min_interval_ms: 1,
        timeout_secs: 5,
        ..BillingConfig::default()
    };
    StripeClient::new(&config, Url::parse(&server.uri()).expect("mock server uri"))
        .expect("client should build")
}

fn customer() -> CustomerId {
    CustomerId::new("cus_1").expect("valid id")
}

#[tokio::test]
async fn test_resolve_identity_exact_search() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/customers/search"))
        .and(query_param("query", "email:'member@example.com'"))
        .and(header("authorization", "Bearer sk_test_123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "id": "cus_1", "email": "member@example.com" }],
            "has_more": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let found = client(&server).resolve_identity("member@example.com").await.unwrap();

    assert_eq!(found, Some(customer()));
}

#[tokio::test]
async fn test_resolve_identity_plus_address_filters_exact_match() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/customers/search"))
        .and(query_param("query", "email~'tag@example.com'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "id": "cus_other", "email": "someone+tag@example.com" },
                { "id": "cus_1", "email": "Member+tag@example.com" }
            ]
        })))
        .mount(&server)
        .await;

    let found = client(&server).resolve_identity("member+tag@example.com").await.unwrap();

    assert_eq!(found, Some(customer()));
}

#[tokio::test]
async fn test_resolve_identity_without_match() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/customers/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .mount(&server)
        .await;

    assert_eq!(client(&server).resolve_identity("nobody@example.com").await.unwrap(), None);
}

#[tokio::test]
async fn test_snapshot_parses_subscriptions_and_payments() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/subscriptions"))
        .and(query_param("customer", "cus_1"))
        .and(query_param("status", "all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{
                "id": "sub_1",
                "status": "past_due",
                "cancel_at": null,
                "current_period_end": 1_900_000_000,
                "items": { "data": [{ "plan": { "id": "gold_membership_monthly" } }] }
            }, {
                "id": "sub_2",
                "status": "some_future_status"
            }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/payment_intents"))
        .and(query_param("customer", "cus_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "charges": { "data": [{ "description": "LIFETIME pass", "created": 1_700_000_000 }] } }]
        })))
        .mount(&server)
        .await;

    let snapshot = client(&server).snapshot(&customer()).await.unwrap();

    assert_eq!(snapshot.subscriptions.len(), 2);
    assert_eq!(snapshot.subscriptions[0].status, SubscriptionStatus::PastDue);
    assert_eq!(snapshot.subscriptions[0].plan_name(), "Gold Membership");
    assert_eq!(snapshot.subscriptions[1].status, SubscriptionStatus::Other);
    assert_eq!(
        snapshot.lifetime_purchase("LIFETIME").map(|at| at.timestamp()),
        Some(1_700_000_000)
    );
}

#[tokio::test]
async fn test_cancel_subscription_sends_delete() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v1/subscriptions/sub_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "sub_1", "status": "canceled" })))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .cancel_subscription(&SubscriptionId::new("sub_1").unwrap())
        .await
        .expect("cancel should succeed");
}

#[tokio::test]
async fn test_customer_email_and_deleted_customer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/customers/cus_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "cus_1", "email": "a@example.com" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/customers/cus_gone"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "cus_gone", "deleted": true })))
        .mount(&server)
        .await;

    let client = client(&server);
    assert_eq!(client.customer_email(&customer()).await.unwrap().as_deref(), Some("a@example.com"));
    assert_eq!(client.customer_email(&CustomerId::new("cus_gone").unwrap()).await.unwrap(), None);
}

#[tokio::test]
async fn test_error_body_becomes_billing_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/subscriptions"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "message": "No such customer: 'cus_1'" }
        })))
        .mount(&server)
        .await;

    let error = client(&server).list_subscriptions(&customer()).await.unwrap_err();

    assert!(matches!(&error, SyncError::BillingResponse(msg) if msg.contains("No such customer")));
    assert!(error.is_transient());
}

#[tokio::test]
async fn test_repeated_outages_open_the_circuit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/payment_intents"))
        .respond_with(ResponseTemplate::new(503))
        .expect(5)
        .mount(&server)
        .await;

    let client = client(&server);
    for _ in 0..5 {
        assert!(matches!(
            client.list_payments(&customer()).await,
            Err(SyncError::BillingResponse(_))
        ));
    }

    assert!(matches!(client.list_payments(&customer()).await, Err(SyncError::CircuitOpen)));
}
