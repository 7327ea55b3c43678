//! Integration tests for claim, cancel, status and admin override.

mod common;

use chrono::{Duration, TimeZone, Utc};
use common::*;
use membership_sync::{
    billing::SubscriptionStatus,
    error::SyncError,
    store::CustomerStore,
    testing::{FakeBilling, payment, subscription},
};

#[tokio::test]
async fn test_claim_links_email_and_grants_access() {
    let billing = FakeBilling::new().with_customer("member@example.com", "cus_1");
    billing.set_subscriptions("cus_1", vec![subscription("sub_1", SubscriptionStatus::Active)]);
    let platform = platform().with_member(user("100"), roles(&[UNKNOWN, STAFF]));
    let engine = engine(billing, platform, vec![]);

    let outcome = engine
        .claim_subscription(&user("100"), " member@example.com ")
        .await
        .expect("claim should succeed");

    assert!(!outcome.lifetime);
    assert_eq!(outcome.apply.mutations(), 2);
    let stored = engine.store().find_by_user(&user("100")).await.unwrap().expect("record");
    assert_eq!(stored.email.as_deref(), Some("member@example.com"));
    assert!(stored.had_active_subscription);
    assert_eq!(
        engine.platform().member(&user("100")).expect("member"),
        role_set(&[PAYING, STAFF])
    );
    assert!(engine.notifier().log_lines()[0].contains("100 → ACTIVE"));
}

#[tokio::test]
async fn test_claim_with_lifetime_purchase_only() {
    let billing = FakeBilling::new().with_customer("member@example.com", "cus_1");
    billing.set_payments("cus_1", vec![payment("Membership LIFETIME", Utc::now())]);
    let platform = platform().with_member(user("100"), roles(&[UNKNOWN]));
    let engine = engine(billing, platform, vec![]);

    let outcome = engine.claim_subscription(&user("100"), "member@example.com").await.unwrap();

    assert!(outcome.lifetime);
    assert_eq!(engine.platform().member(&user("100")).expect("member"), role_set(&[PAYING, LIFETIME]));
}

#[tokio::test]
async fn test_claim_rejections() {
    let billing = FakeBilling::new()
        .with_customer("taken@example.com", "cus_1")
        .with_customer("lapsed@example.com", "cus_2");
    billing.set_subscriptions("cus_1", vec![subscription("sub_1", SubscriptionStatus::Active)]);
    billing.set_subscriptions("cus_2", vec![subscription("sub_2", SubscriptionStatus::Canceled)]);
    let platform = platform().with_member(user("100"), roles(&[UNKNOWN]));
    let records = vec![record("200", "taken@example.com", true, None)];
    let engine = engine(billing, platform, records);
    let claimant = user("100");

    assert!(matches!(
        engine.claim_subscription(&claimant, "not an email").await,
        Err(SyncError::InvalidEmail(_))
    ));
    assert!(matches!(
        engine.claim_subscription(&claimant, "TAKEN@example.com").await,
        Err(SyncError::EmailInUse(_))
    ));
    assert!(matches!(
        engine.claim_subscription(&claimant, "nobody@example.com").await,
        Err(SyncError::IdentityNotFound(_))
    ));
    assert!(matches!(
        engine.claim_subscription(&claimant, "lapsed@example.com").await,
        Err(SyncError::NoActiveSubscription)
    ));

    assert!(engine.platform().mutations().is_empty());
    assert!(engine.store().find_by_user(&user("100")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_cancel_cancels_and_revokes() {
    let billing = FakeBilling::new().with_customer("member@example.com", "cus_1");
    billing.set_subscriptions(
        "cus_1",
        vec![
            subscription("sub_old", SubscriptionStatus::Canceled),
            subscription("sub_1", SubscriptionStatus::Active),
        ],
    );
    let platform = platform().with_member(user("100"), roles(&[PAYING, EXTRA]));
    let records = vec![record("100", "member@example.com", true, None)];
    let engine = engine(billing, platform, records);

    engine.cancel_subscription(&user("100")).await.expect("cancel should succeed");

    let cancelled: Vec<String> =
        engine.billing().cancelled().iter().map(ToString::to_string).collect();
    assert_eq!(cancelled, vec!["sub_1"]);
    assert_eq!(engine.platform().member(&user("100")).expect("member"), role_set(&[UNKNOWN, EXTRA]));
    let stored = engine.store().find_by_user(&user("100")).await.unwrap().expect("record");
    assert!(!stored.had_active_subscription);
}

#[tokio::test]
async fn test_cancel_requires_link_and_active_subscription() {
    let billing = FakeBilling::new().with_customer("member@example.com", "cus_1");
    billing.set_subscriptions("cus_1", vec![subscription("sub_1", SubscriptionStatus::PastDue)]);
    let records = vec![record("100", "member@example.com", true, None)];
    let engine = engine(billing, platform(), records);

    assert!(matches!(engine.cancel_subscription(&user("999")).await, Err(SyncError::NotLinked(_))));
    assert!(matches!(
        engine.cancel_subscription(&user("100")).await,
        Err(SyncError::NoActiveSubscription)
    ));
    assert!(engine.billing().cancelled().is_empty());
}

#[tokio::test]
async fn test_status_report() {
    let now = Utc::now();
    let purchased = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
    let billing = FakeBilling::new().with_customer("member@example.com", "cus_1");
    let mut pending = subscription("sub_2", SubscriptionStatus::Active);
    pending.cancel_at = Some(now + Duration::days(10));
    pending.current_period_end = Some(now + Duration::days(10));
    billing.set_subscriptions(
        "cus_1",
        vec![
            subscription("sub_1", SubscriptionStatus::Active),
            pending,
            subscription("sub_3", SubscriptionStatus::Canceled),
        ],
    );
    billing.set_payments("cus_1", vec![payment("LIFETIME", purchased)]);
    let records = vec![record("100", "member@example.com", true, None)];
    let engine = engine(billing, platform(), records);

    let status = engine.membership_status(&user("100")).await.expect("status should load");

    let standings: Vec<&str> = status.subscriptions.iter().map(|line| line.standing.as_str()).collect();
    assert_eq!(standings, vec!["Active", "Cancelled (not expired yet)", "Cancelled"]);
    assert_eq!(status.lifetime_since, Some(purchased));
    assert_eq!(status.record.email.as_deref(), Some("member@example.com"));
}

#[tokio::test]
async fn test_admin_override_grants_and_shields_from_sweep() {
    let billing = FakeBilling::new().with_customer("member@example.com", "cus_1");
    billing.set_subscriptions("cus_1", vec![subscription("sub_1", SubscriptionStatus::Canceled)]);
    let platform = platform().with_member(user("100"), roles(&[UNKNOWN]));
    let records = vec![record("100", "member@example.com", false, None)];
    let engine = engine(billing, platform, records);

    let applied = engine.set_admin_override(&user("100"), true).await.expect("override should apply");
    assert_eq!(applied.map(|outcome| outcome.mutations()), Some(2));

    let report = engine.run_sweep().await.unwrap();
    assert_eq!(report.examined, 0);
    assert_eq!(engine.platform().member(&user("100")).expect("member"), role_set(&[PAYING]));

    // Disabling leaves roles for the next sweep, which then revokes them.
    assert_eq!(engine.set_admin_override(&user("100"), false).await.unwrap(), None);
    assert_eq!(engine.platform().member(&user("100")).expect("member"), role_set(&[PAYING]));
    engine.run_sweep().await.unwrap();
    assert_eq!(engine.platform().member(&user("100")).expect("member"), role_set(&[UNKNOWN]));
}

#[tokio::test]
async fn test_concurrent_claim_and_override_keep_both_updates() {
    let billing = FakeBilling::new().with_customer("member@example.com", "cus_1");
    billing.set_subscriptions("cus_1", vec![subscription("sub_1", SubscriptionStatus::Active)]);
    let platform = platform().with_member(user("100"), roles(&[UNKNOWN]));
    let engine = engine(billing, platform, vec![]);
    let claimant = user("100");

    let (claim, override_result) = tokio::join!(
        engine.claim_subscription(&claimant, "member@example.com"),
        engine.set_admin_override(&claimant, true),
    );
    claim.expect("claim should succeed");
    override_result.expect("override should apply");

    let stored = engine.store().find_by_user(&claimant).await.unwrap().expect("record");
    assert_eq!(stored.email.as_deref(), Some("member@example.com"));
    assert!(stored.admin_access_override);
    assert!(stored.had_active_subscription);
    assert_eq!(engine.platform().member(&claimant).expect("member"), role_set(&[PAYING]));
}
