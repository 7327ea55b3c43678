//! Shared fixtures: one server with Paying (10), Lifetime (20), Unknown (30),
//! a protected Staff role (40) and an unrelated role (50).

#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::collections::BTreeSet;

use membership_sync::{
    engine::{EngineSettings, MembershipEngine},
    ids::{GuildId, RoleId, UserId},
    membership::ReminderStage,
    roles::RoleConfig,
    store::{CustomerRecord, MemoryStore},
    testing::{FakeBilling, FakePlatform, RecordingNotifier},
};

pub type TestEngine = MembershipEngine<FakeBilling, FakePlatform, MemoryStore, RecordingNotifier>;

pub const GUILD: &str = "1";
pub const PAYING: &str = "10";
pub const LIFETIME: &str = "20";
pub const UNKNOWN: &str = "30";
pub const STAFF: &str = "40";
pub const EXTRA: &str = "50";

pub const LIFETIME_KEYWORD: &str = "LIFETIME";
pub const PAYMENT_LINK: &str = "https://buy.example.com/renew";

pub fn role(id: &str) -> RoleId {
    RoleId::new(id).expect("valid role id")
}

pub fn user(id: &str) -> UserId {
    UserId::new(id).expect("valid user id")
}

pub fn roles(ids: &[&str]) -> Vec<RoleId> {
    ids.iter().map(|id| role(id)).collect()
}

pub fn settings() -> EngineSettings {
    EngineSettings {
        roles: RoleConfig {
            paying: Some(role(PAYING)),
            lifetime: Some(role(LIFETIME)),
            unknown: Some(role(UNKNOWN)),
            keep: vec![role(STAFF)],
        },
        lifetime_keyword: Some(LIFETIME_KEYWORD.to_owned()),
        payment_link: Some(PAYMENT_LINK.to_owned()),
    }
}

pub fn platform() -> FakePlatform {
    FakePlatform::new(
        GuildId::new(GUILD).expect("valid guild id"),
        roles(&[GUILD, PAYING, LIFETIME, UNKNOWN, STAFF, EXTRA]),
    )
}

/// Linked record with the given flags.
pub fn record(id: &str, email: &str, had_active: bool, stage: Option<ReminderStage>) -> CustomerRecord {
    let mut record = CustomerRecord::new(user(id)).with_email(email);
    record.had_active_subscription = had_active;
    record.reminder_stage = stage;
    record
}

pub fn engine(billing: FakeBilling, platform: FakePlatform, records: Vec<CustomerRecord>) -> TestEngine {
    MembershipEngine::new(
        billing,
        platform,
        MemoryStore::with_records(records).expect("distinct emails"),
        RecordingNotifier::new(),
        settings(),
    )
}

pub fn role_set(ids: &[&str]) -> BTreeSet<RoleId> {
    ids.iter().map(|id| role(id)).collect()
}
