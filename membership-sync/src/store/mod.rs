//! Customer-record persistence.
//!
//! A [`CustomerRecord`] is keyed by platform user id and holds the billing
//! email plus the engine's soft state. Records are created when a user links
//! an email and are never deleted by the engine.
//!
//! Emails are unique across records, compared case-insensitively;
//! [`CustomerStore::upsert`] rejects a record whose email belongs to another
//! user.

mod file;
mod memory;

#[allow(
    redundant_imports,
    reason = "Future needed for RPITIT despite being in Edition 2024 prelude"
)]
use std::future::Future;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
pub use file::JsonFileStore;
pub use memory::MemoryStore;
use serde::{Deserialize, Serialize};

use crate::{
    audit::redact_email,
    error::{Result, SyncError},
    ids::UserId,
    membership::ReminderStage,
};

/// Per-user membership metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRecord {
    /// Platform user id. Unique key.
    pub discord_user_id: UserId,
    /// Billing email, unique across records.
    #[serde(default)]
    pub email: Option<String>,
    /// Access state last computed by the engine.
    #[serde(default)]
    pub had_active_subscription: bool,
    /// Position in the expiry reminder countdown.
    #[serde(default)]
    pub reminder_stage: Option<ReminderStage>,
    /// Manually managed: the sweep and webhooks leave this user alone.
    #[serde(default)]
    pub admin_access_override: bool,
    /// Last write time.
    pub updated_at: DateTime<Utc>,
}

impl CustomerRecord {
    /// Fresh record with no email and all flags cleared.
    #[must_use]
    pub fn new(user: UserId) -> Self {
        Self {
            discord_user_id: user,
            email: None,
            had_active_subscription: false,
            reminder_stage: None,
            admin_access_override: false,
            updated_at: Utc::now(),
        }
    }

    /// Sets the email.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    fn apply(&mut self, patch: &CustomerPatch) {
        if let Some(had) = patch.had_active_subscription {
            self.had_active_subscription = had;
        }
        if let Some(stage) = patch.reminder_stage {
            self.reminder_stage = stage;
        }
        if let Some(enabled) = patch.admin_access_override {
            self.admin_access_override = enabled;
        }
        self.updated_at = Utc::now();
    }
}

/// Partial update of a record's flags. `None` fields are left unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CustomerPatch {
    /// New access flag.
    pub had_active_subscription: Option<bool>,
    /// New reminder stage; `Some(None)` clears it.
    pub reminder_stage: Option<Option<ReminderStage>>,
    /// New override flag.
    pub admin_access_override: Option<bool>,
}

impl CustomerPatch {
    /// Patch setting the access flag and clearing the reminder stage, as every
    /// state transition does.
    #[must_use]
    pub fn access(had_active_subscription: bool) -> Self {
        Self {
            had_active_subscription: Some(had_active_subscription),
            reminder_stage: Some(None),
            admin_access_override: None,
        }
    }

    /// Patch setting only the reminder stage.
    #[must_use]
    pub fn reminder(stage: ReminderStage) -> Self {
        Self { reminder_stage: Some(Some(stage)), ..Self::default() }
    }
}

/// Which records [`CustomerStore::load_customer_records`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordFilter {
    /// Only records with a non-empty email.
    pub require_email: bool,
    /// Include records with the admin override set.
    pub include_admin_override: bool,
}

impl RecordFilter {
    /// Every record.
    pub const ALL: Self = Self { require_email: false, include_admin_override: true };

    /// Records the sweep reconciles: with email, without override.
    pub const SWEEP: Self = Self { require_email: true, include_admin_override: false };

    /// Returns `true` if `record` passes the filter.
    #[must_use]
    pub fn matches(&self, record: &CustomerRecord) -> bool {
        let has_email = record.email.as_deref().is_some_and(|email| !email.trim().is_empty());
        (!self.require_email || has_email)
            && (self.include_admin_override || !record.admin_access_override)
    }
}

/// Keyed record store.
pub trait CustomerStore: Send + Sync {
    /// Records passing `filter`, ordered by user id.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be read.
    fn load_customer_records(
        &self,
        filter: RecordFilter,
    ) -> impl Future<Output = Result<Vec<CustomerRecord>>> + Send + '_;

    /// Record of `user`, if any.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be read.
    fn find_by_user<'a>(
        &'a self,
        user: &'a UserId,
    ) -> impl Future<Output = Result<Option<CustomerRecord>>> + Send + 'a;

    /// Record owning `email` (case-insensitive), if any.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be read.
    fn find_by_email<'a>(
        &'a self,
        email: &'a str,
    ) -> impl Future<Output = Result<Option<CustomerRecord>>> + Send + 'a;

    /// Inserts or replaces the record of `record.discord_user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::EmailInUse`] if another user's record holds the
    /// same email, or an error if the store cannot be written.
    fn upsert(&self, record: CustomerRecord) -> impl Future<Output = Result<()>> + Send + '_;

    /// Applies `patch` to the record of `user`.
    ///
    /// Returns the updated record, or `None` if `user` has no record.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be written.
    fn update_customer_record<'a>(
        &'a self,
        user: &'a UserId,
        patch: CustomerPatch,
    ) -> impl Future<Output = Result<Option<CustomerRecord>>> + Send + 'a;
}

/// In-memory record map shared by the store implementations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RecordMap {
    records: BTreeMap<UserId, CustomerRecord>,
}

impl RecordMap {
    pub(crate) fn from_records(records: Vec<CustomerRecord>) -> Result<Self> {
        let mut map = Self::default();
        for record in records {
            map.upsert(record)?;
        }
        Ok(map)
    }

    pub(crate) fn records(&self) -> impl Iterator<Item = &CustomerRecord> {
        self.records.values()
    }

    pub(crate) fn filtered(&self, filter: RecordFilter) -> Vec<CustomerRecord> {
        self.records.values().filter(|record| filter.matches(record)).cloned().collect()
    }

    pub(crate) fn get(&self, user: &UserId) -> Option<CustomerRecord> {
        self.records.get(user).cloned()
    }

    pub(crate) fn find_by_email(&self, email: &str) -> Option<CustomerRecord> {
        self.records
            .values()
            .find(|record| {
                record.email.as_deref().is_some_and(|owned| owned.eq_ignore_ascii_case(email))
            })
            .cloned()
    }

    pub(crate) fn upsert(&mut self, mut record: CustomerRecord) -> Result<()> {
        if let Some(email) = record.email.as_deref()
            && let Some(owner) = self.find_by_email(email)
            && owner.discord_user_id != record.discord_user_id
        {
            return Err(SyncError::EmailInUse(redact_email(email)));
        }
        record.updated_at = Utc::now();
        self.records.insert(record.discord_user_id.clone(), record);
        Ok(())
    }

    pub(crate) fn update(&mut self, user: &UserId, patch: &CustomerPatch) -> Option<CustomerRecord> {
        let record = self.records.get_mut(user)?;
        record.apply(patch);
        Some(record.clone())
    }
}
