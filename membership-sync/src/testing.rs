//! In-memory collaborator fakes.
//!
//! Available to this crate's tests and, with the `test-util` feature, to
//! downstream crates. Every fake records what it was asked to do so tests can
//! assert on exact call sequences.

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::{Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Utc};

use crate::{
    billing::{BillingApi, Charge, ListEnvelope, Payment, Subscription, SubscriptionStatus},
    error::{Result, SyncError},
    ids::{CustomerId, GuildId, RoleId, SubscriptionId, UserId},
    notify::{Notice, Notifier, NotifyTarget},
    platform::GroupPlatform,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Subscription with the given status and no period information.
///
/// # Panics
///
/// Panics if `id` is not a valid subscription id.
#[must_use]
pub fn subscription(id: &str, status: SubscriptionStatus) -> Subscription {
    Subscription {
        id: SubscriptionId::new(id).expect("valid subscription id"),
        status,
        cancel_at: None,
        current_period_end: None,
        items: ListEnvelope::default(),
    }
}

/// Payment holding one charge.
#[must_use]
pub fn payment(description: &str, created: DateTime<Utc>) -> Payment {
    Payment {
        charges: ListEnvelope {
            data: vec![Charge { description: Some(description.to_owned()), created }],
            has_more: false,
        },
    }
}

#[derive(Debug, Default)]
struct BillingState {
    customers: HashMap<String, CustomerId>,
    emails: HashMap<CustomerId, String>,
    subscriptions: HashMap<CustomerId, Vec<Subscription>>,
    payments: HashMap<CustomerId, Vec<Payment>>,
    outage: bool,
    calls: Vec<String>,
    cancelled: Vec<SubscriptionId>,
}

/// Fake billing provider.
#[derive(Debug, Default)]
pub struct FakeBilling {
    state: Mutex<BillingState>,
}

impl FakeBilling {
    /// Provider with no customers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a customer owning `email`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a valid customer id.
    #[must_use]
    pub fn with_customer(self, email: &str, id: &str) -> Self {
        let customer = CustomerId::new(id).expect("valid customer id");
        {
            let mut state = lock(&self.state);
            state.customers.insert(email.to_ascii_lowercase(), customer.clone());
            state.emails.insert(customer, email.to_owned());
        }
        self
    }

    /// Replaces the subscriptions of `customer`.
    ///
    /// # Panics
    ///
    /// Panics if `customer` is not a valid customer id.
    pub fn set_subscriptions(&self, customer: &str, subscriptions: Vec<Subscription>) {
        let customer = CustomerId::new(customer).expect("valid customer id");
        lock(&self.state).subscriptions.insert(customer, subscriptions);
    }

    /// Replaces the payments of `customer`.
    ///
    /// # Panics
    ///
    /// Panics if `customer` is not a valid customer id.
    pub fn set_payments(&self, customer: &str, payments: Vec<Payment>) {
        let customer = CustomerId::new(customer).expect("valid customer id");
        lock(&self.state).payments.insert(customer, payments);
    }

    /// Makes every call fail with a transient error while `outage` is set.
    pub fn set_outage(&self, outage: bool) {
        lock(&self.state).outage = outage;
    }

    /// Calls made so far, as `method:argument`.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    /// Subscriptions cancelled so far.
    #[must_use]
    pub fn cancelled(&self) -> Vec<SubscriptionId> {
        lock(&self.state).cancelled.clone()
    }

    fn begin(&self, call: String) -> Result<MutexGuard<'_, BillingState>> {
        let mut state = lock(&self.state);
        state.calls.push(call);
        if state.outage {
            return Err(SyncError::BillingResponse("service unavailable".to_owned()));
        }
        Ok(state)
    }
}

impl BillingApi for FakeBilling {
    async fn resolve_identity<'a>(&'a self, email: &'a str) -> Result<Option<CustomerId>> {
        let state = self.begin(format!("resolve_identity:{email}"))?;
        Ok(state.customers.get(&email.to_ascii_lowercase()).cloned())
    }

    async fn list_subscriptions<'a>(&'a self, customer: &'a CustomerId) -> Result<Vec<Subscription>> {
        let state = self.begin(format!("list_subscriptions:{customer}"))?;
        Ok(state.subscriptions.get(customer).cloned().unwrap_or_default())
    }

    async fn list_payments<'a>(&'a self, customer: &'a CustomerId) -> Result<Vec<Payment>> {
        let state = self.begin(format!("list_payments:{customer}"))?;
        Ok(state.payments.get(customer).cloned().unwrap_or_default())
    }

    async fn cancel_subscription<'a>(&'a self, subscription: &'a SubscriptionId) -> Result<()> {
        let mut state = self.begin(format!("cancel_subscription:{subscription}"))?;
        for sub in state.subscriptions.values_mut().flatten() {
            if sub.id == *subscription {
                sub.status = SubscriptionStatus::Canceled;
                sub.cancel_at = None;
            }
        }
        state.cancelled.push(subscription.clone());
        Ok(())
    }

    async fn customer_email<'a>(&'a self, customer: &'a CustomerId) -> Result<Option<String>> {
        let state = self.begin(format!("customer_email:{customer}"))?;
        Ok(state.emails.get(customer).cloned())
    }
}

/// A role mutation observed by [`FakePlatform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Role added.
    Add(UserId, RoleId),
    /// Role removed.
    Remove(UserId, RoleId),
}

#[derive(Debug, Default)]
struct PlatformState {
    server_roles: Vec<RoleId>,
    members: HashMap<UserId, BTreeSet<RoleId>>,
    mutations: Vec<Mutation>,
    refused: HashSet<RoleId>,
}

/// Fake group platform holding one server.
#[derive(Debug)]
pub struct FakePlatform {
    guild: GuildId,
    state: Mutex<PlatformState>,
}

impl FakePlatform {
    /// Server `guild` defining `server_roles`.
    #[must_use]
    pub fn new(guild: GuildId, server_roles: Vec<RoleId>) -> Self {
        let state = PlatformState { server_roles, ..PlatformState::default() };
        Self { guild, state: Mutex::new(state) }
    }

    /// Adds a member holding `roles`.
    #[must_use]
    pub fn with_member(self, user: UserId, roles: impl IntoIterator<Item = RoleId>) -> Self {
        lock(&self.state).members.insert(user, roles.into_iter().collect());
        self
    }

    /// Current roles of `user`.
    #[must_use]
    pub fn member(&self, user: &UserId) -> Option<BTreeSet<RoleId>> {
        lock(&self.state).members.get(user).cloned()
    }

    /// Mutations issued so far.
    #[must_use]
    pub fn mutations(&self) -> Vec<Mutation> {
        lock(&self.state).mutations.clone()
    }

    /// Forgets recorded mutations.
    pub fn clear_mutations(&self) {
        lock(&self.state).mutations.clear();
    }

    /// Makes every mutation of `role` fail as a permission error.
    pub fn refuse_role(&self, role: RoleId) {
        lock(&self.state).refused.insert(role);
    }

    fn mutate(&self, user: &UserId, role: &RoleId, add: bool) -> Result<()> {
        let mut state = lock(&self.state);
        if state.refused.contains(role) {
            return Err(SyncError::RoleMutation {
                user_id: user.to_string(),
                role_id: role.to_string(),
                message: "Missing Permissions".to_owned(),
            });
        }
        let Some(roles) = state.members.get_mut(user) else {
            return Err(SyncError::Platform("Unknown Member".to_owned()));
        };
        if add {
            roles.insert(role.clone());
            state.mutations.push(Mutation::Add(user.clone(), role.clone()));
        } else {
            roles.remove(role);
            state.mutations.push(Mutation::Remove(user.clone(), role.clone()));
        }
        Ok(())
    }
}

impl GroupPlatform for FakePlatform {
    fn guild_id(&self) -> &GuildId {
        &self.guild
    }

    async fn server_roles(&self) -> Result<Vec<RoleId>> {
        Ok(lock(&self.state).server_roles.clone())
    }

    async fn member_roles<'a>(&'a self, user: &'a UserId) -> Result<Option<BTreeSet<RoleId>>> {
        Ok(self.member(user))
    }

    async fn add_role<'a>(&'a self, user: &'a UserId, role: &'a RoleId, _reason: &'a str) -> Result<()> {
        self.mutate(user, role, true)
    }

    async fn remove_role<'a>(&'a self, user: &'a UserId, role: &'a RoleId, _reason: &'a str) -> Result<()> {
        self.mutate(user, role, false)
    }
}

/// Notifier that keeps every notice.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(NotifyTarget, Notice)>>,
}

impl RecordingNotifier {
    /// Empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<(NotifyTarget, Notice)> {
        lock(&self.sent).clone()
    }

    /// Notices sent to `user`.
    #[must_use]
    pub fn to_user(&self, user: &UserId) -> Vec<Notice> {
        lock(&self.sent)
            .iter()
            .filter(|(target, _)| matches!(target, NotifyTarget::User(to) if to == user))
            .map(|(_, notice)| notice.clone())
            .collect()
    }

    /// Bodies of the lines posted to the log channel.
    #[must_use]
    pub fn log_lines(&self) -> Vec<String> {
        lock(&self.sent)
            .iter()
            .filter(|(target, _)| *target == NotifyTarget::LogChannel)
            .map(|(_, notice)| notice.body())
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    async fn notify<'a>(&'a self, target: NotifyTarget, notice: &'a Notice) {
        lock(&self.sent).push((target, notice.clone()));
    }
}
