//! The membership reconciliation engine.
//!
//! [`MembershipEngine`] ties the collaborators together. It offers three entry
//! points that share one transition routine:
//!
//! - [`apply_membership_state`](MembershipEngine::apply_membership_state):
//!   immediate single-user apply for commands and webhooks
//! - [`run_sweep`](MembershipEngine::run_sweep): the periodic pass over every
//!   linked user, driving the reminder countdown
//! - the command and webhook operations built on top of both
//!
//! Calls for the same user are serialized; calls for different users run
//! concurrently. Every apply recomputes its diff from the roles observed at
//! that moment, so repeated or overlapping calls converge.

mod apply;
mod locks;
mod sweep;

pub use apply::ApplyOutcome;
pub use sweep::{SweepReport, UserOutcome};

use tokio::sync::OwnedMutexGuard;

use crate::{
    billing::BillingApi,
    config::SyncConfig,
    error::Result,
    ids::UserId,
    notify::Notifier,
    platform::GroupPlatform,
    roles::{RoleClassification, RoleConfig, classify},
    store::CustomerStore,
};

/// Engine settings that do not belong to a collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineSettings {
    /// Configured role ids.
    pub roles: RoleConfig,
    /// Marker identifying lifetime purchases; `None` disables detection.
    pub lifetime_keyword: Option<String>,
    /// Renewal link included in reminders.
    pub payment_link: Option<String>,
}

impl EngineSettings {
    /// Extracts engine settings from the service configuration.
    #[must_use]
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            roles: config.roles.clone(),
            lifetime_keyword: config.billing.lifetime_keyword().map(str::to_owned),
            payment_link: config.billing.payment_link.clone(),
        }
    }
}

/// Reconciles platform roles with billing state.
#[derive(Debug)]
pub struct MembershipEngine<B, P, S, N> {
    billing: B,
    platform: P,
    store: S,
    notifier: N,
    settings: EngineSettings,
    locks: locks::UserLocks,
}

impl<B, P, S, N> MembershipEngine<B, P, S, N>
where
    B: BillingApi,
    P: GroupPlatform,
    S: CustomerStore,
    N: Notifier,
{
    /// Creates an engine over the given collaborators.
    #[must_use]
    pub fn new(billing: B, platform: P, store: S, notifier: N, settings: EngineSettings) -> Self {
        Self { billing, platform, store, notifier, settings, locks: locks::UserLocks::default() }
    }

    /// Billing collaborator.
    pub fn billing(&self) -> &B {
        &self.billing
    }

    /// Group-platform collaborator.
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Record store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Notification collaborator.
    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Engine settings.
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Classifies the server's current roles against configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the server's roles cannot be listed.
    pub async fn classification(&self) -> Result<RoleClassification> {
        let server_roles = self.platform.server_roles().await?;
        let classification = classify(self.platform.guild_id(), &server_roles, &self.settings.roles);

        let stale = [&self.settings.roles.paying, &self.settings.roles.lifetime, &self.settings.roles.unknown]
            .into_iter()
            .flatten()
            .filter(|role| !classification.managed().contains(role))
            .count();
        if stale > 0 {
            tracing::warn!(stale, "Configured managed roles missing on the server are ignored");
        }
        Ok(classification)
    }

    /// Exclusive access to `user` for read-modify-write sequences.
    pub(crate) async fn lock_user(&self, user: &UserId) -> OwnedMutexGuard<()> {
        self.locks.acquire(user).await
    }

    pub(crate) fn lifetime_keyword(&self) -> Option<&str> {
        self.settings.lifetime_keyword.as_deref()
    }
}
