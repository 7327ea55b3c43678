//! State transitions for a single user.

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::MembershipEngine;
use crate::{
    audit::{AuditEvent, AuditEventType, audit_log},
    billing::BillingApi,
    error::{Result, SyncError},
    ids::UserId,
    membership::{MembershipDecision, MembershipState, plan_transition},
    notify::{Notice, Notifier, NotifyTarget},
    platform::GroupPlatform,
    roles::{RoleClassification, RoleDiff},
    store::{CustomerPatch, CustomerStore},
};

/// What a transition did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The diff was applied. It may be empty.
    Applied(RoleDiff),
    /// The user is not a member of the server; nothing was changed.
    MemberAbsent,
}

impl ApplyOutcome {
    /// The applied diff, `None` when the member was absent.
    #[must_use]
    pub fn diff(&self) -> Option<&RoleDiff> {
        match self {
            Self::Applied(diff) => Some(diff),
            Self::MemberAbsent => None,
        }
    }

    /// Number of role mutations issued by the transition.
    #[must_use]
    pub fn mutations(&self) -> usize {
        self.diff().map_or(0, RoleDiff::len)
    }
}

impl<B, P, S, N> MembershipEngine<B, P, S, N>
where
    B: BillingApi,
    P: GroupPlatform,
    S: CustomerStore,
    N: Notifier,
{
    /// Applies `decision` to `user` right away.
    ///
    /// Serialized with every other call for the same user. An Active
    /// transition persists the access flag and clears any reminder stage. An
    /// Inactive one leaves the record alone so the sweep's reminder countdown
    /// still runs for users who had access. The applied diff is posted to the
    /// log channel.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::RoleMutation`] if the platform refuses a role
    /// change. Remaining mutations are skipped; the next apply converges.
    /// Other collaborator errors are returned unchanged.
    #[instrument(skip(self, user, decision), fields(user = %user, state = %decision.state), level = "debug")]
    pub async fn apply_membership_state(
        &self,
        user: &UserId,
        decision: &MembershipDecision,
    ) -> Result<ApplyOutcome> {
        let _guard = self.locks.acquire(user).await;
        let patch = (decision.state == MembershipState::Active).then(|| CustomerPatch::access(true));
        self.apply_locked(user, decision, patch).await
    }

    /// Applies `decision`, then writes `patch` to the user's record.
    ///
    /// The caller holds the user's lock.
    pub(crate) async fn apply_locked(
        &self,
        user: &UserId,
        decision: &MembershipDecision,
        patch: Option<CustomerPatch>,
    ) -> Result<ApplyOutcome> {
        let correlation = Uuid::new_v4();
        let classification = self.classification().await?;
        let outcome = self.apply_with(user, decision, &classification, correlation).await?;

        if let Some(patch) = patch
            && self.store.update_customer_record(user, patch).await?.is_none()
        {
            debug!("No customer record to update");
        }

        if let ApplyOutcome::Applied(diff) = &outcome {
            let line = Notice::applied(Utc::now(), user, decision.state, diff, &decision.reason);
            self.notifier.notify(NotifyTarget::LogChannel, &line).await;
        }
        Ok(outcome)
    }

    /// Runs one transition: fetch roles, diff, add, then remove.
    ///
    /// The caller holds the user's lock.
    pub(crate) async fn apply_with(
        &self,
        user: &UserId,
        decision: &MembershipDecision,
        classification: &RoleClassification,
        correlation: Uuid,
    ) -> Result<ApplyOutcome> {
        let Some(current) = self.platform.member_roles(user).await? else {
            info!(user = %user, "User is not a member of the server, skipping");
            return Ok(ApplyOutcome::MemberAbsent);
        };

        let diff = plan_transition(decision, &current, classification);
        for role in &diff.to_add {
            if let Err(e) = self.platform.add_role(user, role, &decision.reason).await {
                return Err(self.mutation_failed(user, decision, correlation, e).await);
            }
        }
        for role in &diff.to_remove {
            if let Err(e) = self.platform.remove_role(user, role, &decision.reason).await {
                return Err(self.mutation_failed(user, decision, correlation, e).await);
            }
        }

        if decision.state == MembershipState::Active && !diff.is_empty() {
            self.remove_leftover_unknown(user, classification).await;
        }

        let event_type = match decision.state {
            MembershipState::Active => AuditEventType::MembershipActivated,
            MembershipState::Inactive => AuditEventType::MembershipDeactivated,
        };
        audit_log(
            &AuditEvent::new(event_type, user.as_str(), correlation)
                .with_diff(&diff)
                .with_reason(decision.reason.as_str()),
        );
        Ok(ApplyOutcome::Applied(diff))
    }

    async fn mutation_failed(
        &self,
        user: &UserId,
        decision: &MembershipDecision,
        correlation: Uuid,
        error: SyncError,
    ) -> SyncError {
        let message = match &error {
            SyncError::RoleMutation { message, .. } => message.clone(),
            other => other.to_string(),
        };
        warn!(user = %user, error = %error, "Role mutation failed");

        self.notifier
            .notify(NotifyTarget::LogChannel, &Notice::mutation_failed(user, &message))
            .await;
        audit_log(
            &AuditEvent::new(AuditEventType::RoleMutationFailed, user.as_str(), correlation)
                .with_reason(decision.reason.as_str())
                .with_error(message),
        );
        error
    }

    /// Best-effort removal of an Unknown role still visible after an Active
    /// transition.
    async fn remove_leftover_unknown(&self, user: &UserId, classification: &RoleClassification) {
        let Some(unknown) = classification.managed().unknown() else {
            return;
        };
        match self.platform.member_roles(user).await {
            Ok(Some(roles)) if roles.contains(unknown) => {
                if let Err(e) = self.platform.remove_role(user, unknown, "membership active").await {
                    warn!(user = %user, error = %e, "Corrective Unknown removal failed");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(user = %user, error = %e, "Could not re-read roles after apply"),
        }
    }
}
