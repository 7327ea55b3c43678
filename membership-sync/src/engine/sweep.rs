//! The periodic reconciliation pass.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::MembershipEngine;
use crate::{
    audit::{AuditEvent, AuditEventType, audit_log, redact_email},
    billing::BillingApi,
    error::Result,
    ids::UserId,
    membership::{ReminderAction, next_reminder_action},
    notify::{Notice, Notifier, NotifyTarget},
    platform::GroupPlatform,
    roles::RoleClassification,
    store::{CustomerPatch, CustomerStore, RecordFilter},
};

/// Result of reconciling one user during a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserOutcome {
    /// The record changed since the sweep loaded it and no longer qualifies.
    Skipped,
    /// The email matched no billing customer. Nothing was changed.
    Unresolved,
    /// Access confirmed.
    Active {
        /// Role mutations issued.
        mutations: usize,
    },
    /// Access removed or confirmed absent.
    Inactive {
        /// Role mutations issued.
        mutations: usize,
        /// Reminder step taken.
        action: ReminderAction,
    },
}

/// Counters of one sweep run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Correlation id of the run.
    pub run_id: Uuid,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// End time.
    pub finished_at: DateTime<Utc>,
    /// Records examined.
    pub examined: usize,
    /// Users found active.
    pub active: usize,
    /// Users found inactive.
    pub inactive: usize,
    /// Users whose email matched no customer.
    pub unresolved: usize,
    /// Expiry reminders sent.
    pub reminders_sent: usize,
    /// Countdowns finished.
    pub expired: usize,
    /// Records skipped because they changed mid-run.
    pub skipped: usize,
    /// Users whose reconciliation failed; retried next run.
    pub failed: usize,
    /// Role mutations issued across all users.
    pub role_mutations: usize,
}

impl SweepReport {
    fn start() -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            examined: 0,
            active: 0,
            inactive: 0,
            unresolved: 0,
            reminders_sent: 0,
            expired: 0,
            skipped: 0,
            failed: 0,
            role_mutations: 0,
        }
    }

    fn record(&mut self, outcome: UserOutcome) {
        match outcome {
            UserOutcome::Skipped => self.skipped += 1,
            UserOutcome::Unresolved => self.unresolved += 1,
            UserOutcome::Active { mutations } => {
                self.active += 1;
                self.role_mutations += mutations;
            }
            UserOutcome::Inactive { mutations, action } => {
                self.inactive += 1;
                self.role_mutations += mutations;
                match action {
                    ReminderAction::Warn { .. } => self.reminders_sent += 1,
                    ReminderAction::Expire => self.expired += 1,
                    ReminderAction::None => {}
                }
            }
        }
    }

    /// One-line summary for logs.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "examined={} active={} inactive={} unresolved={} reminders={} expired={} skipped={} \
             failed={} mutations={}",
            self.examined,
            self.active,
            self.inactive,
            self.unresolved,
            self.reminders_sent,
            self.expired,
            self.skipped,
            self.failed,
            self.role_mutations
        )
    }
}

impl<B, P, S, N> MembershipEngine<B, P, S, N>
where
    B: BillingApi,
    P: GroupPlatform,
    S: CustomerStore,
    N: Notifier,
{
    /// Reconciles every linked user without an admin override.
    ///
    /// Users are processed one at a time; billing calls are rate limited
    /// anyway. A failure for one user is logged and counted, and the sweep
    /// moves on. Users found inactive lose their roles at once; the reminder
    /// countdown only decides which notice to send.
    ///
    /// # Errors
    ///
    /// Returns error only if the records or the server's roles cannot be
    /// loaded at the start of the run.
    #[instrument(skip(self), level = "info")]
    pub async fn run_sweep(&self) -> Result<SweepReport> {
        let mut report = SweepReport::start();
        audit_log(&AuditEvent::new(AuditEventType::SweepStarted, "*", report.run_id));

        let records = self.store.load_customer_records(RecordFilter::SWEEP).await?;
        let classification = self.classification().await?;
        info!(run_id = %report.run_id, records = records.len(), "Sweep started");

        for record in records {
            let user = record.discord_user_id;
            report.examined += 1;
            match self.reconcile_user(&user, &classification, report.run_id).await {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        user = %user,
                        error = %e,
                        transient = e.is_transient(),
                        "Reconciliation failed, retrying next sweep"
                    );
                }
            }
        }

        report.finished_at = Utc::now();
        audit_log(
            &AuditEvent::new(AuditEventType::SweepCompleted, "*", report.run_id)
                .with_note(report.summary()),
        );
        info!(run_id = %report.run_id, summary = %report.summary(), "Sweep completed");
        Ok(report)
    }

    async fn reconcile_user(
        &self,
        user: &UserId,
        classification: &RoleClassification,
        run_id: Uuid,
    ) -> Result<UserOutcome> {
        let _guard = self.locks.acquire(user).await;

        // Re-read under the lock: a command may have changed the record.
        let Some(record) = self.store.find_by_user(user).await? else {
            return Ok(UserOutcome::Skipped);
        };
        if !RecordFilter::SWEEP.matches(&record) {
            return Ok(UserOutcome::Skipped);
        }
        let Some(email) = record.email.as_deref() else {
            return Ok(UserOutcome::Skipped);
        };

        let Some(customer) = self.billing.resolve_identity(email).await? else {
            let redacted = redact_email(email);
            info!(user = %user, email = %redacted, "No billing customer for email, skipping");
            audit_log(
                &AuditEvent::new(AuditEventType::IdentityUnresolved, user.as_str(), run_id)
                    .with_email(&redacted),
            );
            return Ok(UserOutcome::Unresolved);
        };

        let snapshot = self.billing.snapshot(&customer).await?;
        let verdict = snapshot.evaluate(Utc::now(), self.lifetime_keyword());
        let decision = verdict.decision();

        let outcome = self.apply_with(user, &decision, classification, run_id).await?;
        if let Some(diff) = outcome.diff()
            && !diff.is_empty()
        {
            let line = Notice::applied(Utc::now(), user, decision.state, diff, &decision.reason);
            self.notifier.notify(NotifyTarget::LogChannel, &line).await;
        }
        let mutations = outcome.mutations();

        if verdict.is_active {
            if !record.had_active_subscription || record.reminder_stage.is_some() {
                self.store.update_customer_record(user, CustomerPatch::access(true)).await?;
            }
            return Ok(UserOutcome::Active { mutations });
        }

        let action = next_reminder_action(
            record.reminder_stage,
            record.had_active_subscription,
            verdict.unpaid,
        );
        let payment_link = self.settings.payment_link.clone();
        match action {
            ReminderAction::None => {}
            ReminderAction::Warn { stage, hours_left } => {
                let notice = Notice::ExpiryReminder { hours_left, payment_link };
                self.notifier.notify(NotifyTarget::User(user.clone()), &notice).await;
                self.store.update_customer_record(user, CustomerPatch::reminder(stage)).await?;
                audit_log(
                    &AuditEvent::new(AuditEventType::ReminderSent, user.as_str(), run_id)
                        .with_note(format!("{hours_left}h")),
                );
            }
            ReminderAction::Expire => {
                let notice = Notice::Expired { payment_link };
                self.notifier.notify(NotifyTarget::User(user.clone()), &notice).await;
                self.store.update_customer_record(user, CustomerPatch::access(false)).await?;
                self.notifier.notify(NotifyTarget::LogChannel, &Notice::expired_log(user)).await;
                audit_log(
                    &AuditEvent::new(AuditEventType::MembershipExpired, user.as_str(), run_id)
                        .with_reason(decision.reason.as_str()),
                );
            }
        }
        Ok(UserOutcome::Inactive { mutations, action })
    }
}
