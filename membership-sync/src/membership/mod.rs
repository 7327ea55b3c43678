//! Membership states and the transitions between them.
//!
//! A user is either [`MembershipState::Active`] (Paying, plus Lifetime when
//! granted) or [`MembershipState::Inactive`] (Unknown only). The target role
//! set is a pure function of the decision and the roles the user already
//! holds; [`plan_transition`] turns it into a [`RoleDiff`].
//!
//! # Lifetime stickiness
//!
//! Once a user holds the Lifetime role, an Active decision keeps it even when
//! the decision does not grant it. Only an Inactive decision removes it.
//!
//! # Examples
//!
//! ```
//! use std::collections::BTreeSet;
//!
//! use membership_sync::{
//!     ids::{GuildId, RoleId},
//!     membership::{MembershipDecision, plan_transition},
//!     roles::{RoleConfig, classify},
//! };
//!
//! let role = |id: &str| RoleId::new(id).unwrap();
//! let config = RoleConfig {
//!     paying: Some(role("10")),
//!     lifetime: Some(role("20")),
//!     unknown: Some(role("30")),
//!     keep: vec![role("40")],
//! };
//! let server = [role("10"), role("20"), role("30"), role("40")];
//! let classification = classify(&GuildId::new("1").unwrap(), &server, &config);
//!
//! let current = BTreeSet::from([role("30"), role("40")]);
//! let diff = plan_transition(&MembershipDecision::active(false, "claim"), &current, &classification);
//!
//! assert_eq!(diff.to_add, vec![role("10")]);
//! assert_eq!(diff.to_remove, vec![role("30")]);
//! ```

mod reminder;

use std::{collections::BTreeSet, fmt};

pub use reminder::{ReminderAction, ReminderStage, next_reminder_action};
use serde::{Deserialize, Serialize};

use crate::{
    ids::RoleId,
    roles::{ManagedRoles, RoleClassification, RoleDiff, diff},
};

/// Top-level access state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipState {
    /// The user has paid access.
    Active,
    /// The user has no access.
    Inactive,
}

impl fmt::Display for MembershipState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => f.write_str("ACTIVE"),
            Self::Inactive => f.write_str("INACTIVE"),
        }
    }
}

/// Decision to move a user into a state. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MembershipDecision {
    /// Target state.
    pub state: MembershipState,
    /// Grant the Lifetime role. Ignored for [`MembershipState::Inactive`].
    pub assign_lifetime: bool,
    /// Free-text reason, forwarded to the platform's audit log.
    pub reason: String,
}

impl MembershipDecision {
    /// Decision to make the user Active.
    #[must_use]
    #[allow(
        clippy::impl_trait_in_params,
        reason = "impl Into<String> is idiomatic for constructors"
    )]
    pub fn active(assign_lifetime: bool, reason: impl Into<String>) -> Self {
        Self { state: MembershipState::Active, assign_lifetime, reason: reason.into() }
    }

    /// Decision to make the user Inactive.
    #[must_use]
    #[allow(
        clippy::impl_trait_in_params,
        reason = "impl Into<String> is idiomatic for constructors"
    )]
    pub fn inactive(reason: impl Into<String>) -> Self {
        Self { state: MembershipState::Inactive, assign_lifetime: false, reason: reason.into() }
    }
}

/// Managed roles the user should hold after `decision`.
///
/// Active yields Paying, plus Lifetime when granted or already held. Inactive
/// yields Unknown only. Unconfigured slots are simply absent.
#[must_use]
pub fn target_roles(
    decision: &MembershipDecision,
    current: &BTreeSet<RoleId>,
    managed: &ManagedRoles,
) -> BTreeSet<RoleId> {
    let mut target = BTreeSet::new();
    match decision.state {
        MembershipState::Active => {
            target.extend(managed.paying().cloned());
            if let Some(lifetime) = managed.lifetime()
                && (decision.assign_lifetime || current.contains(lifetime))
            {
                target.insert(lifetime.clone());
            }
        }
        MembershipState::Inactive => {
            target.extend(managed.unknown().cloned());
        }
    }
    target
}

/// Role mutations that apply `decision` to a user holding `current`.
#[must_use]
pub fn plan_transition(
    decision: &MembershipDecision,
    current: &BTreeSet<RoleId>,
    classification: &RoleClassification,
) -> RoleDiff {
    let managed = classification.managed();
    diff(current, &target_roles(decision, current, managed), managed)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::{
        ids::GuildId,
        roles::{RoleConfig, classify},
    };

    fn role(id: &str) -> RoleId {
        RoleId::new(id).unwrap()
    }

    fn set(ids: &[&str]) -> BTreeSet<RoleId> {
        ids.iter().map(|id| role(id)).collect()
    }

    fn classification() -> RoleClassification {
        let config = RoleConfig {
            paying: Some(role("10")),
            lifetime: Some(role("20")),
            unknown: Some(role("30")),
            keep: vec![role("40")],
        };
        let server = [role("10"), role("20"), role("30"), role("40"), role("50")];
        classify(&GuildId::new("1").unwrap(), &server, &config)
    }

    #[test]
    fn test_inactive_never_keeps_paying_sharing_unknown_id() {
        let config = RoleConfig {
            paying: Some(role("10")),
            lifetime: None,
            unknown: Some(role("10")),
            keep: vec![],
        };
        let classification = classify(&GuildId::new("1").unwrap(), &[role("10")], &config);

        let diff = plan_transition(&MembershipDecision::inactive("lapsed"), &set(&["10"]), &classification);

        assert!(diff.to_add.is_empty());
        assert_eq!(diff.to_remove, vec![role("10")]);
    }

    #[test]
    fn test_unknown_to_active() {
        let diff = plan_transition(
            &MembershipDecision::active(false, "claim"),
            &set(&["30", "40"]),
            &classification(),
        );
        assert_eq!(diff.to_add, vec![role("10")]);
        assert_eq!(diff.to_remove, vec![role("30")]);
    }

    #[test]
    fn test_active_to_inactive_wipes_paying_and_lifetime() {
        let diff = plan_transition(
            &MembershipDecision::inactive("expired"),
            &set(&["10", "20", "50"]),
            &classification(),
        );
        assert_eq!(diff.to_add, vec![role("30")]);
        assert_eq!(diff.to_remove, vec![role("10"), role("20")]);
    }

    #[test]
    fn test_lifetime_grant() {
        let diff = plan_transition(
            &MembershipDecision::active(true, "lifetime purchase"),
            &set(&["30"]),
            &classification(),
        );
        assert_eq!(diff.to_add, vec![role("10"), role("20")]);
        assert_eq!(diff.to_remove, vec![role("30")]);
    }

    #[test]
    fn test_lifetime_is_sticky_while_active() {
        let diff = plan_transition(
            &MembershipDecision::active(false, "renewal"),
            &set(&["10", "20"]),
            &classification(),
        );
        assert!(diff.is_empty());
    }

    #[test]
    fn test_inactive_without_unknown_role_configured() {
        let config = RoleConfig { paying: Some(role("10")), ..RoleConfig::default() };
        let classification = classify(&GuildId::new("1").unwrap(), &[role("10")], &config);

        let diff = plan_transition(&MembershipDecision::inactive("x"), &set(&["10"]), &classification);

        assert!(diff.to_add.is_empty());
        assert_eq!(diff.to_remove, vec![role("10")]);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(MembershipState::Active.to_string(), "ACTIVE");
        assert_eq!(MembershipState::Inactive.to_string(), "INACTIVE");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn active_never_removes_held_lifetime(
            extra in prop::collection::btree_set(2u32..60, 0..8),
            assign in any::<bool>(),
        ) {
            let mut current: BTreeSet<RoleId> =
                extra.iter().map(|n| RoleId::new(n.to_string()).unwrap()).collect();
            current.insert(role("20"));

            let diff = plan_transition(
                &MembershipDecision::active(assign, "sweep"),
                &current,
                &classification(),
            );

            prop_assert!(!diff.to_remove.contains(&role("20")));
        }

        #[test]
        fn second_apply_is_empty(
            held in prop::collection::btree_set(prop::sample::select(vec!["10", "20", "30", "40", "50"]), 0..5),
            active in any::<bool>(),
            assign in any::<bool>(),
        ) {
            let decision = if active {
                MembershipDecision::active(assign, "sweep")
            } else {
                MembershipDecision::inactive("sweep")
            };
            let classification = classification();
            let mut current: BTreeSet<RoleId> = held.iter().map(|id| role(id)).collect();

            let first = plan_transition(&decision, &current, &classification);
            current.extend(first.to_add.iter().cloned());
            for role in &first.to_remove {
                current.remove(role);
            }

            prop_assert!(plan_transition(&decision, &current, &classification).is_empty());
            prop_assert!(current.contains(&role("40")) == held.contains("40"));
        }
    }
}
