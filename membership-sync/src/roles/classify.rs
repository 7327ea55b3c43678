//! Partitioning of a server's roles into managed, keep and unmanaged.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ids::{GuildId, RoleId};

/// Configured role ids, as read from configuration.
///
/// Every entry is optional. An absent managed role turns the matching
/// mutation into a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleConfig {
    /// Role granted to users with an active subscription.
    #[serde(default)]
    pub paying: Option<RoleId>,
    /// Role granted to users with a lifetime purchase.
    #[serde(default)]
    pub lifetime: Option<RoleId>,
    /// Role given to users without access.
    #[serde(default)]
    pub unknown: Option<RoleId>,
    /// Roles the engine must never touch (staff, moderators).
    #[serde(default)]
    pub keep: Vec<RoleId>,
}

/// The roles the engine may add or remove, by slot.
///
/// Iteration always yields Paying, Lifetime, Unknown in that order, which is
/// what makes diffs deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagedRoles {
    paying: Option<RoleId>,
    lifetime: Option<RoleId>,
    unknown: Option<RoleId>,
}

impl ManagedRoles {
    /// Creates a managed set from explicit slots.
    ///
    /// A role can fill only one slot: a slot repeating an earlier slot's id is
    /// left empty, so Paying wins over Lifetime and both win over Unknown.
    #[must_use]
    pub fn new(paying: Option<RoleId>, lifetime: Option<RoleId>, unknown: Option<RoleId>) -> Self {
        let lifetime = lifetime.filter(|role| paying.as_ref() != Some(role));
        let unknown =
            unknown.filter(|role| paying.as_ref() != Some(role) && lifetime.as_ref() != Some(role));
        Self { paying, lifetime, unknown }
    }

    /// Paying role, if configured and present.
    #[must_use]
    pub fn paying(&self) -> Option<&RoleId> {
        self.paying.as_ref()
    }

    /// Lifetime role, if configured and present.
    #[must_use]
    pub fn lifetime(&self) -> Option<&RoleId> {
        self.lifetime.as_ref()
    }

    /// Unknown role, if configured and present.
    #[must_use]
    pub fn unknown(&self) -> Option<&RoleId> {
        self.unknown.as_ref()
    }

    /// Iterates the configured slots in Paying, Lifetime, Unknown order.
    pub fn iter(&self) -> impl Iterator<Item = &RoleId> {
        [&self.paying, &self.lifetime, &self.unknown].into_iter().flatten()
    }

    /// Returns `true` if `role` occupies any slot.
    #[must_use]
    pub fn contains(&self, role: &RoleId) -> bool {
        self.iter().any(|managed| managed == role)
    }

    /// Returns `true` when no slot is filled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

/// Category of a single role on a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleCategory {
    /// Paying, Lifetime or Unknown: the engine adds and removes these.
    Managed,
    /// Explicitly protected.
    Keep,
    /// Everything else, including the implicit "everyone" role.
    Unmanaged,
}

/// Result of [`classify`].
///
/// Holds only ids that exist on the server. `managed` and `keep` are
/// disjoint; managed wins when configuration lists a role in both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleClassification {
    managed: ManagedRoles,
    keep: BTreeSet<RoleId>,
}

impl RoleClassification {
    /// Managed roles present on the server.
    #[must_use]
    pub fn managed(&self) -> &ManagedRoles {
        &self.managed
    }

    /// Protected roles present on the server, managed ids excluded.
    #[must_use]
    pub fn keep(&self) -> &BTreeSet<RoleId> {
        &self.keep
    }

    /// Returns the category of `role`.
    #[must_use]
    pub fn category(&self, role: &RoleId) -> RoleCategory {
        if self.managed.contains(role) {
            RoleCategory::Managed
        } else if self.keep.contains(role) {
            RoleCategory::Keep
        } else {
            RoleCategory::Unmanaged
        }
    }
}

/// Classifies a server's roles against the configured ids.
///
/// Configured ids that do not exist on the server are dropped, as is the
/// server's "everyone" role (whose id equals the guild id). Any keep id that
/// is also managed is removed from keep.
///
/// # Examples
///
/// ```
/// use membership_sync::{
///     ids::{GuildId, RoleId},
///     roles::{RoleCategory, RoleConfig, classify},
/// };
///
/// let role = |id: &str| RoleId::new(id).unwrap();
/// let guild = GuildId::new("1").unwrap();
/// let config = RoleConfig {
///     paying: Some(role("10")),
///     lifetime: None,
///     unknown: Some(role("30")),
///     keep: vec![role("10"), role("40")],
/// };
///
/// let classification = classify(&guild, &[role("10"), role("30"), role("40")], &config);
///
/// assert_eq!(classification.category(&role("10")), RoleCategory::Managed);
/// assert_eq!(classification.category(&role("40")), RoleCategory::Keep);
/// assert_eq!(classification.category(&role("99")), RoleCategory::Unmanaged);
/// ```
#[must_use]
pub fn classify(guild: &GuildId, server_roles: &[RoleId], config: &RoleConfig) -> RoleClassification {
    let exists = |role: &&RoleId| {
        role.as_str() != guild.as_str() && server_roles.iter().any(|present| present == *role)
    };
    let slot = |configured: &Option<RoleId>| configured.as_ref().filter(exists).cloned();

    let managed = ManagedRoles::new(
        slot(&config.paying),
        slot(&config.lifetime),
        slot(&config.unknown),
    );
    let keep = config
        .keep
        .iter()
        .filter(exists)
        .filter(|role| !managed.contains(role))
        .cloned()
        .collect();

    RoleClassification { managed, keep }
}
