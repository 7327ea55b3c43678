//! Minimal role mutations between a current and a target role set.

use std::collections::BTreeSet;

use serde::Serialize;

use super::ManagedRoles;
use crate::ids::RoleId;

/// Additions and removals restricted to managed roles.
///
/// Both lists follow slot order (Paying, Lifetime, Unknown).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoleDiff {
    /// Roles to add, applied first.
    pub to_add: Vec<RoleId>,
    /// Roles to remove, applied after every addition.
    pub to_remove: Vec<RoleId>,
}

impl RoleDiff {
    /// Returns `true` when nothing needs to change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// Number of mutation calls the diff needs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.to_add.len() + self.to_remove.len()
    }

    /// Formats the diff as `+[a,b] -[c]` for log lines.
    #[must_use]
    pub fn summary(&self) -> String {
        let join = |roles: &[RoleId]| {
            roles.iter().map(RoleId::as_str).collect::<Vec<_>>().join(",")
        };
        format!("+[{}] -[{}]", join(&self.to_add), join(&self.to_remove))
    }
}

/// Computes the mutations that turn `current` into `target` on managed roles.
///
/// `to_add` is `target ∩ managed - current`, `to_remove` is
/// `current ∩ managed - target`. Roles outside `managed` never appear in the
/// result, whatever `current` and `target` contain.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeSet;
///
/// use membership_sync::{
///     ids::RoleId,
///     roles::{ManagedRoles, diff},
/// };
///
/// let role = |id: &str| RoleId::new(id).unwrap();
/// let managed = ManagedRoles::new(Some(role("10")), Some(role("20")), Some(role("30")));
/// let current = BTreeSet::from([role("30"), role("40")]);
/// let target = BTreeSet::from([role("10")]);
///
/// let result = diff(&current, &target, &managed);
///
/// assert_eq!(result.to_add, vec![role("10")]);
/// assert_eq!(result.to_remove, vec![role("30")]);
/// ```
#[must_use]
pub fn diff(
    current: &BTreeSet<RoleId>,
    target: &BTreeSet<RoleId>,
    managed: &ManagedRoles,
) -> RoleDiff {
    let to_add = managed
        .iter()
        .filter(|role| target.contains(*role) && !current.contains(*role))
        .cloned()
        .collect();
    let to_remove = managed
        .iter()
        .filter(|role| current.contains(*role) && !target.contains(*role))
        .cloned()
        .collect();

    RoleDiff { to_add, to_remove }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(id: &str) -> RoleId {
        RoleId::new(id).unwrap()
    }

    fn managed() -> ManagedRoles {
        ManagedRoles::new(Some(role("10")), Some(role("20")), Some(role("30")))
    }

    fn set(ids: &[&str]) -> BTreeSet<RoleId> {
        ids.iter().map(|id| role(id)).collect()
    }

    #[test]
    fn test_no_change() {
        let result = diff(&set(&["10", "99"]), &set(&["10"]), &managed());
        assert!(result.is_empty());
        assert_eq!(result.len(), 0);
    }

    #[test]
    fn test_removals_follow_slot_order() {
        let result = diff(&set(&["30", "20", "10"]), &set(&[]), &managed());
        assert_eq!(result.to_remove, vec![role("10"), role("20"), role("30")]);
    }

    #[test]
    fn test_target_outside_managed_is_ignored() {
        let result = diff(&set(&[]), &set(&["99"]), &managed());
        assert!(result.is_empty());
    }

    #[test]
    fn test_unconfigured_slot_is_noop() {
        let managed = ManagedRoles::new(Some(role("10")), None, None);
        let result = diff(&set(&["20", "30"]), &set(&["10", "20"]), &managed);
        assert_eq!(result.to_add, vec![role("10")]);
        assert!(result.to_remove.is_empty());
    }

    #[test]
    fn test_shared_slot_id_is_added_once() {
        let managed = ManagedRoles::new(Some(role("10")), Some(role("10")), None);
        let result = diff(&set(&[]), &set(&["10"]), &managed);
        assert_eq!(result.to_add, vec![role("10")]);
    }

    #[test]
    fn test_summary_format() {
        let result = RoleDiff { to_add: vec![role("30")], to_remove: vec![role("10"), role("20")] };
        assert_eq!(result.summary(), "+[30] -[10,20]");
        assert_eq!(RoleDiff::default().summary(), "+[] -[]");
    }
}
