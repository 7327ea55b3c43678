//! Role classification and diffing.
//!
//! The engine only ever touches three roles (Paying, Lifetime, Unknown). This
//! module decides which ids those are on a given server and computes the
//! add/remove lists that move a user between target role sets. Mutations are
//! always additive or subtractive; roles outside the managed set survive every
//! transition untouched.

mod classify;
mod diff;

pub use classify::{ManagedRoles, RoleCategory, RoleClassification, RoleConfig, classify};
pub use diff::{RoleDiff, diff};
