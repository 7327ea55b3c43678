//! Group-platform collaborator: role enumeration and per-user role mutation.
//!
//! The engine never replaces a user's role list wholesale. It only adds or
//! removes single roles, so roles it does not manage cannot be lost.

mod discord;

#[allow(
    redundant_imports,
    reason = "Future needed for RPITIT despite being in Edition 2024 prelude"
)]
use std::future::Future;
use std::collections::BTreeSet;

pub use discord::DiscordClient;

use crate::{
    error::Result,
    ids::{GuildId, RoleId, UserId},
};

/// Role operations on one server.
pub trait GroupPlatform: Send + Sync {
    /// Server this platform handle operates on.
    fn guild_id(&self) -> &GuildId;

    /// Every role defined on the server.
    ///
    /// # Errors
    ///
    /// Returns error if the platform cannot be reached.
    fn server_roles(&self) -> impl Future<Output = Result<Vec<RoleId>>> + Send + '_;

    /// Roles currently held by `user`, or `None` if the user is not a member.
    ///
    /// # Errors
    ///
    /// Returns error if the platform cannot be reached.
    fn member_roles<'a>(
        &'a self,
        user: &'a UserId,
    ) -> impl Future<Output = Result<Option<BTreeSet<RoleId>>>> + Send + 'a;

    /// Adds one role to `user`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::SyncError::RoleMutation`] if the platform
    /// refuses the change.
    fn add_role<'a>(
        &'a self,
        user: &'a UserId,
        role: &'a RoleId,
        reason: &'a str,
    ) -> impl Future<Output = Result<()>> + Send + 'a;

    /// Removes one role from `user`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::SyncError::RoleMutation`] if the platform
    /// refuses the change.
    fn remove_role<'a>(
        &'a self,
        user: &'a UserId,
        role: &'a RoleId,
        reason: &'a str,
    ) -> impl Future<Output = Result<()>> + Send + 'a;
}
