//! Validated identifiers used across the crate.
//!
//! Platform ids (guilds, users, roles, channels) are decimal snowflakes and
//! billing ids are prefixed tokens such as `cus_...` or `sub_...`. Both fit the
//! same rule: 1-64 characters, ASCII alphanumeric plus `-` and `_`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

const MAX_ID_LEN: usize = 64;

fn validate(kind: &str, id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(SyncError::InvalidId(format!("{kind} cannot be empty")));
    }
    if id.len() > MAX_ID_LEN {
        return Err(SyncError::InvalidId(format!(
            "{kind} must be {MAX_ID_LEN} characters or less"
        )));
    }
    if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(SyncError::InvalidId(format!(
            "{kind} can only contain alphanumeric characters, hyphens, and underscores"
        )));
    }
    Ok(())
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates the id after validation.
            ///
            /// # Errors
            ///
            /// Returns [`SyncError::InvalidId`] if the id is empty, longer than
            /// 64 characters, or contains characters other than ASCII
            /// alphanumerics, `-` and `_`.
            pub fn new<S: Into<String>>(id: S) -> Result<Self> {
                let id = id.into();
                validate($kind, &id)?;
                Ok(Self(id))
            }

            /// Returns the id as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = SyncError;

            fn try_from(value: String) -> Result<Self> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

define_id!(
    /// Group-platform server (guild) id. Also the id of the server's implicit
    /// "everyone" role.
    GuildId,
    "guild_id"
);
define_id!(
    /// Group-platform user id; the key of a customer record.
    UserId,
    "user_id"
);
define_id!(
    /// Group-platform role id.
    RoleId,
    "role_id"
);
define_id!(
    /// Group-platform text channel id.
    ChannelId,
    "channel_id"
);
define_id!(
    /// Billing-provider customer id.
    CustomerId,
    "customer_id"
);
define_id!(
    /// Billing-provider subscription id.
    SubscriptionId,
    "subscription_id"
);
