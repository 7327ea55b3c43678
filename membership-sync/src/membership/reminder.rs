//! Expiry reminder countdown for users who lost access.
//!
//! ```text
//! None ──> Warned48h (2) ──> Warned24h (1) ──> Expired (0) ──> None
//!   └──────────────[unpaid]────────────────────────┘
//! ```
//!
//! Roles are removed as soon as a user is found inactive; the countdown only
//! paces the notices. Finding the user active resets the stage to `None`.

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Position in the reminder countdown. Stored as its numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ReminderStage {
    /// Final notice sent.
    Expired = 0,
    /// 24-hour notice sent.
    Warned24h = 1,
    /// 48-hour notice sent.
    Warned48h = 2,
}

impl TryFrom<u8> for ReminderStage {
    type Error = SyncError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Expired),
            1 => Ok(Self::Warned24h),
            2 => Ok(Self::Warned48h),
            other => Err(SyncError::Store(format!("invalid reminder stage {other}"))),
        }
    }
}

impl From<ReminderStage> for u8 {
    fn from(stage: ReminderStage) -> Self {
        stage as Self
    }
}

/// What the sweep should do for an inactive user this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderAction {
    /// Nothing to send.
    None,
    /// Send an expiry reminder and persist `stage`.
    Warn {
        /// Stage to persist after sending.
        stage: ReminderStage,
        /// Hours left, shown in the notice.
        hours_left: u32,
    },
    /// Send the final notice, clear the access flag and reset the stage.
    Expire,
}

/// Next countdown step for a user found inactive.
///
/// Users who never had access get no notices. An `unpaid` subscription skips
/// straight to [`ReminderAction::Expire`].
///
/// # Examples
///
/// ```
/// use membership_sync::membership::{ReminderAction, ReminderStage, next_reminder_action};
///
/// assert_eq!(
///     next_reminder_action(None, true, false),
///     ReminderAction::Warn { stage: ReminderStage::Warned48h, hours_left: 48 }
/// );
/// assert_eq!(next_reminder_action(None, true, true), ReminderAction::Expire);
/// assert_eq!(next_reminder_action(None, false, false), ReminderAction::None);
/// ```
#[must_use]
pub fn next_reminder_action(
    stage: Option<ReminderStage>,
    had_active_subscription: bool,
    unpaid: bool,
) -> ReminderAction {
    if !had_active_subscription {
        return ReminderAction::None;
    }
    if unpaid {
        return ReminderAction::Expire;
    }
    match stage {
        None => ReminderAction::Warn { stage: ReminderStage::Warned48h, hours_left: 48 },
        Some(ReminderStage::Warned48h) => {
            ReminderAction::Warn { stage: ReminderStage::Warned24h, hours_left: 24 }
        }
        Some(ReminderStage::Warned24h | ReminderStage::Expired) => ReminderAction::Expire,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_countdown_sequence() {
        assert_eq!(
            next_reminder_action(Some(ReminderStage::Warned48h), true, false),
            ReminderAction::Warn { stage: ReminderStage::Warned24h, hours_left: 24 }
        );
        assert_eq!(
            next_reminder_action(Some(ReminderStage::Warned24h), true, false),
            ReminderAction::Expire
        );
    }

    #[test]
    fn test_unpaid_short_circuits_from_any_stage() {
        for stage in [None, Some(ReminderStage::Warned48h), Some(ReminderStage::Warned24h)] {
            assert_eq!(next_reminder_action(stage, true, true), ReminderAction::Expire);
        }
    }

    #[test]
    fn test_no_history_no_notice() {
        assert_eq!(next_reminder_action(Some(ReminderStage::Warned48h), false, true), ReminderAction::None);
    }

    #[test]
    fn test_stage_serializes_as_number() {
        assert_eq!(serde_json::to_string(&ReminderStage::Warned48h).unwrap(), "2");
        assert_eq!(serde_json::from_str::<ReminderStage>("0").unwrap(), ReminderStage::Expired);
        assert!(serde_json::from_str::<ReminderStage>("3").is_err());
        assert_eq!(
            serde_json::from_str::<Option<ReminderStage>>("null").unwrap(),
            None
        );
    }

    #[test]
    fn test_stages_only_move_down() {
        let mut stage = None;
        let mut seen = Vec::new();
        while let ReminderAction::Warn { stage: next, .. } = next_reminder_action(stage, true, false) {
            if let Some(previous) = stage {
                assert!(next < previous);
            }
            seen.push(next);
            stage = Some(next);
        }
        assert_eq!(seen, vec![ReminderStage::Warned48h, ReminderStage::Warned24h]);
    }
}
