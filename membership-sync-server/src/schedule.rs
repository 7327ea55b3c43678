//! Daily sweep timing.

use chrono::{DateTime, Duration, NaiveTime, Utc};

/// Next instant strictly after `from` at `hour:00:00` UTC.
///
/// Hours above 23 are clamped to 23; configuration validation rejects them
/// before they get here.
#[must_use]
pub fn next_daily_run(from: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let at = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let today = from.date_naive().and_time(at).and_utc();
    if today > from { today } else { today + Duration::days(1) }
}

/// Time to wait from `now` until the next run, never negative.
#[must_use]
pub fn until_next_run(now: DateTime<Utc>, hour: u32) -> std::time::Duration {
    (next_daily_run(now, hour) - now).to_std().unwrap_or_default()
}
