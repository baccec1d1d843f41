//! Timezone-aware next-run computation for parsed cron expressions.

use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;

use super::{CronError, CronSpec};

/// Upper bound on the minute-by-minute scan: 60 days.
const MAX_SCAN_MINUTES: i64 = 60 * 24 * 60;

/// Find the first minute at or after `from` that matches `spec` in `tz`.
///
/// `from` is truncated to the start of its minute before matching, so an
/// instant already inside a matching minute returns that minute (which may
/// be slightly in the past).
///
/// # Errors
///
/// Returns [`CronError::NoMatch`] when no minute within 60 days matches,
/// e.g. for an impossible day/month combination like `0 0 31 2 *`.
pub fn next_match(
    spec: &CronSpec,
    tz: Tz,
    from: DateTime<Utc>,
) -> Result<DateTime<Tz>, CronError> {
    // Truncate on the epoch timeline. Truncating wall-clock fields instead
    // could land on a local time that does not exist across a DST gap.
    let start = from.timestamp().div_euclid(60) * 60;

    for i in 0..MAX_SCAN_MINUTES {
        let Some(utc) = DateTime::from_timestamp(start + i * 60, 0) else {
            continue;
        };
        let candidate = utc.with_timezone(&tz);
        if matches_minute(spec, &candidate) {
            return Ok(candidate);
        }
    }

    Err(CronError::NoMatch)
}

/// Whether all five field sets contain the candidate minute's components.
fn matches_minute(spec: &CronSpec, t: &DateTime<Tz>) -> bool {
    // Cron numbers weekdays 0-6 from Sunday; chrono provides that directly.
    let weekday = t.weekday().num_days_from_sunday() as u8;
    spec.minutes.contains(&(t.minute() as u8))
        && spec.hours.contains(&(t.hour() as u8))
        && spec.days_of_month.contains(&(t.day() as u8))
        && spec.months.contains(&(t.month() as u8))
        && spec.days_of_week.contains(&weekday)
}
