//! Week schedule data model, date-keyed merging, and calendar anchors.

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Placeholder shift text for days with no upstream row.
pub const EMPTY_LABEL: &str = "—";

/// One day of the schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftDay {
    /// ISO `YYYY-MM-DD` calendar-date key.
    pub date: String,
    /// Short weekday label (`Mon`..`Sun`).
    pub weekday: String,
    /// Shift text as published upstream.
    pub label: String,
    /// Whether the shift text denotes a day off.
    pub is_off: bool,
}

/// A refreshed 7-day schedule with freshness metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeekSchedule {
    /// Exactly seven days, Monday first.
    pub days: Vec<ShiftDay>,
    /// Monday of the covered week.
    pub week_start: NaiveDate,
    /// URL of the current-period fetch that produced this schedule.
    pub source_url: String,
    /// Completion time of the successful refresh, in the configured
    /// timezone.
    pub updated_at: chrono::DateTime<chrono::FixedOffset>,
    /// `false` when this is a cached copy re-served after a failed refresh.
    pub fresh: bool,
    /// Rows returned by the current-period fetch.
    pub source_rows: usize,
    /// Frame entries backed by upstream rows rather than placeholder fill.
    pub week_rows: usize,
}

/// Merge two day sequences into one, keyed by date.
///
/// Overlay entries win on duplicate dates. Entries with an empty date key
/// are dropped. The result is ascending by date key; ISO keys make that
/// chronological.
pub fn merge_days(primary: Vec<ShiftDay>, overlay: Vec<ShiftDay>) -> Vec<ShiftDay> {
    let mut by_date: BTreeMap<String, ShiftDay> = BTreeMap::new();
    for day in primary.into_iter().chain(overlay) {
        if day.date.is_empty() {
            continue;
        }
        by_date.insert(day.date.clone(), day);
    }
    by_date.into_values().collect()
}

/// The Monday of `date`'s week.
pub fn monday_of(date: NaiveDate) -> NaiveDate {
    let back = u64::from(date.weekday().num_days_from_monday());
    date.checked_sub_days(Days::new(back)).unwrap_or(date)
}

/// The first day of the month after `date`'s month.
pub fn first_of_next_month(date: NaiveDate) -> NaiveDate {
    let first = date.with_day(1).unwrap_or(date);
    first.checked_add_months(Months::new(1)).unwrap_or(first)
}

/// Frame `days` into exactly seven entries starting at `week_start`.
///
/// Days with no upstream row become placeholders labeled [`EMPTY_LABEL`];
/// days outside the frame are ignored.
pub fn week_frame(days: &[ShiftDay], week_start: NaiveDate) -> Vec<ShiftDay> {
    let by_date: BTreeMap<&str, &ShiftDay> =
        days.iter().map(|d| (d.date.as_str(), d)).collect();

    (0..7)
        .map(|offset| {
            let date = week_start
                .checked_add_days(Days::new(offset))
                .unwrap_or(week_start);
            let iso = date.format("%Y-%m-%d").to_string();
            if let Some(day) = by_date.get(iso.as_str()) {
                (*day).clone()
            } else {
                ShiftDay {
                    date: iso,
                    weekday: date.format("%a").to_string(),
                    label: EMPTY_LABEL.to_owned(),
                    is_off: false,
                }
            }
        })
        .collect()
}
