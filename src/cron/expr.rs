//! Tolerant 5-field cron expression parsing.
//!
//! Tokens within a field are comma-separated and may be `*`, `*/step`, `N`,
//! `A-B`, or `A-B/step`. A malformed token contributes nothing; a field left
//! with no values at all is an error. This keeps a fat-fingered list like
//! `0,15,x,45` running on its valid entries instead of killing the schedule.

use std::collections::BTreeSet;

use super::CronError;

/// Name and inclusive bounds for one cron field.
struct FieldSpec {
    name: &'static str,
    min: u8,
    max: u8,
    /// Day-of-week accepts 7 as an alias for Sunday (0).
    sunday_alias: bool,
}

const MINUTE: FieldSpec = FieldSpec {
    name: "minute",
    min: 0,
    max: 59,
    sunday_alias: false,
};
const HOUR: FieldSpec = FieldSpec {
    name: "hour",
    min: 0,
    max: 23,
    sunday_alias: false,
};
const DAY_OF_MONTH: FieldSpec = FieldSpec {
    name: "day-of-month",
    min: 1,
    max: 31,
    sunday_alias: false,
};
const MONTH: FieldSpec = FieldSpec {
    name: "month",
    min: 1,
    max: 12,
    sunday_alias: false,
};
const DAY_OF_WEEK: FieldSpec = FieldSpec {
    name: "day-of-week",
    min: 0,
    max: 6,
    sunday_alias: true,
};

/// A parsed cron expression: the candidate value set for each field.
///
/// A minute matches when all five sets contain its respective component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSpec {
    /// Matching minutes (0-59).
    pub minutes: BTreeSet<u8>,
    /// Matching hours (0-23).
    pub hours: BTreeSet<u8>,
    /// Matching days of the month (1-31).
    pub days_of_month: BTreeSet<u8>,
    /// Matching months (1-12).
    pub months: BTreeSet<u8>,
    /// Matching days of the week (0-6, 0 = Sunday).
    pub days_of_week: BTreeSet<u8>,
}

impl CronSpec {
    /// Parse a 5-field cron expression.
    ///
    /// # Errors
    ///
    /// Returns [`CronError::FieldCount`] if the expression does not have
    /// exactly five whitespace-separated fields, or
    /// [`CronError::EmptyField`] for the first field (left to right) whose
    /// tokens all failed to produce a value.
    pub fn parse(expr: &str) -> Result<Self, CronError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronError::FieldCount(fields.len()));
        }
        Ok(Self {
            minutes: MINUTE.parse(fields[0])?,
            hours: HOUR.parse(fields[1])?,
            days_of_month: DAY_OF_MONTH.parse(fields[2])?,
            months: MONTH.parse(fields[3])?,
            days_of_week: DAY_OF_WEEK.parse(fields[4])?,
        })
    }
}

impl FieldSpec {
    /// Parse one comma-separated field into its candidate set.
    fn parse(&self, raw: &str) -> Result<BTreeSet<u8>, CronError> {
        let mut values = BTreeSet::new();
        for token in raw.split(',') {
            self.expand_token(token, &mut values);
        }
        if values.is_empty() {
            return Err(CronError::EmptyField(self.name));
        }
        Ok(values)
    }

    /// Expand a single token, inserting every valid value it denotes.
    /// Malformed tokens insert nothing.
    fn expand_token(&self, token: &str, out: &mut BTreeSet<u8>) {
        let (range, step) = match token.split_once('/') {
            Some((head, step_str)) => match step_str.parse::<i64>() {
                // Zero and negative steps behave as if no step were given.
                Ok(s) if s <= 0 => (head, 1),
                Ok(s) => (head, s as u64),
                Err(_) => return,
            },
            None => (token, 1),
        };

        let (lo, hi) = if range == "*" {
            (u64::from(self.min), u64::from(self.max))
        } else if let Some((a, b)) = range.split_once('-') {
            match (a.parse::<u64>(), b.parse::<u64>()) {
                (Ok(a), Ok(b)) => (a, b),
                _ => return,
            }
        } else {
            match range.parse::<u64>() {
                Ok(n) => (n, n),
                Err(_) => return,
            }
        };

        // Values above the field cap can never validate, so bound the scan.
        // Day-of-week must still reach 7 for the Sunday alias.
        let cap = if self.sunday_alias { 7 } else { self.max };
        let hi = hi.min(u64::from(cap));

        let mut v = lo;
        while v <= hi {
            self.insert_value(v, out);
            match v.checked_add(step) {
                Some(next) => v = next,
                None => break,
            }
        }
    }

    /// Range-check a candidate value and insert it if valid.
    fn insert_value(&self, value: u64, out: &mut BTreeSet<u8>) {
        // Day-of-week treats 7 as Sunday before the range check.
        let value = if self.sunday_alias && value == 7 {
            0
        } else {
            value
        };
        if value >= u64::from(self.min) && value <= u64::from(self.max) {
            out.insert(value as u8);
        }
    }
}
