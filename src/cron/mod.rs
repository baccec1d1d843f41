//! Cron expression parsing and next-run computation.
//!
//! Implements the agent's 5-field cron dialect (`minute hour day-of-month
//! month day-of-week`) with tolerant token handling, and a timezone-aware
//! minute-resolution search for the next matching instant.

pub mod expr;
pub mod next_run;

pub use expr::CronSpec;
pub use next_run::next_match;

/// Errors from cron parsing and next-run computation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CronError {
    /// The expression did not have exactly five whitespace-separated fields.
    #[error("expected 5 cron fields, found {0}")]
    FieldCount(usize),

    /// Every token in the named field was malformed or out of range.
    #[error("cron field `{0}` has no valid values")]
    EmptyField(&'static str),

    /// No matching minute within the scan window.
    #[error("no matching run time within 60 days")]
    NoMatch,
}
