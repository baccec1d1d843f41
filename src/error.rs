//! Error types for the rotaweek agent.

/// Top-level error type for the refresh agent.
///
/// Cron errors are not a variant: [`CronError`] values never propagate as
/// results, they surface as scheduling-failure notification text (see the
/// scheduler).
///
/// [`CronError`]: crate::cron::CronError
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    /// Unknown or malformed IANA timezone name.
    #[error("timezone error: {0}")]
    Timezone(String),

    /// Schedule feed fetch error (transport, status, or decode).
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ScheduleError>;
