//! rotaweek: a cron-driven refresh agent for a personal 7-day work schedule.
//!
//! The agent keeps one week of shifts fresh: a tolerant 5-field cron dialect
//! decides when to refresh, each refresh fetches the current and next
//! schedule periods concurrently, and the merged result is cached so a
//! failed refresh can re-serve the last good week clearly labeled stale.
//!
//! # Architecture
//!
//! Independent pieces connected by an event channel:
//! - **Cron**: dialect parsing and timezone-aware next-run search (`cron`)
//! - **Scheduler**: one re-arming timer driving refresh cycles (`scheduler`)
//! - **Orchestrator**: fetch both periods, merge, stamp, cache, notify
//!   (`orchestrator`)
//! - **Fetcher**: the retrieval boundary; ships with a JSON feed client
//!   (`fetch`)
//! - **Week model**: date-keyed merge and 7-day framing (`week`)

pub mod config;
pub mod cron;
pub mod error;
pub mod fetch;
pub mod orchestrator;
pub mod paths;
pub mod scheduler;
pub mod week;

pub use config::{AgentConfig, FetchConfig};
pub use cron::{CronError, CronSpec, next_match};
pub use error::{Result, ScheduleError};
pub use fetch::{FetchedPeriod, HttpWeekFetcher, WeekFetcher};
pub use orchestrator::{
    RefreshFailure, RefreshOrchestrator, RefreshOutcome, RefreshReason, WeekEvent,
};
pub use scheduler::RefreshScheduler;
pub use week::{ShiftDay, WeekSchedule};
