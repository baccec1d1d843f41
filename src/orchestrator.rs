//! Refresh orchestration: fetch both periods, merge, stamp, cache, notify.
//!
//! One [`RefreshOrchestrator`] owns the refresh lifecycle. Each cycle
//! fetches the current and next schedule periods concurrently,
//! all-or-nothing: if either side fails, the cached last-good week is
//! re-served clearly labeled stale instead of guessing at a partial merge.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::fetch::WeekFetcher;
use crate::week::{self, EMPTY_LABEL, WeekSchedule};

/// Reason string attached to scheduling failures, which are not refresh
/// cycles and so carry no [`RefreshReason`].
pub const SCHEDULE_FAILURE_REASON: &str = "cron-parse";

/// What triggered a refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    /// First cycle right after the agent starts.
    Startup,
    /// Operator-requested refresh.
    Manual,
    /// Cron timer fire.
    Cron,
}

impl RefreshReason {
    /// Stable string form used in notifications and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Manual => "manual",
            Self::Cron => "cron",
        }
    }
}

impl std::fmt::Display for RefreshReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure details carried by error notifications and failed outcomes.
#[derive(Debug, Clone)]
pub struct RefreshFailure {
    /// The trigger of the failed cycle, or [`SCHEDULE_FAILURE_REASON`].
    pub reason: String,
    /// Raw error text.
    pub error: String,
    /// Stale-marked copy of the cached week, when one exists.
    pub last_good: Option<WeekSchedule>,
}

/// Outcome of one refresh cycle.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// Both periods fetched; the cache was replaced.
    Success(WeekSchedule),
    /// At least one fetch failed; the cache is untouched.
    Failure(RefreshFailure),
    /// Another cycle was already in flight; nothing ran.
    Skipped,
}

/// Notification emitted to consumers.
#[derive(Debug, Clone)]
pub enum WeekEvent {
    /// A week schedule: fresh after success, stale-marked after failure.
    Data(WeekSchedule),
    /// A refresh or scheduling failure.
    Error(RefreshFailure),
}

/// Orchestrates refresh cycles against the schedule feed.
///
/// All state lives here: the active config, the last-good cache, and the
/// in-flight guard. Consumers listen on the event channel supplied at
/// construction.
pub struct RefreshOrchestrator {
    config: Mutex<AgentConfig>,
    fetcher: Arc<dyn WeekFetcher>,
    last_good: Mutex<Option<WeekSchedule>>,
    in_flight: AtomicBool,
    event_tx: mpsc::UnboundedSender<WeekEvent>,
}

impl RefreshOrchestrator {
    /// Create an orchestrator emitting [`WeekEvent`]s on `event_tx`.
    pub fn new(
        config: AgentConfig,
        fetcher: Arc<dyn WeekFetcher>,
        event_tx: mpsc::UnboundedSender<WeekEvent>,
    ) -> Self {
        Self {
            config: Mutex::new(config),
            fetcher,
            last_good: Mutex::new(None),
            in_flight: AtomicBool::new(false),
            event_tx,
        }
    }

    /// Replace the active configuration for subsequent cycles.
    pub fn set_config(&self, config: AgentConfig) {
        match self.config.lock() {
            Ok(mut guard) => *guard = config,
            Err(poisoned) => *poisoned.into_inner() = config,
        }
    }

    /// The cached last-good week, if any.
    #[must_use]
    pub fn last_good(&self) -> Option<WeekSchedule> {
        match self.last_good.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Run one refresh cycle.
    ///
    /// Re-entrant calls are absorbed: if a cycle is already in flight the
    /// call returns [`RefreshOutcome::Skipped`] without fetching.
    pub async fn run_cycle(&self, reason: RefreshReason) -> RefreshOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(%reason, "refresh already in flight, skipping");
            return RefreshOutcome::Skipped;
        }

        let outcome = self.cycle(reason).await;
        self.in_flight.store(false, Ordering::SeqCst);
        outcome
    }

    /// Run a manual refresh cycle now.
    pub async fn refresh_now(&self) -> RefreshOutcome {
        self.run_cycle(RefreshReason::Manual).await
    }

    /// Emit a scheduling failure notification.
    ///
    /// Used by the scheduler when the configured cron expression cannot be
    /// parsed or yields no future run. The cache is attached unchanged:
    /// no refresh failed, so its freshness claim still holds.
    pub fn emit_schedule_failure(&self, error: String) {
        warn!(%error, "refresh scheduling failed");
        self.emit(WeekEvent::Error(RefreshFailure {
            reason: SCHEDULE_FAILURE_REASON.to_owned(),
            error,
            last_good: self.last_good(),
        }));
    }

    async fn cycle(&self, reason: RefreshReason) -> RefreshOutcome {
        let config = self.config_snapshot();
        info!(%reason, "refresh cycle started");

        let tz = match config.tz() {
            Ok(tz) => tz,
            Err(e) => return self.fail(reason, e.to_string()),
        };

        let today = Utc::now().with_timezone(&tz).date_naive();
        let week_start = week::monday_of(today);
        let next_anchor = week::first_of_next_month(today);

        let (current, next) = tokio::join!(
            self.fetcher.fetch_period(today, true),
            self.fetcher.fetch_period(next_anchor, false),
        );

        let (current, next) = match (current, next) {
            (Ok(current), Ok(next)) => (current, next),
            (current, next) => {
                let errors: Vec<String> = [current.err(), next.err()]
                    .into_iter()
                    .flatten()
                    .map(|e| e.to_string())
                    .collect();
                return self.fail(reason, errors.join("; "));
            }
        };

        let merged = week::merge_days(current.days, next.days);
        let days = week::week_frame(&merged, week_start);
        let week_rows = days.iter().filter(|d| d.label != EMPTY_LABEL).count();

        let schedule = WeekSchedule {
            days,
            week_start,
            source_url: current.source_url,
            // Stamped after both fetches have landed: the time of the
            // success itself, not of the attempt.
            updated_at: Utc::now().with_timezone(&tz).fixed_offset(),
            fresh: true,
            source_rows: current.row_count,
            week_rows,
        };

        self.store_week(schedule.clone());
        info!(
            week_start = %schedule.week_start,
            source_rows = schedule.source_rows,
            week_rows = schedule.week_rows,
            "refresh cycle succeeded"
        );
        self.emit(WeekEvent::Data(schedule.clone()));
        RefreshOutcome::Success(schedule)
    }

    /// Failure path: re-serve the cache stale-marked, then report.
    fn fail(&self, reason: RefreshReason, error: String) -> RefreshOutcome {
        warn!(%reason, %error, "refresh cycle failed");

        // The cache itself is never mutated; consumers get a copy with the
        // freshness flag flipped and the original timestamp preserved.
        let stale = self.last_good().map(|mut schedule| {
            schedule.fresh = false;
            schedule
        });
        if let Some(schedule) = stale.clone() {
            self.emit(WeekEvent::Data(schedule));
        }

        let failure = RefreshFailure {
            reason: reason.as_str().to_owned(),
            error,
            last_good: stale,
        };
        self.emit(WeekEvent::Error(failure.clone()));
        RefreshOutcome::Failure(failure)
    }

    fn config_snapshot(&self) -> AgentConfig {
        match self.config.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn store_week(&self, schedule: WeekSchedule) {
        match self.last_good.lock() {
            Ok(mut guard) => *guard = Some(schedule),
            Err(poisoned) => *poisoned.into_inner() = Some(schedule),
        }
    }

    fn emit(&self, event: WeekEvent) {
        if self.event_tx.send(event).is_err() {
            debug!("no event receiver, notification dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::config::FetchConfig;
    use crate::error::ScheduleError;
    use crate::fetch::FetchedPeriod;
    use crate::week::ShiftDay;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    /// Scripted fetcher: togglable failure, call counting, optional delay.
    struct ScriptedFetcher {
        fail: AtomicBool,
        fail_unpersisted: bool,
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl ScriptedFetcher {
        fn ok() -> Self {
            Self {
                fail: AtomicBool::new(false),
                fail_unpersisted: false,
                calls: AtomicUsize::new(0),
                delay: None,
            }
        }

        fn failing() -> Self {
            let fetcher = Self::ok();
            fetcher.fail.store(true, Ordering::SeqCst);
            fetcher
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WeekFetcher for ScriptedFetcher {
        async fn fetch_period(
            &self,
            anchor: NaiveDate,
            persist: bool,
        ) -> crate::error::Result<FetchedPeriod> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail.load(Ordering::SeqCst) || (self.fail_unpersisted && !persist) {
                return Err(ScheduleError::Fetch("feed unreachable".to_owned()));
            }
            let iso = anchor.format("%Y-%m-%d").to_string();
            Ok(FetchedPeriod {
                days: vec![ShiftDay {
                    date: iso.clone(),
                    weekday: anchor.format("%a").to_string(),
                    label: format!("shift {iso}"),
                    is_off: false,
                }],
                source_url: format!("https://feed.test/?DateValue={iso}"),
                row_count: 1,
            })
        }
    }

    fn test_config() -> AgentConfig {
        AgentConfig {
            fetch: FetchConfig {
                base_url: "https://feed.test".to_owned(),
                employee: "Sam Tech".to_owned(),
                ..FetchConfig::default()
            },
            ..AgentConfig::default()
        }
    }

    fn orchestrator(
        fetcher: Arc<ScriptedFetcher>,
    ) -> (Arc<RefreshOrchestrator>, UnboundedReceiver<WeekEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(RefreshOrchestrator::new(test_config(), fetcher, tx)),
            rx,
        )
    }

    #[tokio::test]
    async fn success_emits_fresh_data_and_caches() {
        let fetcher = Arc::new(ScriptedFetcher::ok());
        let (orch, mut rx) = orchestrator(fetcher.clone());

        let outcome = orch.run_cycle(RefreshReason::Startup).await;
        let RefreshOutcome::Success(schedule) = outcome else {
            panic!("expected success");
        };

        assert!(schedule.fresh);
        assert_eq!(schedule.days.len(), 7);
        assert_eq!(schedule.source_rows, 1);
        // Today's row always lands inside its own Monday-start week.
        assert!(schedule.days.iter().any(|d| d.label.starts_with("shift ")));
        assert_eq!(fetcher.calls(), 2);

        match rx.try_recv().unwrap() {
            WeekEvent::Data(emitted) => assert!(emitted.fresh),
            other => panic!("expected data event, got {other:?}"),
        }
        assert!(orch.last_good().is_some());
    }

    #[tokio::test]
    async fn failure_after_success_emits_a_stale_copy() {
        let fetcher = Arc::new(ScriptedFetcher::ok());
        let (orch, mut rx) = orchestrator(fetcher.clone());

        orch.run_cycle(RefreshReason::Startup).await;
        let cached = orch.last_good().unwrap();
        while rx.try_recv().is_ok() {}

        fetcher.fail.store(true, Ordering::SeqCst);
        let outcome = orch.run_cycle(RefreshReason::Manual).await;
        let RefreshOutcome::Failure(failure) = outcome else {
            panic!("expected failure");
        };

        assert_eq!(failure.reason, "manual");
        assert!(failure.error.contains("feed unreachable"));

        let stale = failure.last_good.unwrap();
        assert!(!stale.fresh);
        assert_eq!(stale.updated_at, cached.updated_at);

        match rx.try_recv().unwrap() {
            WeekEvent::Data(emitted) => {
                assert!(!emitted.fresh);
                assert_eq!(emitted.updated_at, cached.updated_at);
            }
            other => panic!("expected stale data event, got {other:?}"),
        }
        assert!(matches!(rx.try_recv().unwrap(), WeekEvent::Error(_)));

        // The cache itself still claims freshness.
        assert!(orch.last_good().unwrap().fresh);
    }

    #[tokio::test]
    async fn first_failure_emits_only_an_error() {
        let fetcher = Arc::new(ScriptedFetcher::failing());
        let (orch, mut rx) = orchestrator(fetcher);

        let outcome = orch.run_cycle(RefreshReason::Startup).await;
        let RefreshOutcome::Failure(failure) = outcome else {
            panic!("expected failure");
        };

        assert_eq!(failure.reason, "startup");
        assert!(failure.last_good.is_none());

        assert!(matches!(rx.try_recv().unwrap(), WeekEvent::Error(_)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn updated_at_is_stamped_when_the_fetches_complete() {
        let fetcher = Arc::new(ScriptedFetcher {
            delay: Some(Duration::from_millis(200)),
            ..ScriptedFetcher::ok()
        });
        let (orch, _rx) = orchestrator(fetcher);

        let before = Utc::now();
        let outcome = orch.run_cycle(RefreshReason::Startup).await;
        let RefreshOutcome::Success(schedule) = outcome else {
            panic!("expected success");
        };

        // The fetches ran for 200 ms, so a post-fetch stamp must trail the
        // cycle start by at least that long (minus clock coarseness).
        let stamped = schedule.updated_at.with_timezone(&Utc);
        assert!(stamped - before >= chrono::Duration::milliseconds(150));
    }

    #[tokio::test]
    async fn partial_fetch_failure_fails_the_cycle() {
        let fetcher = Arc::new(ScriptedFetcher {
            fail_unpersisted: true,
            ..ScriptedFetcher::ok()
        });
        let (orch, _rx) = orchestrator(fetcher.clone());

        let outcome = orch.run_cycle(RefreshReason::Cron).await;
        assert!(matches!(outcome, RefreshOutcome::Failure(_)));
        assert!(orch.last_good().is_none());
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn overlapping_cycles_are_skipped() {
        let fetcher = Arc::new(ScriptedFetcher {
            delay: Some(Duration::from_millis(200)),
            ..ScriptedFetcher::ok()
        });
        let (orch, _rx) = orchestrator(fetcher.clone());

        let first = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.run_cycle(RefreshReason::Cron).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = orch.run_cycle(RefreshReason::Manual).await;
        assert!(matches!(second, RefreshOutcome::Skipped));

        let first = first.await.unwrap();
        assert!(matches!(first, RefreshOutcome::Success(_)));
        // One pair of fetches, not two.
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn unknown_timezone_follows_the_failure_path() {
        let fetcher = Arc::new(ScriptedFetcher::ok());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut config = test_config();
        config.timezone = "Nowhere/Void".to_owned();
        let orch = RefreshOrchestrator::new(config, fetcher.clone(), tx);

        let outcome = orch.run_cycle(RefreshReason::Manual).await;
        let RefreshOutcome::Failure(failure) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(failure.reason, "manual");
        assert!(failure.error.contains("unknown timezone"));
        assert_eq!(fetcher.calls(), 0);
        assert!(matches!(rx.try_recv().unwrap(), WeekEvent::Error(_)));
    }

    #[tokio::test]
    async fn schedule_failure_attaches_cache_unchanged() {
        let fetcher = Arc::new(ScriptedFetcher::ok());
        let (orch, mut rx) = orchestrator(fetcher);

        orch.emit_schedule_failure("invalid refresh cron `x`".to_owned());
        match rx.try_recv().unwrap() {
            WeekEvent::Error(failure) => {
                assert_eq!(failure.reason, SCHEDULE_FAILURE_REASON);
                assert!(failure.last_good.is_none());
            }
            other => panic!("expected error event, got {other:?}"),
        }

        orch.run_cycle(RefreshReason::Startup).await;
        while rx.try_recv().is_ok() {}

        orch.emit_schedule_failure("invalid refresh cron `x`".to_owned());
        match rx.try_recv().unwrap() {
            WeekEvent::Error(failure) => {
                assert!(failure.last_good.unwrap().fresh);
            }
            other => panic!("expected error event, got {other:?}"),
        }
    }

    #[test]
    fn reason_strings_are_stable() {
        assert_eq!(RefreshReason::Startup.as_str(), "startup");
        assert_eq!(RefreshReason::Manual.as_str(), "manual");
        assert_eq!(RefreshReason::Cron.as_str(), "cron");
        assert_eq!(RefreshReason::Cron.to_string(), "cron");
    }

    #[tokio::test]
    async fn set_config_applies_to_the_next_cycle() {
        let fetcher = Arc::new(ScriptedFetcher::ok());
        let (orch, _rx) = orchestrator(fetcher.clone());

        let mut config = test_config();
        config.timezone = "Nowhere/Void".to_owned();
        orch.set_config(config);

        let outcome = orch.run_cycle(RefreshReason::Manual).await;
        assert!(matches!(outcome, RefreshOutcome::Failure(_)));
        assert_eq!(fetcher.calls(), 0);
    }
}
