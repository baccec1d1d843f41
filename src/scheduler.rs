//! Cron-driven refresh scheduling.
//!
//! [`RefreshScheduler`] is a small state machine: idle (no timer) or armed
//! (exactly one pending timer task). Re-configuring always cancels the
//! previous timer before arming the next. After a fire the next run is
//! searched from just past the fired minute, so each matching minute fires
//! exactly once; a cycle that outruns its minute re-arms from the current
//! instant instead, skipping missed ticks rather than stacking them.

use chrono::Utc;
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cron::{self, CronSpec};
use crate::orchestrator::{RefreshOrchestrator, RefreshReason};

/// Floor on the timer delay. A next-run in the past (always the case for
/// an every-minute cron, where the current minute matches) still arms.
const MIN_DELAY: Duration = Duration::from_secs(1);

/// Drives scheduled refresh cycles from a cron expression.
pub struct RefreshScheduler {
    orchestrator: Arc<RefreshOrchestrator>,
    timer: Option<TimerHandle>,
}

struct TimerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl RefreshScheduler {
    /// Create an idle scheduler.
    #[must_use]
    pub fn new(orchestrator: Arc<RefreshOrchestrator>) -> Self {
        Self {
            orchestrator,
            timer: None,
        }
    }

    /// Whether a timer task is currently armed.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.timer.as_ref().is_some_and(|t| !t.task.is_finished())
    }

    /// (Re)configure scheduled refreshes.
    ///
    /// Any armed timer is cancelled first. `cron = None` leaves the
    /// scheduler idle, which is a valid configuration: manual refreshes
    /// keep working. An expression that fails to parse or yields no future
    /// run emits a scheduling-failure notification and leaves the
    /// scheduler idle.
    pub fn configure(&mut self, cron: Option<&str>, tz: Tz) {
        self.stop();

        let Some(expr) = cron else {
            info!("no refresh cron configured, scheduler idle");
            return;
        };

        let spec = match CronSpec::parse(expr) {
            Ok(spec) => spec,
            Err(e) => {
                self.orchestrator
                    .emit_schedule_failure(format!("invalid refresh cron `{expr}`: {e}"));
                return;
            }
        };

        // Prove the expression has an upcoming run before arming.
        if let Err(e) = cron::next_match(&spec, tz, Utc::now()) {
            self.orchestrator
                .emit_schedule_failure(format!("invalid refresh cron `{expr}`: {e}"));
            return;
        }

        info!(cron = expr, %tz, "refresh schedule armed");
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_timer(
            self.orchestrator.clone(),
            spec,
            tz,
            cancel.clone(),
        ));
        self.timer = Some(TimerHandle { cancel, task });
    }

    /// Cancel any armed timer.
    pub fn stop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel.cancel();
        }
    }
}

/// Timer loop: sleep until the next matching minute, fire once, re-arm.
///
/// The fired minute itself stays eligible in the next-run search, so the
/// re-arm seeds the search one minute past the fired target; otherwise a
/// cycle finishing inside its own minute would fire again at the delay
/// floor until the minute rolled over. Cancellation is only taken at the
/// select point, never mid-cycle; a cancel racing a just-fired timer is
/// absorbed by the orchestrator's re-entrancy guard.
async fn run_timer(
    orchestrator: Arc<RefreshOrchestrator>,
    spec: CronSpec,
    tz: Tz,
    cancel: CancellationToken,
) {
    // The first search runs from now: a currently-matching minute arms at
    // the delay floor right away.
    let mut seed = Utc::now();
    loop {
        let next = match cron::next_match(&spec, tz, seed.max(Utc::now())) {
            Ok(next) => next,
            Err(e) => {
                orchestrator.emit_schedule_failure(format!("refresh cron yields no run: {e}"));
                return;
            }
        };

        let delay = fire_delay(next.timestamp_millis(), Utc::now().timestamp_millis());
        debug!(next = %next, delay_ms = delay.as_millis() as u64, "refresh timer armed");

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("refresh timer cancelled");
                return;
            }
            _ = tokio::time::sleep(delay) => {
                orchestrator.run_cycle(RefreshReason::Cron).await;
                seed = next.with_timezone(&Utc) + chrono::Duration::minutes(1);
            }
        }
    }
}

/// Delay until `next`, floored at [`MIN_DELAY`].
fn fire_delay(next_ms: i64, now_ms: i64) -> Duration {
    let millis = u64::try_from(next_ms.saturating_sub(now_ms)).unwrap_or(0);
    MIN_DELAY.max(Duration::from_millis(millis))
}
