use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::constants::intervals::SCHEDULER_TICK;
use crate::domain::{ScheduleState, StartOutcome, TriggerSource};
use crate::services::RunTrigger;

#[derive(Debug, Clone, Copy)]
struct Timer {
    period: Duration,
    next_due: Instant,
}

/// Zero or one recurring timer, polled by a fine-grained tick loop.
///
/// The loop never sleeps for the configured interval itself, so a call to
/// [`Scheduler::configure`] takes effect on the next tick.
pub struct Scheduler {
    trigger: Arc<dyn RunTrigger>,
    state: Mutex<(ScheduleState, Option<Timer>)>,
}

impl Scheduler {
    #[must_use]
    pub fn new(trigger: Arc<dyn RunTrigger>) -> Self {
        Self {
            trigger,
            state: Mutex::new((ScheduleState::disabled(), None)),
        }
    }

    /// Drops the current timer and arms a new one if `schedule` enables it.
    ///
    /// A period too long to be represented as a deadline never fires.
    pub fn configure(&self, schedule: ScheduleState) {
        let timer = schedule.period().and_then(|period| {
            let next_due = Instant::now().checked_add(period);
            if next_due.is_none() {
                warn!(
                    interval_minutes = schedule.interval_minutes,
                    "Schedule interval is out of range, timer not armed"
                );
            }
            next_due.map(|next_due| Timer { period, next_due })
        });

        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = (schedule, timer);

        if timer.is_some() {
            info!(
                event = "schedule_configured",
                interval_minutes = schedule.interval_minutes,
                "Scheduled scan enabled"
            );
        } else {
            info!(event = "schedule_configured", "Scheduled scan disabled");
        }
    }

    #[must_use]
    pub fn schedule_state(&self) -> ScheduleState {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).0
    }

    /// Seconds until the armed timer fires, if one is armed.
    #[must_use]
    pub fn next_run_in(&self) -> Option<Duration> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .1
            .map(|timer| timer.next_due.saturating_duration_since(Instant::now()))
    }

    /// Consumes the timer's due slot, re-arming it one period after `now`.
    pub fn take_due(&self, now: Instant) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(timer) = state.1 else {
            return false;
        };
        if now < timer.next_due {
            return false;
        }

        state.1 = now.checked_add(timer.period).map(|next_due| Timer {
            next_due,
            ..timer
        });
        true
    }

    /// One iteration of the loop. A rejection from the coordinator is not
    /// retried; the timer simply waits for its next period.
    pub fn tick(&self) -> Option<StartOutcome> {
        if !self.take_due(Instant::now()) {
            return None;
        }

        let outcome = self.trigger.trigger(TriggerSource::Scheduled);
        match outcome {
            StartOutcome::Accepted => info!(event = "job_started", job_name = "subtitle_scan", "Scheduled run started"),
            StartOutcome::RejectedAlreadyRunning => debug!(
                event = "job_skipped",
                job_name = "subtitle_scan",
                "Scheduled run skipped, previous run still active"
            ),
        }
        Some(outcome)
    }

    pub async fn run(self: Arc<Self>, startup_delay: Duration) {
        if !startup_delay.is_zero() {
            tokio::time::sleep(startup_delay).await;
        }

        info!("Scheduler tick loop running");
        let mut ticker = interval(SCHEDULER_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            self.tick();
        }
    }

    pub fn spawn(self: &Arc<Self>, startup_delay: Duration) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run(startup_delay))
    }
}
