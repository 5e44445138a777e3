//! Run coordinator: reconcile, acquire, summarize, notify.
//!
//! Both trigger sources (HTTP and the scheduler) go through [`RunCoordinator::start`],
//! which is the only place a run can begin. At most one run executes at a time;
//! overlapping triggers are rejected, never queued.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::domain::events::{STATUS_FINISHED, STATUS_STARTED};
use crate::domain::{
    MissingSubtitleEntry, ReconcileItem, RunOutcome, RunPhase, RunSummary, StartOutcome,
    TriggerSource,
};
use crate::services::notifier::Lifecycle;
use crate::services::{
    EventBus, MediaReconciler, NotificationDispatcher, ProviderError, ProviderGateway,
};

/// Failures that abort a whole run, as opposed to a single video.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("media scan task failed: {0}")]
    ReconcileTask(#[from] tokio::task::JoinError),

    #[error("subtitle provider unavailable: {0}")]
    ProviderUnavailable(#[source] ProviderError),
}

/// Supplies the configuration a run starts with.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn snapshot(&self) -> Config;
}

#[async_trait]
impl ConfigSource for RwLock<Config> {
    async fn snapshot(&self) -> Config {
        self.read().await.clone()
    }
}

/// Anything that can be asked to start a run.
pub trait RunTrigger: Send + Sync {
    fn trigger(&self, source: TriggerSource) -> StartOutcome;
}

#[derive(Clone)]
pub struct RunCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    config: Arc<dyn ConfigSource>,
    reconciler: MediaReconciler,
    provider: Arc<dyn ProviderGateway>,
    notifier: NotificationDispatcher,
    events: EventBus,
    running: AtomicBool,
    phase: Mutex<RunPhase>,
    last_summary: Mutex<Option<RunSummary>>,
}

/// Held for the whole lifetime of a run. Dropping it is the only way the
/// in-progress flag is cleared.
struct RunGuard {
    inner: Arc<Inner>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.inner.set_phase(RunPhase::Idle);
        self.inner.running.store(false, Ordering::Release);
        metrics::gauge!("subtitle_run_active").set(0.0);
    }
}

impl RunCoordinator {
    #[must_use]
    pub fn new(
        config: Arc<dyn ConfigSource>,
        reconciler: MediaReconciler,
        provider: Arc<dyn ProviderGateway>,
        notifier: NotificationDispatcher,
        events: EventBus,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                reconciler,
                provider,
                notifier,
                events,
                running: AtomicBool::new(false),
                phase: Mutex::new(RunPhase::Idle),
                last_summary: Mutex::new(None),
            }),
        }
    }

    /// Answers immediately; the run itself happens on a background task.
    pub fn start(&self, trigger: TriggerSource) -> StartOutcome {
        let Some(guard) = self.try_acquire(trigger) else {
            return StartOutcome::RejectedAlreadyRunning;
        };

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let config = inner.config.snapshot().await;
            inner.execute(config, trigger, guard).await;
        });

        StartOutcome::Accepted
    }

    /// Runs in the caller's task and returns the summary, or `None` when
    /// another run is already active.
    pub async fn run_to_completion(&self, trigger: TriggerSource) -> Option<RunSummary> {
        let guard = self.try_acquire(trigger)?;
        let config = self.inner.config.snapshot().await;
        Some(self.inner.execute(config, trigger, guard).await)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn phase(&self) -> RunPhase {
        *self
            .inner
            .phase
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn last_summary(&self) -> Option<RunSummary> {
        self.inner
            .last_summary
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn try_acquire(&self, trigger: TriggerSource) -> Option<RunGuard> {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(event = "run_rejected", trigger = %trigger, "A run is already in progress");
            metrics::counter!("subtitle_run_rejections_total", "trigger" => trigger.to_string())
                .increment(1);
            self.inner.events.log(format!(
                "A scan is already in progress; ignoring {trigger} request."
            ));
            return None;
        }

        metrics::gauge!("subtitle_run_active").set(1.0);
        self.inner.set_phase(RunPhase::Starting);
        Some(RunGuard {
            inner: Arc::clone(&self.inner),
        })
    }
}

impl RunTrigger for RunCoordinator {
    fn trigger(&self, source: TriggerSource) -> StartOutcome {
        self.start(source)
    }
}

impl Inner {
    fn set_phase(&self, phase: RunPhase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }

    async fn execute(&self, config: Config, trigger: TriggerSource, guard: RunGuard) -> RunSummary {
        let start = Instant::now();
        let mut summary = RunSummary::begin(trigger);

        info!(event = "run_started", trigger = %trigger, "Starting subtitle run");
        self.events.status(STATUS_STARTED);
        self.notifier
            .lifecycle(&config.notifications, Lifecycle::Started)
            .await;
        self.events.log("Starting scan and download...");

        match self.acquire_all(&config, &mut summary).await {
            Ok(()) => {
                self.set_phase(RunPhase::Summarizing);
                summary.finish(RunOutcome::Success);
                let message = summary.completion_message();
                self.events.log(message.as_str());
                self.events.status(STATUS_FINISHED);

                self.set_phase(RunPhase::NotifyingCompletion);
                self.notifier
                    .lifecycle(&config.notifications, Lifecycle::Completed { message })
                    .await;
                metrics::counter!("subtitle_runs_total", "outcome" => "success").increment(1);
            }
            Err(e) => {
                self.set_phase(RunPhase::Failed);
                let reason = e.to_string();
                error!(event = "run_failed", trigger = %trigger, error = %reason, "Subtitle run failed");
                summary.finish(RunOutcome::Failed(reason.clone()));
                self.events.log(format!("ERROR: {reason}"));
                self.events.status(STATUS_FINISHED);

                self.set_phase(RunPhase::NotifyingFailure);
                self.notifier
                    .lifecycle(&config.notifications, Lifecycle::Failed { error: reason })
                    .await;
                metrics::counter!("subtitle_runs_total", "outcome" => "failed").increment(1);
            }
        }

        info!(
            event = "run_finished",
            trigger = %trigger,
            videos = summary.total_videos,
            saved = summary.saved_count,
            failed = summary.failed_videos,
            duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Subtitle run finished"
        );

        *self
            .last_summary
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(summary.clone());
        drop(guard);
        summary
    }

    async fn acquire_all(&self, config: &Config, summary: &mut RunSummary) -> Result<(), RunError> {
        self.set_phase(RunPhase::Reconciling);
        let entries = self.reconcile(config).await?;
        let total = entries.len();
        summary.total_videos = total;

        self.set_phase(RunPhase::Acquiring);
        if entries.iter().any(MissingSubtitleEntry::needs_acquisition) {
            self.provider
                .check_ready()
                .await
                .map_err(RunError::ProviderUnavailable)?;
        }

        self.events.progress(0, total);
        for (index, entry) in entries.iter().enumerate() {
            let name = entry.video.display_name();
            self.events.log(format!("Processing: {name}"));

            if entry.needs_acquisition() {
                match self
                    .provider
                    .acquire(&entry.video, &entry.missing, &config.credentials)
                    .await
                {
                    Ok(saved) => {
                        summary.saved_count += saved;
                        metrics::counter!("subtitles_saved_total")
                            .increment(u64::try_from(saved).unwrap_or(u64::MAX));
                    }
                    Err(e) => {
                        summary.failed_videos += 1;
                        warn!(event = "video_failed", video = %entry.video, error = %e, "Subtitle acquisition failed");
                        metrics::counter!("subtitle_video_failures_total").increment(1);
                        self.events.log(format!("ERROR processing {name}: {e}"));
                    }
                }
            }

            self.events.progress(index + 1, total);
        }

        Ok(())
    }

    /// Walks the filesystem off the async workers and reports bad paths as it goes.
    async fn reconcile(&self, config: &Config) -> Result<Vec<MissingSubtitleEntry>, RunError> {
        let reconciler = self.reconciler.clone();
        let paths = config.library.search_paths.clone();
        let languages = config.library.language_set();

        let items = tokio::task::spawn_blocking(move || {
            reconciler
                .reconcile(&paths, &languages)
                .collect::<Vec<ReconcileItem>>()
        })
        .await?;

        let mut entries = Vec::with_capacity(items.len());
        for item in items {
            match item {
                ReconcileItem::Entry(entry) => entries.push(entry),
                ReconcileItem::PathError { path, error } => {
                    self.events.log(format!("Error scanning {path}: {error}"));
                }
            }
        }
        Ok(entries)
    }
}
