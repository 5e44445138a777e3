use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::Config;
use crate::services::{
    EventBus, HttpWebhookGateway, MediaReconciler, NotificationDispatcher, ProviderGateway,
    RunCoordinator, Scheduler, SubliminalGateway, WebhookGateway,
};

/// Errors raised while replacing the running configuration.
#[derive(Debug, Error)]
pub enum ConfigUpdateError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Failed to persist configuration: {0}")]
    Persist(String),
}

/// Every long-lived component, wired once at startup.
#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<RwLock<Config>>,

    /// Where `PUT /api/system/config` writes the file back to.
    pub config_path: Option<PathBuf>,

    pub event_bus: EventBus,

    pub reconciler: MediaReconciler,

    pub notifier: NotificationDispatcher,

    pub coordinator: RunCoordinator,

    pub scheduler: Arc<Scheduler>,
}

impl SharedState {
    /// Production wiring: `subliminal` as provider and real HTTP webhooks.
    pub fn new(config: Config, config_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let event_bus = Self::event_bus_for(&config);
        let provider = Arc::new(SubliminalGateway::new(&config.provider, event_bus.clone()));
        let webhooks = Arc::new(HttpWebhookGateway::new(Duration::from_secs(
            config.notifications.timeout_seconds.max(1),
        ))?);

        Ok(Self::build(config, config_path, event_bus, provider, webhooks))
    }

    /// Same wiring with caller-supplied gateways.
    #[must_use]
    pub fn with_gateways(
        config: Config,
        config_path: Option<PathBuf>,
        provider: Arc<dyn ProviderGateway>,
        webhooks: Arc<dyn WebhookGateway>,
    ) -> Self {
        let event_bus = Self::event_bus_for(&config);
        Self::build(config, config_path, event_bus, provider, webhooks)
    }

    fn event_bus_for(config: &Config) -> EventBus {
        EventBus::new(
            config.general.event_bus_buffer_size,
            config.general.log_history_size,
        )
    }

    fn build(
        config: Config,
        config_path: Option<PathBuf>,
        event_bus: EventBus,
        provider: Arc<dyn ProviderGateway>,
        webhooks: Arc<dyn WebhookGateway>,
    ) -> Self {
        let schedule = config.schedule_state();
        let config = Arc::new(RwLock::new(config));
        let reconciler = MediaReconciler::default();
        let notifier = NotificationDispatcher::new(webhooks);

        let coordinator = RunCoordinator::new(
            config.clone(),
            reconciler.clone(),
            provider,
            notifier.clone(),
            event_bus.clone(),
        );

        let scheduler = Arc::new(Scheduler::new(Arc::new(coordinator.clone())));
        scheduler.configure(schedule);

        Self {
            config,
            config_path,
            event_bus,
            reconciler,
            notifier,
            coordinator,
            scheduler,
        }
    }

    pub async fn config(&self) -> Config {
        self.config.read().await.clone()
    }

    /// Validates, persists and installs `new_config`, then re-arms the scheduler.
    ///
    /// Secrets equal to `mask` keep their current value.
    pub async fn update_config(
        &self,
        mut new_config: Config,
        mask: &str,
    ) -> Result<(), ConfigUpdateError> {
        let mut config = self.config.write().await;

        new_config
            .credentials
            .restore_masked(&config.credentials, mask);

        new_config
            .validate()
            .map_err(|e| ConfigUpdateError::Validation(format!("{e:#}")))?;

        if let Some(path) = &self.config_path {
            new_config
                .save_to_path(path)
                .map_err(|e| ConfigUpdateError::Persist(format!("{e:#}")))?;
        }

        // The timer is re-armed under the write lock so it always follows the
        // configuration that is installed last.
        let schedule = new_config.schedule_state();
        *config = new_config;
        self.scheduler.configure(schedule);
        drop(config);

        info!(event = "config_updated", "Configuration updated");
        Ok(())
    }
}
