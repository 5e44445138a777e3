pub mod coordinator;
pub use coordinator::{ConfigSource, RunCoordinator, RunError, RunTrigger};

pub mod event_bus;
pub use event_bus::EventBus;

pub mod log_sink;
pub use log_sink::LogSink;

pub mod notifier;
pub use notifier::{HttpWebhookGateway, NotificationDispatcher, NotifyError, WebhookGateway, WebhookKind};

pub mod provider;
pub use provider::{ProviderError, ProviderGateway, SubliminalGateway};

pub mod reconciler;
pub use reconciler::MediaReconciler;

pub mod scheduler;
pub use scheduler::Scheduler;
