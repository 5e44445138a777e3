use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::services::{EventBus, RunCoordinator, Scheduler};
use crate::state::SharedState;

mod error;
pub mod events;
mod notifications;
mod observability;
mod system;
mod tasks;
mod types;

pub use error::ApiError;
pub use system::MASK;
pub use types::*;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Arc<RwLock<Config>> {
        &self.shared.config
    }

    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.shared.event_bus
    }

    #[must_use]
    pub fn coordinator(&self) -> &RunCoordinator {
        &self.shared.coordinator
    }

    #[must_use]
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.shared.scheduler
    }
}

#[must_use]
pub fn create_app_state(
    shared: Arc<SharedState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> Arc<AppState> {
    Arc::new(AppState {
        shared,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    })
}

pub async fn router(state: Arc<AppState>) -> Router {
    let cors_origins = state.config().read().await.server.cors_allowed_origins.clone();

    let api_router = Router::new()
        .route("/scan", post(tasks::scan_status))
        .route("/download", post(tasks::trigger_download))
        .route("/system/status", get(system::get_status))
        .route(
            "/system/config",
            get(system::get_config).put(system::update_config),
        )
        .route("/notifications/test", post(notifications::send_test))
        .route("/health/live", get(system::health_live))
        .route("/metrics", get(observability::get_metrics))
        .merge(events::router())
        .with_state(state);

    let cors_layer = if cors_origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .nest("/api", api_router)
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(observability::logging_middleware))
}
