//! System API endpoints.
//!
//! Status of the run coordinator and scheduler, plus configuration read and
//! replace. Secrets never leave the process unmasked.

use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState, SystemStatus};
use crate::config::Config;

pub const MASK: &str = "********";

#[derive(Debug, Serialize)]
pub struct HealthLiveResponse {
    pub status: &'static str,
}

/// Returns the coordinator phase, schedule and the last run's summary.
///
/// # Endpoint
/// `GET /api/system/status`
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<ApiResponse<SystemStatus>> {
    let coordinator = state.coordinator();
    let scheduler = state.scheduler();

    Json(ApiResponse::success(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime: state.start_time.elapsed().as_secs(),
        running: coordinator.is_running(),
        phase: coordinator.phase(),
        schedule: scheduler.schedule_state(),
        next_scheduled_run: scheduler.next_run_in().map(|d| d.as_secs()),
        last_run: coordinator.last_summary(),
        observers: state.event_bus().subscriber_count(),
    }))
}

/// Returns the current configuration with credentials masked.
///
/// # Endpoint
/// `GET /api/system/config`
pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<ApiResponse<Config>> {
    let config = state.config().read().await.redacted(MASK);
    Json(ApiResponse::success(config))
}

/// Replaces the configuration.
///
/// # Endpoint
/// `PUT /api/system/config`
///
/// Masked secrets keep their stored value. The scheduler is re-armed from the
/// new schedule; a run already in progress keeps the snapshot it started with.
pub async fn update_config(
    State(state): State<Arc<AppState>>,
    Json(new_config): Json<Config>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.shared.update_config(new_config, MASK).await?;
    Ok(Json(ApiResponse::success(())))
}

/// `GET /api/health/live`
pub async fn health_live() -> impl IntoResponse {
    Json(ApiResponse::success(HealthLiveResponse { status: "alive" }))
}
