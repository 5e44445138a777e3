use axum::{Json, extract::State};
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState, DownloadResponse, ScanResponse};
use crate::domain::{StartOutcome, TriggerSource};

/// `POST /api/scan`
///
/// Read-only per-path counts. Runs on the blocking pool and never touches the
/// run guard, so it answers while a run is in progress.
pub async fn scan_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<ScanResponse>>, ApiError> {
    let config = state.shared.config().await;
    let reconciler = state.shared.reconciler.clone();

    let results = tokio::task::spawn_blocking(move || {
        reconciler.scan_status(
            &config.library.search_paths,
            &config.library.language_set(),
        )
    })
    .await
    .map_err(|e| ApiError::internal(format!("Scan task failed: {e}")))?;

    Ok(Json(ApiResponse::success(ScanResponse { results })))
}

/// `POST /api/download`
///
/// Returns as soon as the coordinator has accepted or rejected the request.
pub async fn trigger_download(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<DownloadResponse>>, ApiError> {
    match state.coordinator().start(TriggerSource::Manual) {
        StartOutcome::Accepted => Ok(Json(ApiResponse::success(DownloadResponse {
            outcome: StartOutcome::Accepted,
            message: "Scan and download started".to_string(),
        }))),
        StartOutcome::RejectedAlreadyRunning => {
            Err(ApiError::conflict("A scan is already in progress"))
        }
    }
}
