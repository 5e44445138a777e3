use axum::{Json, extract::State};
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState, NotificationTestResponse};
use crate::services::notifier::Lifecycle;

/// `POST /api/notifications/test`
///
/// Sends a test message with the saved notification settings.
pub async fn send_test(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<NotificationTestResponse>>, ApiError> {
    let notifications = state.shared.config().await.notifications;

    if !notifications.enabled || notifications.webhook_url.trim().is_empty() {
        return Err(ApiError::validation(
            "Notifications are disabled or no webhook URL is configured",
        ));
    }

    let delivered = state
        .shared
        .notifier
        .lifecycle(&notifications, Lifecycle::Test)
        .await;

    if !delivered {
        return Err(ApiError::webhook_error(
            "Test notification could not be delivered",
        ));
    }

    Ok(Json(ApiResponse::success(NotificationTestResponse {
        delivered,
    })))
}
