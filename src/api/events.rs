use axum::{
    Json, Router,
    extract::State,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::get,
};
use futures::stream::{self, Stream, StreamExt};
use std::{convert::Infallible, sync::Arc};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::{ApiResponse, AppState};
use crate::constants::intervals::SSE_KEEP_ALIVE;
use crate::domain::events::Event;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/events", get(sse_handler))
        .route("/logs", get(get_logs))
}

fn to_sse(event: &Event) -> SseEvent {
    let json = serde_json::to_string(event).unwrap_or_default();
    SseEvent::default().data(json)
}

/// Replays the retained log history, then follows the live feed. Dropping the
/// connection drops the receiver and nothing else.
async fn sse_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let (history, rx) = state.event_bus().subscribe_with_history();
    debug!(replayed = history.len(), "Event stream client connected");

    let replay = stream::iter(history).map(|event| Ok::<_, Infallible>(to_sse(&event)));

    let live = stream::unfold(rx, |mut rx| async move {
        match rx.recv().await {
            Ok(event) => Some((Ok(to_sse(&event)), rx)),
            Err(broadcast::error::RecvError::Lagged(count)) => {
                warn!("Client lagged by {} messages", count);

                Some((
                    Ok(SseEvent::default().event("warning").data("Missed some events")),
                    rx,
                ))
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    });

    Sse::new(replay.chain(live)).keep_alive(KeepAlive::new().interval(SSE_KEEP_ALIVE))
}

/// `GET /api/logs`
///
/// Snapshot of the retained log events, oldest first.
pub async fn get_logs(State(state): State<Arc<AppState>>) -> Json<ApiResponse<Vec<Event>>> {
    Json(ApiResponse::success(state.event_bus().history()))
}
