use serde::Serialize;

use crate::domain::{PathStatus, RunPhase, RunSummary, ScheduleState, StartOutcome};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub results: Vec<PathStatus>,
}

#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub outcome: StartOutcome,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub uptime: u64,
    pub running: bool,
    pub phase: RunPhase,
    pub schedule: ScheduleState,
    /// Seconds until the next scheduled run, when the schedule is armed.
    pub next_scheduled_run: Option<u64>,
    pub last_run: Option<RunSummary>,
    pub observers: usize,
}

#[derive(Debug, Serialize)]
pub struct NotificationTestResponse {
    pub delivered: bool,
}
