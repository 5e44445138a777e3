//! Events carried by the event bus.
//!
//! Every observer (console, live HTTP stream, history snapshot) consumes the same
//! three event kinds. Only `log` events are retained in history.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Log,
    Progress,
    Status,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Log => write!(f, "log"),
            Self::Progress => write!(f, "progress"),
            Self::Status => write!(f, "status"),
        }
    }
}

/// Serialized as `{"type": "...", "message": "...", "timestamp": "..."}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn log(message: impl Into<String>) -> Self {
        Self::new(EventKind::Log, message)
    }

    #[must_use]
    pub fn progress(current: usize, total: usize) -> Self {
        Self::new(EventKind::Progress, format!("{current}/{total}"))
    }

    pub fn status(message: impl Into<String>) -> Self {
        Self::new(EventKind::Status, message)
    }

    #[must_use]
    pub fn is_log(&self) -> bool {
        self.kind == EventKind::Log
    }
}

pub const STATUS_STARTED: &str = "started";
pub const STATUS_FINISHED: &str = "finished";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let event = Event::progress(1, 2);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["message"], "1/2");
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn only_log_is_log() {
        assert!(Event::log("hello").is_log());
        assert!(!Event::status(STATUS_STARTED).is_log());
        assert!(!Event::progress(0, 0).is_log());
    }
}
