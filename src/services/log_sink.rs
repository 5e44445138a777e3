use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::events::{Event, EventKind};
use crate::services::EventBus;

/// Console destination for run events, fed from the same bus as HTTP observers.
pub struct LogSink {
    events: EventBus,
    include_progress: bool,
}

impl LogSink {
    #[must_use]
    pub const fn new(events: EventBus) -> Self {
        Self {
            events,
            include_progress: false,
        }
    }

    /// Progress events are logged at `info` instead of `debug`.
    #[must_use]
    pub const fn with_progress(mut self) -> Self {
        self.include_progress = true;
        self
    }

    pub fn start_listener(self) -> JoinHandle<()> {
        let mut rx = self.events.subscribe();
        let include_progress = self.include_progress;
        // Only the receiver may live in the task, otherwise the bus never closes.
        drop(self);

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => handle_event(&event, include_progress),
                    Err(broadcast::error::RecvError::Lagged(count)) => {
                        warn!(count, "Console log sink lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Event bus closed, console log sink stopping");
                        break;
                    }
                }
            }
        })
    }
}

fn handle_event(event: &Event, include_progress: bool) {
    match event.kind {
        EventKind::Log if event.message.starts_with("ERROR") => {
            error!(target: "subtitlarr::run", "{}", event.message);
        }
        EventKind::Log => info!(target: "subtitlarr::run", "{}", event.message),
        EventKind::Status => info!(target: "subtitlarr::run", status = %event.message, "Run {}", event.message),
        EventKind::Progress if include_progress => {
            info!(target: "subtitlarr::run", progress = %event.message, "Progress {}", event.message);
        }
        EventKind::Progress => debug!(target: "subtitlarr::run", progress = %event.message, "Progress"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn listener_stops_when_bus_is_dropped() {
        let bus = EventBus::new(8, 8);
        let handle = LogSink::new(bus.clone()).with_progress().start_listener();

        bus.log("hello");
        bus.progress(1, 1);
        bus.status("finished");
        drop(bus);

        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("sink did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn sink_is_a_subscriber() {
        let bus = EventBus::new(8, 8);
        let handle = LogSink::new(bus.clone()).start_listener();
        assert_eq!(bus.subscriber_count(), 1);
        handle.abort();
    }
}
