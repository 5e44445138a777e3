//! In-process broadcast of run events with a bounded log history.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

use crate::domain::events::Event;

/// Cheap to clone; every clone publishes into the same bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

struct Inner {
    sender: broadcast::Sender<Event>,
    history: Mutex<VecDeque<Event>>,
    capacity: usize,
}

impl EventBus {
    /// `buffer_size` bounds each subscriber's backlog, `history_capacity` the replay buffer.
    #[must_use]
    pub fn new(buffer_size: usize, history_capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size.max(1));
        Self {
            inner: Arc::new(Inner {
                sender,
                history: Mutex::new(VecDeque::with_capacity(history_capacity.min(1024))),
                capacity: history_capacity,
            }),
        }
    }

    /// Never waits on subscribers. Slow ones observe `Lagged` on their side.
    pub fn publish(&self, event: Event) {
        let mut history = self
            .inner
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if event.is_log() && self.inner.capacity > 0 {
            while history.len() >= self.inner.capacity {
                history.pop_front();
            }
            history.push_back(event.clone());
        }

        // No receivers is fine.
        let _ = self.inner.sender.send(event);
    }

    pub fn log(&self, message: impl Into<String>) {
        self.publish(Event::log(message));
    }

    pub fn progress(&self, current: usize, total: usize) {
        self.publish(Event::progress(current, total));
    }

    pub fn status(&self, message: impl Into<String>) {
        self.publish(Event::status(message));
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.sender.subscribe()
    }

    /// Snapshot of the history and a receiver positioned right after it, taken
    /// atomically so late joiners see neither gaps nor duplicates.
    #[must_use]
    pub fn subscribe_with_history(&self) -> (Vec<Event>, broadcast::Receiver<Event>) {
        let history = self
            .inner
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let rx = self.inner.sender.subscribe();
        (history.iter().cloned().collect(), rx)
    }

    #[must_use]
    pub fn history(&self) -> Vec<Event> {
        self.inner
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::EventKind;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    #[test]
    fn history_keeps_most_recent_logs() {
        let bus = EventBus::new(16, 3);
        for i in 0..5 {
            bus.log(format!("line {i}"));
        }

        let messages: Vec<String> = bus.history().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["line 2", "line 3", "line 4"]);
    }

    #[test]
    fn progress_and_status_are_not_retained() {
        let bus = EventBus::new(16, 10);
        bus.log("kept");
        bus.progress(1, 2);
        bus.status("finished");

        let history = bus.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, EventKind::Log);
    }

    #[test]
    fn zero_capacity_history_stays_empty() {
        let bus = EventBus::new(4, 0);
        bus.log("dropped");
        assert!(bus.history().is_empty());
    }

    #[tokio::test]
    async fn every_subscriber_sees_every_event() {
        let bus = EventBus::new(16, 10);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.log("one");
        bus.progress(1, 1);

        for rx in [&mut a, &mut b] {
            assert_eq!(rx.recv().await.unwrap().message, "one");
            assert_eq!(rx.recv().await.unwrap().message, "1/1");
        }
    }

    #[tokio::test]
    async fn late_subscriber_gets_history_then_live() {
        let bus = EventBus::new(16, 10);
        bus.log("before");

        let (history, mut rx) = bus.subscribe_with_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].message, "before");
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        bus.log("after");
        assert_eq!(rx.recv().await.unwrap().message, "after");
    }

    #[tokio::test]
    async fn slow_subscriber_lags_without_blocking_publisher() {
        let bus = EventBus::new(2, 10);
        let mut rx = bus.subscribe();

        for i in 0..10 {
            bus.progress(i, 10);
        }

        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(_))));
        assert_eq!(rx.recv().await.unwrap().message, "8/10");
    }

    #[test]
    fn dropped_subscriber_is_removed() {
        let bus = EventBus::new(4, 4);
        let rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(rx);
        assert_eq!(bus.subscriber_count(), 0);
        bus.log("still fine");
    }
}
