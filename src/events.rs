//! Broadcast bus carrying engine events to the UI consumer.
//!
//! All engine components receive a cloned [`EventBus`] and publish
//! directly. `publish()` is a sync call; if nobody is subscribed the
//! event is silently dropped, so a headless engine run costs nothing.

use tokio::sync::broadcast;

/// Events the engine emits for presentation.
#[derive(Debug, Clone)]
pub enum UiEvent {
    /// Aggregate throughput sample from the speed sampler.
    Speed {
        bytes_per_sec: f64,
        eta_secs: Option<u64>,
    },
    /// Supervisor diagnostics (speed checks, worker restarts).
    Debug(String),
    /// The session failed; the message is user-facing.
    Error(String),
    /// Merge finished and the session moved to the complete library.
    Done,
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<UiEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: UiEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to all future events. Slow subscribers observe
    /// `RecvError::Lagged` instead of blocking producers.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(128)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new(16);
        bus.publish(UiEvent::Done);
    }

    #[tokio::test]
    async fn publish_and_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.publish(UiEvent::Speed {
            bytes_per_sec: 1024.0,
            eta_secs: Some(10),
        });

        match rx.recv().await.unwrap() {
            UiEvent::Speed { eta_secs, .. } => assert_eq!(eta_secs, Some(10)),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn multiple_subscribers_each_receive() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        bus.publish(UiEvent::Done);

        assert!(matches!(rx1.recv().await.unwrap(), UiEvent::Done));
        assert!(matches!(rx2.recv().await.unwrap(), UiEvent::Done));
    }
}
