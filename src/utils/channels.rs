//! Event fan-out for voice core subscribers

use crate::state::VoiceEvent;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Broadcasts `VoiceEvent`s to any number of subscriber channels
///
/// Publishing never blocks the orchestrator and never drops an event: every
/// subscriber sees every event in publish order. A subscriber whose backlog
/// reaches `backlog_warning` is logged as lagging. A subscriber that dropped
/// its receiver is removed.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<VoiceEvent>>>>,
    backlog_warning: usize,
}

impl EventBus {
    pub fn new(backlog_warning: usize) -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
            backlog_warning: backlog_warning.max(1),
        }
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> Receiver<VoiceEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Send an event to every live subscriber
    pub fn publish(&self, event: VoiceEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| {
            if tx.send(event.clone()).is_err() {
                debug!("Removing disconnected subscriber");
                return false;
            }
            if tx.len() == self.backlog_warning {
                warn!("Subscriber lagging: {} events queued", tx.len());
            }
            true
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::VoiceStatus;

    #[test]
    fn test_fan_out() {
        let bus = EventBus::new(10);
        let a = bus.subscribe();
        let b = bus.subscribe();

        bus.publish(VoiceEvent::StatusChanged(VoiceStatus::Listening));

        assert_eq!(
            a.try_recv().unwrap(),
            VoiceEvent::StatusChanged(VoiceStatus::Listening)
        );
        assert_eq!(
            b.try_recv().unwrap(),
            VoiceEvent::StatusChanged(VoiceStatus::Listening)
        );
    }

    #[test]
    fn test_lagging_subscriber_keeps_every_event() {
        let bus = EventBus::new(1);
        let rx = bus.subscribe();

        bus.publish(VoiceEvent::StatusChanged(VoiceStatus::Listening));
        bus.publish(VoiceEvent::StatusChanged(VoiceStatus::Processing));
        bus.publish(VoiceEvent::Shutdown);

        let received: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            received,
            vec![
                VoiceEvent::StatusChanged(VoiceStatus::Listening),
                VoiceEvent::StatusChanged(VoiceStatus::Processing),
                VoiceEvent::Shutdown,
            ]
        );
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn test_dropped_subscriber_removed() {
        let bus = EventBus::new(4);
        let rx = bus.subscribe();
        let _kept = bus.subscribe();
        drop(rx);

        bus.publish(VoiceEvent::Shutdown);
        assert_eq!(bus.subscriber_count(), 1);
    }
}
