use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::models::event::RecorderEvent;

/// Fan-out of session events to any number of subscribers.
///
/// Channels are unbounded, so emitting never blocks a pipeline thread.
/// Subscribers that dropped their receiver are pruned on the next emit.
#[derive(Clone, Default)]
pub struct EventHub {
    subscribers: Arc<Mutex<Vec<Sender<RecorderEvent>>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<RecorderEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn emit(&self, event: RecorderEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::state::SessionState;

    #[test]
    fn every_subscriber_sees_every_event() {
        let hub = EventHub::new();
        let a = hub.subscribe();
        let b = hub.subscribe();

        hub.emit(RecorderEvent::StatusChanged(SessionState::Recording));

        assert_eq!(a.try_recv().unwrap(), RecorderEvent::StatusChanged(SessionState::Recording));
        assert_eq!(b.try_recv().unwrap(), RecorderEvent::StatusChanged(SessionState::Recording));
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let hub = EventHub::new();
        let kept = hub.subscribe();
        drop(hub.subscribe());

        hub.emit(RecorderEvent::RecordingFailed("x".into()));

        assert_eq!(hub.subscriber_count(), 1);
        assert!(kept.try_recv().is_ok());
    }
}
