//! Outgoing playback notifications for collaborators such as an external
//! audio player that has to follow play/pause/seek.

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::types::CameraState;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackEvent {
    Play { time: f64 },
    Pause { time: f64 },
    Seek { time: f64 },
    CameraChanged(CameraState),
}

/// Fan-out publisher. Each subscriber gets its own unbounded channel.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<Sender<PlaybackEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Receiver<PlaybackEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Delivers `event` to every live subscriber and drops the ones whose
    /// receiver is gone.
    pub fn publish(&mut self, event: PlaybackEvent) {
        self.subscribers.retain(|tx| tx.send(event).is_ok());
        tracing::trace!(?event, subscribers = self.subscribers.len(), "published playback event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CameraMode;

    #[test]
    fn every_subscriber_sees_every_event() {
        let mut bus = EventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();
        bus.publish(PlaybackEvent::Play { time: 0.0 });
        bus.publish(PlaybackEvent::CameraChanged(CameraState::new(
            CameraMode::TiltedDome,
            30.0,
        )));

        for rx in [&a, &b] {
            let events: Vec<_> = rx.try_iter().collect();
            assert_eq!(events.len(), 2);
            assert_eq!(events[0], PlaybackEvent::Play { time: 0.0 });
        }
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let mut bus = EventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.subscriber_count(), 2);
        bus.publish(PlaybackEvent::Seek { time: 2.0 });
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(kept.try_recv(), Ok(PlaybackEvent::Seek { time: 2.0 }));
    }
}
