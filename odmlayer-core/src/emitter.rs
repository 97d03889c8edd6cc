//! Change event emission.
//!
//! Emission is fire-and-forget: emitters never report failures back to the repository
//! operation that produced the event.

use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use parking_lot::Mutex;
use std::fmt::Debug;

use crate::changes::ChangeEvent;

/// Receiver of repository change events.
pub trait EventEmitter: Send + Sync + Debug {
    /// Publishes a lifecycle event (create, delete).
    fn emit(&self, event_name: &str, event: ChangeEvent);

    /// Publishes an update event carrying a change set.
    fn changes(&self, event_name: &str, event: ChangeEvent);
}

/// Emitter that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEmitter;

impl EventEmitter for NoopEmitter {
    fn emit(&self, _event_name: &str, _event: ChangeEvent) {}

    fn changes(&self, _event_name: &str, _event: ChangeEvent) {}
}

/// Which of the two emitter channels an event went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Emit,
    Changes,
}

/// An event as delivered to [`ChannelEmitter`] subscribers.
#[derive(Debug, Clone)]
pub struct EmittedEvent {
    pub channel: Channel,
    pub name: String,
    pub event: ChangeEvent,
}

/// Fans events out to any number of unbounded channel subscribers.
///
/// Subscribers whose receiver was dropped are removed on the next emission.
#[derive(Debug, Default)]
pub struct ChannelEmitter {
    subscribers: Mutex<Vec<UnboundedSender<EmittedEvent>>>,
}

impl ChannelEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscriber and returns its receiving end.
    pub fn subscribe(&self) -> UnboundedReceiver<EmittedEvent> {
        let (sender, receiver) = unbounded();
        self.subscribers.lock().push(sender);
        receiver
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    fn publish(&self, channel: Channel, name: &str, event: ChangeEvent) {
        let mut subscribers = self.subscribers.lock();

        subscribers.retain(|subscriber| {
            let delivered = subscriber.unbounded_send(EmittedEvent {
                channel,
                name: name.to_string(),
                event: event.clone(),
            });

            if let Err(e) = &delivered {
                log::warn!("dropping closed subscriber for {}: {}", name, e);
            }

            delivered.is_ok()
        });
    }
}

impl EventEmitter for ChannelEmitter {
    fn emit(&self, event_name: &str, event: ChangeEvent) {
        self.publish(Channel::Emit, event_name, event);
    }

    fn changes(&self, event_name: &str, event: ChangeEvent) {
        self.publish(Channel::Changes, event_name, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::ChangeKind;
    use bson::doc;
    use futures::{StreamExt, executor::block_on};

    #[test]
    fn delivers_to_every_subscriber() {
        let emitter = ChannelEmitter::new();
        let mut first = emitter.subscribe();
        let mut second = emitter.subscribe();

        emitter.changes("update::Alert", ChangeEvent::new(ChangeKind::Update, "Alert", None, doc! {}));

        for receiver in [&mut first, &mut second] {
            let delivered = block_on(receiver.next()).unwrap();
            assert_eq!(delivered.channel, Channel::Changes);
            assert_eq!(delivered.name, "update::Alert");
        }
    }

    #[test]
    fn closed_subscribers_are_dropped() {
        let emitter = ChannelEmitter::new();
        let receiver = emitter.subscribe();
        drop(receiver);

        emitter.emit("create::Alert", ChangeEvent::new(ChangeKind::Create, "Alert", None, doc! {}));

        assert_eq!(emitter.subscriber_count(), 0);
    }
}
