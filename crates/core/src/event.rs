//! Typed event publishing.
//!
//! Conversations and chains publish closed event enums over a broadcast
//! channel. There are no string topics anywhere: subscribers match on the
//! variants and the compiler knows the full set.

use tokio::sync::broadcast;

use crate::message::ConversationId;

/// Everything a single conversation can announce.
///
/// `Updated` fires once per push, after the memory digest has been
/// refreshed. `UpdatedDelayed` fires once per settled burst of pushes, after
/// the configured process delay. `Cleared` fires when the history is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationEvent {
    Updated,
    UpdatedDelayed,
    Cleared,
}

/// Chain-level announcements, tagged with the member they concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    /// A turn started for this member.
    Chatting(ConversationId),
    /// The in-flight turn finished (successfully or not).
    ChatComplete(ConversationId),
    /// Relay of a member's `Updated`, for clients that watch the whole ring.
    Updated(ConversationId),
}

/// A broadcast-backed publisher for one event type.
///
/// Publishing with no live subscribers is not an error; events are simply
/// dropped. Subscribers that fall behind see `RecvError::Lagged` and can
/// resynchronize from conversation state.
#[derive(Debug, Clone)]
pub struct EventBus<E> {
    sender: broadcast::Sender<E>,
}

impl<E: Clone> EventBus<E> {
    /// Create a bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: E) {
        // send() errors only when there are no receivers; that's fine.
        let _ = self.sender.send(event);
    }

    /// Subscribe to events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive() {
        let bus: EventBus<ConversationEvent> = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(ConversationEvent::Updated);
        bus.publish(ConversationEvent::UpdatedDelayed);

        assert_eq!(rx.recv().await.unwrap(), ConversationEvent::Updated);
        assert_eq!(rx.recv().await.unwrap(), ConversationEvent::UpdatedDelayed);
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_panic() {
        let bus: EventBus<ConversationEvent> = EventBus::default();
        bus.publish(ConversationEvent::Cleared);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn multiple_subscribers_each_get_events() {
        let bus: EventBus<ChainEvent> = EventBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        let id = ConversationId::from("c1");
        bus.publish(ChainEvent::Chatting(id.clone()));

        assert_eq!(a.recv().await.unwrap(), ChainEvent::Chatting(id.clone()));
        assert_eq!(b.recv().await.unwrap(), ChainEvent::Chatting(id));
    }
}
