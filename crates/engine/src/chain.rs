//! Conversation chains.
//!
//! A chain arranges conversations in a directed ring: each member forwards
//! its settled updates to the next one, so two or more bots can talk to each
//! other (and to people) through ordinary conversation history. One shared
//! gate keeps at most one chat turn in flight across the whole ring; pushes
//! and forwards always land immediately, only turn triggers are dropped
//! while busy.

use std::sync::{Arc, Mutex as StdMutex, Weak};

use palaver_core::{ChainEvent, ConvMessage, ConversationEvent, ConversationId, EventBus, Role};
use tokio::sync::{broadcast, Mutex, Semaphore};
use tracing::{debug, warn};

use crate::conversation::Conversation;
use crate::turn::TurnController;

/// One directed forwarding edge. The cursor lives inside the handler
/// closure registered on the source; the edge record only exists so
/// relinking can find and detach it.
struct Edge {
    source: ConversationId,
    destination: ConversationId,
    handler_id: u64,
}

/// A directed ring of conversations sharing one turn gate.
pub struct ConversationChain {
    weak_self: Weak<ConversationChain>,
    controller: TurnController,
    members: StdMutex<Vec<Arc<Conversation>>>,
    edges: StdMutex<Vec<Edge>>,
    gate: Semaphore,
    active: StdMutex<Option<ConversationId>>,
    events: EventBus<ChainEvent>,
}

impl ConversationChain {
    pub fn new(controller: TurnController) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            weak_self: Weak::clone(weak),
            controller,
            members: StdMutex::new(Vec::new()),
            edges: StdMutex::new(Vec::new()),
            gate: Semaphore::new(1),
            active: StdMutex::new(None),
            events: EventBus::default(),
        })
    }

    pub fn len(&self) -> usize {
        self.members().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members().is_empty()
    }

    /// Snapshot of the members in ring order.
    pub fn members(&self) -> Vec<Arc<Conversation>> {
        let members = self.members.lock().unwrap_or_else(|e| e.into_inner());
        members.clone()
    }

    pub fn member(&self, id: &ConversationId) -> Option<Arc<Conversation>> {
        let members = self.members.lock().unwrap_or_else(|e| e.into_inner());
        members.iter().find(|c| c.id() == id).cloned()
    }

    pub fn contains(&self, id: &ConversationId) -> bool {
        self.member(id).is_some()
    }

    /// The member whose turn is currently in flight, if any.
    pub fn active(&self) -> Option<ConversationId> {
        self.active.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn events(&self) -> &EventBus<ChainEvent> {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.events.subscribe()
    }

    /// Append a conversation at the ring tail, just before the head.
    ///
    /// For the second and later members this detaches the old tail→head
    /// edge and creates tail→new and new→head. Must be called from within a
    /// tokio runtime.
    pub fn add_conversation(&self, conversation: Arc<Conversation>) {
        let linked = {
            let mut members = self.members.lock().unwrap_or_else(|e| e.into_inner());
            let pair = match members.as_slice() {
                [] => None,
                [only] => Some((Arc::clone(only), Arc::clone(only))),
                [head, .., tail] => Some((Arc::clone(head), Arc::clone(tail))),
            };
            members.push(Arc::clone(&conversation));
            pair
        };

        if let Some((head, tail)) = linked {
            let fresh = [
                self.link(&tail, &conversation),
                self.link(&conversation, &head),
            ];
            let mut edges = self.edges.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(stale) = edges
                .iter()
                .position(|e| e.source == *tail.id() && e.destination == *head.id())
            {
                let edge = edges.remove(stale);
                tail.remove_updated_handler(edge.handler_id);
            }
            edges.extend(fresh);
        }

        self.spawn_relay(&conversation);
        debug!(conversation = %conversation.id(), members = self.len(), "conversation joined the chain");
    }

    /// Detach a member, relinking its two neighbors. Edges are detached
    /// before the node leaves the ring so no firing lands on a dangling
    /// destination.
    pub fn remove_conversation(&self, id: &ConversationId) -> Option<Arc<Conversation>> {
        let (removed, previous, next, remaining) = {
            let members = self.members.lock().unwrap_or_else(|e| e.into_inner());
            let position = members.iter().position(|c| c.id() == id)?;
            let count = members.len();
            (
                Arc::clone(&members[position]),
                Arc::clone(&members[(position + count - 1) % count]),
                Arc::clone(&members[(position + 1) % count]),
                count - 1,
            )
        };

        {
            let mut edges = self.edges.lock().unwrap_or_else(|e| e.into_inner());
            let mut index = 0;
            while index < edges.len() {
                if edges[index].source == *id || edges[index].destination == *id {
                    let edge = edges.remove(index);
                    let owner = if edge.source == *id { &removed } else { &previous };
                    owner.remove_updated_handler(edge.handler_id);
                } else {
                    index += 1;
                }
            }
            if remaining >= 2 {
                edges.push(self.link(&previous, &next));
            }
        }

        {
            let mut members = self.members.lock().unwrap_or_else(|e| e.into_inner());
            members.retain(|c| c.id() != id);
        }
        debug!(conversation = %id, members = self.len(), "conversation left the chain");
        Some(removed)
    }

    /// Run one turn for `conversation` unless a turn is already in flight
    /// anywhere in the chain, in which case this is a no-op.
    pub async fn chat(&self, conversation: &Arc<Conversation>) {
        if !self.contains(conversation.id()) {
            debug!(conversation = %conversation.id(), "chat target is not a chain member");
            return;
        }
        let Ok(_permit) = self.gate.try_acquire() else {
            debug!(conversation = %conversation.id(), "chain busy, chat trigger dropped");
            return;
        };

        let id = conversation.id().clone();
        *self.active.lock().unwrap_or_else(|e| e.into_inner()) = Some(id.clone());
        self.events.publish(ChainEvent::Chatting(id.clone()));

        self.controller.run(conversation).await;

        *self.active.lock().unwrap_or_else(|e| e.into_inner()) = None;
        self.events.publish(ChainEvent::ChatComplete(id));
    }

    pub async fn chat_member(&self, id: &ConversationId) {
        if let Some(conversation) = self.member(id) {
            self.chat(&conversation).await;
        }
    }

    /// Route an inbound message into the ring: to the member after the one
    /// currently chatting, or to the head when idle. Returns the receiving
    /// member's id so callers can trigger a turn on an idle chain.
    pub async fn push(&self, message: ConvMessage) -> Option<ConversationId> {
        let active = self.active();
        let target = {
            let members = self.members.lock().unwrap_or_else(|e| e.into_inner());
            if members.is_empty() {
                return None;
            }
            let index = active
                .and_then(|active_id| members.iter().position(|c| *c.id() == active_id))
                .map(|position| (position + 1) % members.len())
                .unwrap_or(0);
            Arc::clone(&members[index])
        };
        target.push(vec![message]).await;
        Some(target.id().clone())
    }

    /// Clear every member's history.
    pub async fn clear(&self) {
        for member in self.members() {
            member.clear().await;
        }
    }

    /// Register the forwarding handler for one directed edge on its source.
    fn link(&self, source: &Arc<Conversation>, destination: &Arc<Conversation>) -> Edge {
        let cursor: Arc<Mutex<Option<u64>>> = Arc::new(Mutex::new(None));
        let handler_id = source.on_updated_delayed({
            let chain = Weak::clone(&self.weak_self);
            let source = Arc::clone(source);
            let destination = Arc::clone(destination);
            move || {
                let chain = Weak::clone(&chain);
                let source = Arc::clone(&source);
                let destination = Arc::clone(&destination);
                let cursor = Arc::clone(&cursor);
                Box::pin(async move {
                    forward_edge(chain, source, destination, cursor).await;
                })
            }
        });
        debug!(source = %source.id(), destination = %destination.id(), "chain edge linked");
        Edge {
            source: source.id().clone(),
            destination: destination.id().clone(),
            handler_id,
        }
    }

    /// Relay a member's `Updated` events as chain events until the member
    /// leaves the chain or the chain is dropped.
    fn spawn_relay(&self, conversation: &Arc<Conversation>) {
        let chain = Weak::clone(&self.weak_self);
        let id = conversation.id().clone();
        let mut events = conversation.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ConversationEvent::Updated) => {
                        let Some(chain) = chain.upgrade() else { break };
                        if !chain.contains(&id) {
                            break;
                        }
                        chain.events.publish(ChainEvent::Updated(id.clone()));
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(conversation = %id, skipped, "event relay lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}

/// Forward everything the source accumulated past this edge's cursor.
///
/// Roles normalize on the way over: the source's `user` and `assistant`
/// messages both arrive as `user` (another bot's reply is just input here),
/// `system` passes through. Destination turns are only triggered by
/// forwarded `user`-role messages, and only when the chain is idle — busy
/// chains keep the messages and rely on a later firing to chat.
async fn forward_edge(
    chain: Weak<ConversationChain>,
    source: Arc<Conversation>,
    destination: Arc<Conversation>,
    cursor: Arc<Mutex<Option<u64>>>,
) {
    let Some(chain) = chain.upgrade() else {
        return;
    };

    let mut last_forwarded = cursor.lock().await;
    let pending = source.messages_after(*last_forwarded).await;
    let Some(latest) = pending.last().map(|m| m.sequence) else {
        return;
    };

    let mut batch = Vec::with_capacity(pending.len());
    let mut has_user = false;
    for message in &pending {
        let forwarded = match message.role {
            Role::System => {
                ConvMessage::new(Role::System, message.sender.clone(), message.content.clone())
            }
            _ => ConvMessage::user(message.sender.clone(), message.content.clone()),
        };
        has_user |= forwarded.role == Role::User;
        batch.push(forwarded);
    }

    debug!(
        source = %source.id(),
        destination = %destination.id(),
        forwarded = batch.len(),
        "forwarding along chain edge"
    );
    *last_forwarded = Some(latest);
    destination.push(batch).await;
    drop(last_forwarded);

    if has_user {
        chain.chat(&destination).await;
    }
}
