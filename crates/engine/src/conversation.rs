//! A single bot conversation.
//!
//! The conversation owns the bounded message history and everything derived
//! from it: sequence stamping, the memory-context digest, staged prompt
//! assembly, and the update events other components react to. All methods
//! take `&self`; state lives behind an async mutex so a conversation can be
//! shared between a client loop and a chain.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use futures::future::BoxFuture;
use palaver_core::{
    ChatBackend, ConvMessage, ConversationEvent, ConversationId, Error, EventBus, MemoryStore,
    Role,
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

use crate::budget::append_within_budget;
use crate::debounce::Debounce;
use crate::history::HistoryBuffer;
use crate::prompt::BotProfile;

/// Async callback driven after each settled burst of updates, in
/// registration order. Chains register their forwarding edges here.
pub type DelayedHandler = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

struct ConversationState {
    rotating: HistoryBuffer<ConvMessage>,
    pinned: Vec<ConvMessage>,
    /// Next sequence to stamp. Survives `clear()` so forwarding cursors
    /// held by chains stay monotone.
    next_sequence: u64,
    /// Rendered non-system tail of the rotating history; the memory store
    /// lookup key. Empty when no memory is wired or nothing memorable
    /// happened yet.
    digest: String,
}

/// One bot's view of one ongoing exchange.
pub struct Conversation {
    id: ConversationId,
    profile: BotProfile,
    backend: Arc<dyn ChatBackend>,
    memory: Option<Arc<dyn MemoryStore>>,
    tools_reference: String,
    fixed_context: Option<String>,
    state: Mutex<ConversationState>,
    events: EventBus<ConversationEvent>,
    debounce: Debounce,
    handlers: Arc<StdMutex<Vec<(u64, DelayedHandler)>>>,
    next_handler: AtomicU64,
}

impl Conversation {
    pub fn new(
        profile: BotProfile,
        backend: Arc<dyn ChatBackend>,
        history_capacity: usize,
        process_delay: Duration,
    ) -> Self {
        Self {
            id: ConversationId::new(),
            profile,
            backend,
            memory: None,
            tools_reference: String::new(),
            fixed_context: None,
            state: Mutex::new(ConversationState {
                rotating: HistoryBuffer::new(history_capacity),
                pinned: Vec::new(),
                next_sequence: 1,
                digest: String::new(),
            }),
            events: EventBus::default(),
            debounce: Debounce::new(process_delay),
            handlers: Arc::new(StdMutex::new(Vec::new())),
            next_handler: AtomicU64::new(1),
        }
    }

    pub fn with_id(mut self, id: ConversationId) -> Self {
        self.id = id;
        self
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Rendered command documentation substituted for `{tools}` in the
    /// context template.
    pub fn with_tools_reference(mut self, doc: impl Into<String>) -> Self {
        self.tools_reference = doc.into();
        self
    }

    /// Replace the profile-built context block with a fixed one.
    pub fn with_fixed_context(mut self, context: impl Into<String>) -> Self {
        self.fixed_context = Some(context.into());
        self
    }

    pub fn id(&self) -> &ConversationId {
        &self.id
    }

    pub fn profile(&self) -> &BotProfile {
        &self.profile
    }

    pub fn backend(&self) -> &Arc<dyn ChatBackend> {
        &self.backend
    }

    pub fn memory(&self) -> Option<&Arc<dyn MemoryStore>> {
        self.memory.as_ref()
    }

    pub fn events(&self) -> &EventBus<ConversationEvent> {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.events.subscribe()
    }

    /// The current memory-context digest.
    pub async fn digest(&self) -> String {
        self.state.lock().await.digest.clone()
    }

    /// Append messages to the rotating history, stamping sequences.
    ///
    /// An empty batch is ignored entirely. Otherwise the digest is
    /// refreshed, `Updated` fires once for the whole batch, and the delayed
    /// notification is re-armed — rapid calls collapse into a single
    /// `UpdatedDelayed` at last-push + delay.
    pub async fn push(&self, messages: Vec<ConvMessage>) {
        if messages.is_empty() {
            return;
        }
        {
            let mut state = self.state.lock().await;
            for mut message in messages {
                message.sequence = state.next_sequence;
                state.next_sequence += 1;
                state.rotating.push(message);
            }
        }
        self.after_insert().await;
    }

    /// Append messages to the pinned list. Pinned messages share the
    /// conversation's sequence numbering but are never evicted.
    pub async fn push_pinned(&self, messages: Vec<ConvMessage>) {
        if messages.is_empty() {
            return;
        }
        {
            let mut state = self.state.lock().await;
            for mut message in messages {
                message.sequence = state.next_sequence;
                state.next_sequence += 1;
                state.pinned.push(message);
            }
        }
        self.after_insert().await;
    }

    async fn after_insert(&self) {
        self.refresh_digest().await;
        self.events.publish(ConversationEvent::Updated);
        self.schedule_delayed();
    }

    /// All messages (pinned and rotating) with a sequence strictly greater
    /// than `cursor`, in sequence order. `None` returns everything still
    /// held — messages already evicted from the rotating buffer are gone.
    pub async fn messages_after(&self, cursor: Option<u64>) -> Vec<ConvMessage> {
        let state = self.state.lock().await;
        let mut messages: Vec<ConvMessage> = state
            .pinned
            .iter()
            .chain(state.rotating.iter())
            .filter(|m| cursor.is_none_or(|c| m.sequence > c))
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.sequence);
        messages
    }

    /// Empty the history and digest and drop any pending delayed
    /// notification. The sequence counter keeps counting.
    pub async fn clear(&self) {
        {
            let mut state = self.state.lock().await;
            state.rotating.clear();
            state.pinned.clear();
            state.digest.clear();
        }
        self.debounce.cancel();
        debug!(conversation = %self.id, "history cleared");
        self.events.publish(ConversationEvent::Cleared);
    }

    /// Register a handler for settled update bursts. Returns an id for
    /// [`Conversation::remove_updated_handler`].
    pub fn on_updated_delayed<F>(&self, handler: F) -> u64
    where
        F: Fn() -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        let id = self.next_handler.fetch_add(1, Ordering::Relaxed);
        let mut handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
        handlers.push((id, Arc::new(handler)));
        id
    }

    pub fn remove_updated_handler(&self, id: u64) {
        let mut handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
        handlers.retain(|(registered, _)| *registered != id);
    }

    fn schedule_delayed(&self) {
        let events = self.events.clone();
        let handlers = Arc::clone(&self.handlers);
        self.debounce.poke(async move {
            events.publish(ConversationEvent::UpdatedDelayed);
            let snapshot: Vec<DelayedHandler> = {
                let guard = handlers.lock().unwrap_or_else(|e| e.into_inner());
                guard.iter().map(|(_, h)| Arc::clone(h)).collect()
            };
            for handler in snapshot {
                (*handler)().await;
            }
        });
    }

    /// Recompute the digest from the non-system rotating tail, rendered
    /// through the shared prompt path. On a counting failure the previous
    /// digest is kept rather than corrupted.
    async fn refresh_digest(&self) {
        if self.memory.is_none() {
            return;
        }
        let tail: Vec<ConvMessage> = {
            let state = self.state.lock().await;
            state
                .rotating
                .iter()
                .filter(|m| m.role != Role::System)
                .cloned()
                .collect()
        };
        if tail.is_empty() {
            self.state.lock().await.digest.clear();
            return;
        }

        let render = |messages: &[ConvMessage]| self.profile.render_prompt(messages, false);
        let mut scratch = Vec::new();
        match append_within_budget(&mut scratch, &tail, None, self.backend.as_ref(), &render).await
        {
            Ok(digest) => self.state.lock().await.digest = digest,
            Err(error) => warn!(conversation = %self.id, %error, "keeping stale memory digest"),
        }
    }

    /// Assemble the staged prompt: context block, memory excerpts, pinned
    /// messages, then as much recent history as fits with `max_new_tokens`
    /// reserved for the reply. Each stage appends to the running target so
    /// later stages truncate against everything already admitted.
    pub async fn assemble_prompt(&self) -> Result<Vec<ConvMessage>, Error> {
        let (below_capacity, rotating, pinned, digest) = {
            let state = self.state.lock().await;
            (
                !state.rotating.is_full(),
                state.rotating.iter().cloned().collect::<Vec<_>>(),
                state.pinned.clone(),
                state.digest.clone(),
            )
        };

        let context = self.profile.build_context(
            self.fixed_context.as_deref(),
            &self.tools_reference,
            below_capacity,
        );
        let render = |messages: &[ConvMessage]| self.profile.render_prompt(messages, true);
        let backend = self.backend.as_ref();
        let mut target = Vec::new();

        append_within_budget(
            &mut target,
            &[ConvMessage::system(context)],
            None,
            backend,
            &render,
        )
        .await?;

        if let Some(memory) = &self.memory {
            if !digest.is_empty() {
                let excerpts = memory.get(&digest, self.profile.memory_excerpts).await?;
                if !excerpts.is_empty() {
                    debug!(conversation = %self.id, excerpts = excerpts.len(), "memory excerpts fetched");
                    let memories: Vec<ConvMessage> = excerpts
                        .into_iter()
                        .map(|text| ConvMessage::new(Role::System, "memory", text))
                        .collect();
                    let budget =
                        (backend.max_tokens() as f32 * self.profile.memory_fraction) as i64;
                    append_within_budget(&mut target, &memories, Some(budget), backend, &render)
                        .await?;
                }
            }
        }

        target.extend(pinned);
        let reserve = -(self.profile.max_new_tokens as i64);
        append_within_budget(&mut target, &rotating, Some(reserve), backend, &render).await?;
        Ok(target)
    }

    /// The assembled prompt as the final rendered text.
    pub async fn assemble_prompt_string(&self) -> Result<String, Error> {
        let messages = self.assemble_prompt().await?;
        Ok(self.profile.render_prompt(&messages, true))
    }
}
