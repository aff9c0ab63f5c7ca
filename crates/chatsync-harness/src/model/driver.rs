//! Drives a real session and the model in lockstep.

use std::sync::Arc;

use chatsync_app::{ChatService, CoordinatorConfig, Lifecycle, StreamCoordinator};
use chatsync_core::{ChatKind, EntityKind, SubscriptionKey, SyncError, path};
use serde_json::Value;

use super::{ModelChat, ModelMessage, ObservableState, Operation};
use crate::{
    MemoryStore, SimEnv,
    invariants::{InvariantRegistry, Violation},
};

/// Session user.
pub const USER: &str = "alice";
/// Other participant of the private chat.
pub const PEER: &str = "bob";

/// A private chat screen open for [`USER`], with the model alongside.
///
/// Every operation is applied to the store through [`ChatService`], then the
/// coordinator is pumped so the rendered state reflects every resulting
/// delivery before the next operation.
pub struct SessionDriver {
    store: Arc<MemoryStore>,
    env: SimEnv,
    coordinator: StreamCoordinator<MemoryStore>,
    user: ChatService<MemoryStore, SimEnv>,
    peer: ChatService<MemoryStore, SimEnv>,
    chat_id: String,
    model: ModelChat,
    invariants: InvariantRegistry,
}

impl SessionDriver {
    /// Open the chat between [`USER`] and [`PEER`] and start its message
    /// stream.
    pub async fn start(seed: u64, config: CoordinatorConfig) -> Result<Self, SyncError> {
        let store = Arc::new(MemoryStore::new());
        let env = SimEnv::with_seed(seed);
        let user = ChatService::new(Arc::clone(&store), env.clone(), USER, &config);
        let peer = ChatService::new(Arc::clone(&store), env.clone(), PEER, &config);

        let chat_id = user.start_private_chat(PEER, "Alice", "Bob").await?;
        let model = ModelChat::new(config.first_page_size, config.page_size, config.excerpt_len);

        let mut coordinator = StreamCoordinator::new(Arc::clone(&store), USER, config)?;
        coordinator.start_or_stop(EntityKind::Messages, &chat_id, Lifecycle::Start)?;
        coordinator.start_or_stop(
            EntityKind::Memberships(ChatKind::Private),
            USER,
            Lifecycle::Start,
        )?;
        coordinator.pump();

        tracing::debug!(seed, %chat_id, "session started");
        Ok(Self {
            store,
            env,
            coordinator,
            user,
            peer,
            chat_id,
            model,
            invariants: InvariantRegistry::standard(),
        })
    }

    /// Apply `op` to the real session and the model.
    pub async fn apply(&mut self, op: &Operation) -> Result<(), SyncError> {
        const KIND: ChatKind = ChatKind::Private;

        match *op {
            Operation::Send { from_peer, text } => {
                let service = if from_peer { &self.peer } else { &self.user };
                let text = text.text();
                let timestamp = service.send_message(KIND, &self.chat_id, None, &text).await?;
                self.model.send(timestamp, &text);
            },
            Operation::EditNewest { text } => {
                let Some(messages) = self.coordinator.messages(&self.chat_id) else {
                    return Ok(());
                };
                let Some(newest) = messages.newest() else {
                    return Ok(());
                };
                let text = text.text();
                self.user.edit_message(KIND, &self.chat_id, messages, &newest.id, &text).await?;
                self.model.edit_newest(&text);
            },
            Operation::DeleteNewest | Operation::DeleteOldest => {
                let Some(messages) = self.coordinator.messages(&self.chat_id) else {
                    return Ok(());
                };
                let target = match op {
                    Operation::DeleteNewest => messages.newest(),
                    _ => messages.iter().next(),
                };
                let Some(target) = target else {
                    return Ok(());
                };
                self.user.delete_message(KIND, &self.chat_id, messages, &target.id).await?;
                if matches!(op, Operation::DeleteNewest) {
                    self.model.delete_newest();
                } else {
                    self.model.delete_oldest();
                }
            },
            Operation::ScrollToTop => {
                let loaded = self.coordinator.messages(&self.chat_id).map_or(0, |m| m.len());
                self.coordinator.load_more(
                    EntityKind::Messages,
                    &self.chat_id,
                    loaded.checked_sub(1),
                )?;
                self.model.scroll_to_top();
            },
            Operation::Resume => self.message_stream(Lifecycle::Resume)?,
            Operation::Restart => {
                self.message_stream(Lifecycle::Stop)?;
                self.message_stream(Lifecycle::Start)?;
            },
            Operation::AdvanceTime { millis } => self.env.advance(i64::from(millis)),
        }

        self.coordinator.pump();
        Ok(())
    }

    fn message_stream(&mut self, lifecycle: Lifecycle) -> Result<(), SyncError> {
        self.coordinator.start_or_stop(EntityKind::Messages, &self.chat_id, lifecycle)
    }

    /// Observable state of the real session.
    pub fn observe(&self) -> ObservableState {
        let messages = self
            .coordinator
            .messages(&self.chat_id)
            .map(|collection| {
                collection
                    .iter()
                    .map(|m| ModelMessage {
                        timestamp: m.timestamp_millis,
                        text: m.text.clone(),
                        edited: m.edited,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let window = SubscriptionKey::new(EntityKind::Messages, self.chat_id.as_str())
            .ok()
            .and_then(|key| self.coordinator.tracker(&key).map(|t| t.window_size()))
            .unwrap_or(0);

        ObservableState { messages, window, last_message: self.last_message(USER) }
    }

    /// Last-message excerpt stored on `user_id`'s copy of the chat.
    pub fn last_message(&self, user_id: &str) -> String {
        let field = path::private_chat(user_id, &self.chat_id).child("lastMessage");
        match self.store.get(&field) {
            Some(Value::String(text)) => text,
            _ => String::new(),
        }
    }

    /// The reference model.
    pub fn model(&self) -> &ModelChat {
        &self.model
    }

    /// Run the standard invariants against the current session state.
    pub fn check_invariants(&self) -> Result<(), Vec<Violation>> {
        self.invariants.check_session(&self.coordinator, Some(self.store.live_count()))
    }

    /// The session's coordinator.
    pub fn coordinator(&self) -> &StreamCoordinator<MemoryStore> {
        &self.coordinator
    }

    /// The shared store.
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Id of the open chat.
    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }
}
