//! Observable state snapshots for invariant checking.
//!
//! Snapshots capture the observable state of a session at a point in time.
//! Invariants operate on snapshots rather than live state to ensure
//! consistent, atomic checks.

use std::collections::BTreeMap;

use chatsync_app::StreamCoordinator;
use chatsync_core::{BackingStore, ChatEntry, EntityKind, SubscriptionKey};
use serde::Serialize;

/// Snapshot of one session's rendered state and live subscriptions.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSnapshot {
    /// Whether deleted chats are configured to render.
    pub show_deleted: bool,
    /// Chat list rows in render order.
    pub chats: Vec<ChatRow>,
    /// Public directory rows in render order.
    pub directory: Vec<ChatRow>,
    /// Per chat, `(timestamp, id)` of each message in render order.
    pub messages: BTreeMap<String, Vec<(i64, String)>>,
    /// Live registry entries as `(key, handle id)`, sorted by key.
    pub subscriptions: Vec<(String, u64)>,
    /// Live subscriptions reported by the store. `None` if not captured.
    pub store_live: Option<usize>,
    /// Window of every paginated stream started so far.
    pub windows: Vec<WindowRow>,
}

/// One rendered chat row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRow {
    /// Chat id.
    pub id: String,
    /// Last-message timestamp.
    pub timestamp: i64,
    /// Metadata has been deleted.
    pub deleted: bool,
}

impl From<&ChatEntry> for ChatRow {
    fn from(entry: &ChatEntry) -> Self {
        Self { id: entry.id.clone(), timestamp: entry.timestamp_millis, deleted: entry.is_deleted() }
    }
}

/// Window of one paginated stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowRow {
    /// Stream key.
    pub key: String,
    /// Current window size. 0 before the first start.
    pub size: usize,
    /// Configured first page.
    pub first_page_size: usize,
    /// Configured growth step.
    pub page_size: usize,
}

impl SessionSnapshot {
    /// Capture the observable state of `coordinator`.
    pub fn capture<S: BackingStore>(coordinator: &StreamCoordinator<S>) -> Self {
        let config = coordinator.config();

        let mut messages = BTreeMap::new();
        let message_streams =
            coordinator.trackers().map(|(key, _)| key).filter(|key| key.kind() == EntityKind::Messages);
        for chat_id in message_streams.map(SubscriptionKey::scope) {
            if let Some(collection) = coordinator.messages(chat_id) {
                let rows = collection.iter().map(|m| (m.timestamp_millis, m.id.clone())).collect();
                messages.insert(chat_id.to_owned(), rows);
            }
        }

        let registry = coordinator.registry();
        let mut subscriptions: Vec<(String, u64)> = registry
            .keys()
            .filter_map(|key| registry.handle(key).map(|handle| (key.to_string(), handle.id())))
            .collect();
        subscriptions.sort();

        let mut windows: Vec<WindowRow> = coordinator
            .trackers()
            .map(|(key, tracker)| WindowRow {
                key: key.to_string(),
                size: tracker.window_size(),
                first_page_size: config.first_page_size,
                page_size: config.page_size,
            })
            .collect();
        windows.sort_by(|a, b| a.key.cmp(&b.key));

        Self {
            show_deleted: config.show_deleted_chats,
            chats: coordinator.chats().into_iter().map(ChatRow::from).collect(),
            directory: coordinator.directory().into_iter().map(ChatRow::from).collect(),
            messages,
            subscriptions,
            store_live: None,
            windows,
        }
    }

    /// Record the store's live subscription count.
    #[must_use]
    pub fn with_store_live(mut self, live: usize) -> Self {
        self.store_live = Some(live);
        self
    }
}
