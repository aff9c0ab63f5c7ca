//! Per-session stream coordination.
//!
//! [`StreamCoordinator`] composes the [`ListenerRegistry`] and one
//! [`BatchWindowTracker`] per paginated stream, and folds store notifications
//! into the keyed collections a screen renders.
//!
//! # Delivery queue
//!
//! The store pushes [`Delivery`] values into an unbounded channel from
//! whatever context runs its callbacks. Only the coordinator's owner drains
//! that channel ([`StreamCoordinator::pump`] or [`StreamCoordinator::recv`]),
//! so every collection has a single writer and needs no locking.
//!
//! A delivery is applied only if its handle is still registered. Once a key
//! is detached, anything its old subscription still had in flight is dropped.
//!
//! # Dependent streams
//!
//! Some streams fan out: each chat id in a membership index gets a metadata
//! subscription, and each member of a chat gets username and profile picture
//! subscriptions. Those are attached and detached as the parent's children
//! come and go, and released when the parent stops or is cancelled.
//!
//! # Empty chats
//!
//! A child stream over an empty chat never delivers anything, so a screen
//! cannot tell an empty chat from one still loading. The
//! [`EntityKind::MessagesState`] value stream watches the whole message node;
//! when it reports nothing stored, the chat gets an empty collection and its
//! message window counts as loaded.

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::Arc,
};

use chatsync_core::{
    BackingStore, BatchWindowTracker, ChatEntry, ChatKind, ChatRecord, Delivery, DeliverySink,
    EntityKind, ListenerRegistry, MessageRecord, Notification, Query, Snapshot, StoreError,
    StreamEvent, Subscription, SubscriptionKey, SyncError, ValidationError, WindowDecision, path,
};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::{
    CoordinatorConfig, SessionUpdate,
    collection::{ChatCollection, MemberCollection, MessageCollection},
    paths::paths_for,
};

/// Screen lifecycle transition passed to [`StreamCoordinator::start_or_stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Screen started. Attaches at the first page or the retained window.
    Start,
    /// App returned to the foreground. Re-attaches at the same window.
    Resume,
    /// Screen stopped. Detaches and keeps the window for the next start.
    Stop,
}

/// Live subscriptions and merged state of one screen session.
pub struct StreamCoordinator<S> {
    store: Arc<S>,
    user_id: String,
    config: CoordinatorConfig,
    registry: ListenerRegistry,
    windows: HashMap<SubscriptionKey, BatchWindowTracker>,
    /// Keys the owner started directly
    explicit: HashSet<SubscriptionKey>,
    /// Parent key → keys attached on its behalf
    dependents: HashMap<SubscriptionKey, BTreeSet<SubscriptionKey>>,
    sink: DeliverySink,
    deliveries: mpsc::UnboundedReceiver<Delivery>,
    chats: ChatCollection,
    directory: ChatCollection,
    messages: HashMap<String, MessageCollection>,
    members: HashMap<String, MemberCollection>,
    usernames: HashMap<String, String>,
    pictures: HashMap<String, String>,
    admins: HashMap<String, String>,
    member_counts: HashMap<String, u64>,
    member_flags: HashMap<String, bool>,
    empty_chats: HashMap<String, bool>,
    error_message: Option<String>,
}

impl<S: BackingStore> StreamCoordinator<S> {
    /// Create a coordinator for `user_id`'s session.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Validation`] if the configuration is invalid.
    pub fn new(
        store: Arc<S>,
        user_id: impl Into<String>,
        config: CoordinatorConfig,
    ) -> Result<Self, SyncError> {
        config.validate()?;
        let (sink, deliveries) = mpsc::unbounded_channel();
        Ok(Self {
            store,
            user_id: user_id.into(),
            config,
            registry: ListenerRegistry::new(),
            windows: HashMap::new(),
            explicit: HashSet::new(),
            dependents: HashMap::new(),
            sink,
            deliveries,
            chats: ChatCollection::new(),
            directory: ChatCollection::new(),
            messages: HashMap::new(),
            members: HashMap::new(),
            usernames: HashMap::new(),
            pictures: HashMap::new(),
            admins: HashMap::new(),
            member_counts: HashMap::new(),
            member_flags: HashMap::new(),
            empty_chats: HashMap::new(),
            error_message: None,
        })
    }

    /// Start, resume, or stop the stream `kind` scoped to `scope`.
    ///
    /// Paginated kinds consult their window tracker; the rest attach once.
    /// Stopping detaches the stream and everything attached on its behalf,
    /// and keeps loaded data and the window.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Validation`] for an empty scope, or if the key is
    /// live with a different subscription.
    pub fn start_or_stop(
        &mut self,
        kind: EntityKind,
        scope: &str,
        lifecycle: Lifecycle,
    ) -> Result<(), SyncError> {
        let key = SubscriptionKey::new(kind, scope)?;
        tracing::debug!(%key, ?lifecycle, "stream lifecycle");

        match lifecycle {
            Lifecycle::Stop => {
                self.explicit.remove(&key);
                self.stop_key(&key);
                Ok(())
            },
            Lifecycle::Start if kind.is_paged() => {
                let decision = self.tracker_mut(&key).on_initial_start();
                self.explicit.insert(key.clone());
                self.apply_window(key, decision)
            },
            Lifecycle::Resume if kind.is_paged() => {
                let decision = self.tracker_mut(&key).on_resume_from_background();
                self.explicit.insert(key.clone());
                self.apply_window(key, decision)
            },
            Lifecycle::Start => {
                self.explicit.insert(key.clone());
                self.attach(key, None)
            },
            Lifecycle::Resume => {
                self.explicit.insert(key.clone());
                self.registry.detach(&*self.store, &key);
                self.attach(key, None)
            },
        }
    }

    /// The user scrolled a paginated stream; grow its window if they reached
    /// the edge.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NotPaged`] if `kind` has no window.
    pub fn load_more(
        &mut self,
        kind: EntityKind,
        scope: &str,
        last_visible_index: Option<usize>,
    ) -> Result<(), SyncError> {
        if !kind.is_paged() {
            return Err(ValidationError::NotPaged { kind }.into());
        }
        let key = SubscriptionKey::new(kind, scope)?;
        let decision = self.tracker_mut(&key).on_scroll_near_edge(last_visible_index);
        self.explicit.insert(key.clone());
        self.apply_window(key, decision)
    }

    /// Detach every stream. `retain_windows` keeps window sizes for a
    /// screen instance that survives; otherwise they reset.
    pub fn stop_all(&mut self, retain_windows: bool) {
        let detached = self.registry.detach_all(&*self.store);
        self.explicit.clear();
        self.dependents.clear();
        for tracker in self.windows.values_mut() {
            tracker.on_stop(retain_windows);
        }
        tracing::debug!(detached, retain_windows, "session stopped");
    }

    /// Apply every queued delivery without waiting.
    pub fn pump(&mut self) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();
        while let Ok(delivery) = self.deliveries.try_recv() {
            self.dispatch(delivery, &mut updates);
        }
        updates
    }

    /// Wait for the next delivery, then apply everything queued.
    pub async fn recv(&mut self) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();
        if let Some(delivery) = self.deliveries.recv().await {
            self.dispatch(delivery, &mut updates);
        }
        while let Ok(delivery) = self.deliveries.try_recv() {
            self.dispatch(delivery, &mut updates);
        }
        updates
    }

    /// Surface a one-shot failure as the session's error message.
    pub fn report_error(&mut self, error: &SyncError) {
        tracing::warn!(%error, "operation failed");
        self.error_message = Some(error.user_message());
    }

    /// Clear the error message.
    pub fn dismiss_error(&mut self) {
        self.error_message = None;
    }

    /// Current error message. `None` if there is none.
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Session user.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Coordinator configuration.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Live subscriptions.
    pub fn registry(&self) -> &ListenerRegistry {
        &self.registry
    }

    /// Window tracker of a paginated stream. `None` if never started.
    pub fn tracker(&self, key: &SubscriptionKey) -> Option<&BatchWindowTracker> {
        self.windows.get(key)
    }

    /// Window trackers of every paginated stream started so far.
    pub fn trackers(&self) -> impl Iterator<Item = (&SubscriptionKey, &BatchWindowTracker)> + '_ {
        self.windows.iter()
    }

    /// Chat list rows, newest first.
    pub fn chats(&self) -> Vec<&ChatEntry> {
        self.chats.visible(self.config.show_deleted_chats).collect()
    }

    /// Metadata of one chat, including deleted chats.
    pub fn chat(&self, chat_id: &str) -> Option<&ChatEntry> {
        self.chats.get(chat_id)
    }

    /// Public chat directory rows, newest first.
    pub fn directory(&self) -> Vec<&ChatEntry> {
        self.directory.visible(self.config.show_deleted_chats).collect()
    }

    /// Loaded messages of a chat.
    pub fn messages(&self, chat_id: &str) -> Option<&MessageCollection> {
        self.messages.get(chat_id)
    }

    /// Whether a chat has no messages stored. `None` until its
    /// [`EntityKind::MessagesState`] stream reports.
    pub fn is_chat_empty(&self, chat_id: &str) -> Option<bool> {
        self.empty_chats.get(chat_id).copied()
    }

    /// Loaded members of a chat.
    pub fn members(&self, chat_id: &str) -> Option<&MemberCollection> {
        self.members.get(chat_id)
    }

    /// Display name of a user, if loaded.
    pub fn username(&self, user_id: &str) -> Option<&str> {
        self.usernames.get(user_id).map(String::as_str)
    }

    /// Profile picture marker of a user. `None` if the user has no picture.
    pub fn profile_picture(&self, user_id: &str) -> Option<&str> {
        self.pictures.get(user_id).map(String::as_str)
    }

    /// Admin of a public chat, if loaded.
    pub fn admin(&self, chat_id: &str) -> Option<&str> {
        self.admins.get(chat_id).map(String::as_str)
    }

    /// Check if the session user administers `chat_id`.
    pub fn is_admin(&self, chat_id: &str) -> bool {
        self.admin(chat_id) == Some(self.user_id.as_str())
    }

    /// Member count of a public chat. 0 until loaded.
    pub fn member_count(&self, chat_id: &str) -> u64 {
        self.member_counts.get(chat_id).copied().unwrap_or(0)
    }

    /// Whether the session user is a member of `chat_id`. `None` until
    /// loaded.
    pub fn is_member(&self, chat_id: &str) -> Option<bool> {
        self.member_flags.get(chat_id).copied()
    }

    fn tracker_mut(&mut self, key: &SubscriptionKey) -> &mut BatchWindowTracker {
        let (first, page) = (self.config.first_page_size, self.config.page_size);
        self.windows
            .entry(key.clone())
            .or_insert_with(|| BatchWindowTracker::with_page_sizes(first, page))
    }

    fn apply_window(
        &mut self,
        key: SubscriptionKey,
        decision: WindowDecision,
    ) -> Result<(), SyncError> {
        match decision {
            WindowDecision::Keep => Ok(()),
            WindowDecision::Attach { window, teardown } => {
                if teardown {
                    self.registry.detach(&*self.store, &key);
                }
                self.attach(key, Some(window))
            },
        }
    }

    fn attach(&mut self, key: SubscriptionKey, window: Option<usize>) -> Result<(), SyncError> {
        let subscription = self.subscription_for(&key, window);
        self.registry.attach(&*self.store, key, subscription, &self.sink)?;
        Ok(())
    }

    fn subscription_for(&self, key: &SubscriptionKey, window: Option<usize>) -> Subscription {
        let scope = key.scope();
        let window = window.unwrap_or(self.config.first_page_size);
        match key.kind() {
            EntityKind::Chat(kind) => {
                Subscription::Value(paths_for(kind).metadata(&self.user_id, scope))
            },
            EntityKind::Messages => Subscription::Children(
                Query::at(path::messages(scope)).order_by_child("timestamp").limit_to_last(window),
            ),
            EntityKind::MessagesState => Subscription::Value(path::messages(scope)),
            EntityKind::Members => {
                Subscription::Children(Query::at(path::members(scope)).limit_to_first(window))
            },
            EntityKind::PublicDirectory => {
                Subscription::Children(Query::at(path::public_chats()).limit_to_first(window))
            },
            EntityKind::Username => Subscription::Value(path::username(scope)),
            EntityKind::ProfilePicture => Subscription::Value(path::profile_picture(scope)),
            EntityKind::Memberships(kind) => {
                Subscription::Children(Query::at(paths_for(kind).memberships(scope)))
            },
            EntityKind::Admin => Subscription::Value(path::admin(scope)),
            EntityKind::MemberCount => Subscription::Value(path::member_count(scope)),
            EntityKind::MemberFlag => Subscription::Value(path::member(scope, &self.user_id)),
        }
    }

    fn stop_key(&mut self, key: &SubscriptionKey) {
        self.release_dependents(key);
        if !self.is_held(key) {
            self.registry.detach(&*self.store, key);
        }
        if let Some(tracker) = self.windows.get_mut(key) {
            tracker.on_stop(true);
        }
    }

    fn attach_dependent(&mut self, parent: &SubscriptionKey, kind: EntityKind, scope: &str) {
        let child = match SubscriptionKey::new(kind, scope) {
            Ok(child) => child,
            Err(err) => {
                tracing::warn!(%parent, error = %err, "skipping dependent stream");
                return;
            },
        };
        self.dependents.entry(parent.clone()).or_default().insert(child.clone());
        if let Err(err) = self.attach(child, None) {
            tracing::warn!(%parent, error = %err, "dependent stream not attached");
        }
    }

    fn detach_dependent(&mut self, parent: &SubscriptionKey, kind: EntityKind, scope: &str) {
        let Ok(child) = SubscriptionKey::new(kind, scope) else {
            return;
        };
        if let Some(children) = self.dependents.get_mut(parent) {
            children.remove(&child);
        }
        if !self.is_held(&child) {
            self.registry.detach(&*self.store, &child);
        }
    }

    fn release_dependents(&mut self, parent: &SubscriptionKey) {
        let Some(children) = self.dependents.remove(parent) else {
            return;
        };
        for child in children {
            if !self.is_held(&child) {
                self.registry.detach(&*self.store, &child);
            }
        }
    }

    /// Check if `key` is still wanted, directly or by a parent.
    fn is_held(&self, key: &SubscriptionKey) -> bool {
        self.explicit.contains(key) || self.dependents.values().any(|set| set.contains(key))
    }

    fn dispatch(&mut self, delivery: Delivery, updates: &mut Vec<SessionUpdate>) {
        let Some(key) = self.registry.key_for(delivery.handle).cloned() else {
            tracing::trace!(handle = %delivery.handle, "dropping delivery for detached subscription");
            return;
        };

        if let Notification::Cancelled(reason) = delivery.notification {
            self.cancel(key, reason, updates);
            return;
        }

        if let Some(tracker) = self.windows.get_mut(&key) {
            tracker.on_loaded();
        }

        let notification = delivery.notification;
        let result = match key.kind() {
            EntityKind::Chat(kind) => self.apply_chat(&key, kind, notification, updates),
            EntityKind::Messages => self.apply_messages(&key, notification, updates),
            EntityKind::MessagesState => self.apply_messages_state(&key, notification, updates),
            EntityKind::Members => self.apply_members(&key, notification, updates),
            EntityKind::PublicDirectory => self.apply_directory(notification, updates),
            EntityKind::Username => self.apply_username(&key, notification, updates),
            EntityKind::ProfilePicture => self.apply_picture(&key, notification, updates),
            EntityKind::Memberships(kind) => self.apply_memberships(&key, kind, notification, updates),
            EntityKind::Admin => self.apply_admin(&key, notification, updates),
            EntityKind::MemberCount => self.apply_member_count(&key, notification, updates),
            EntityKind::MemberFlag => self.apply_member_flag(&key, notification, updates),
        };

        if let Err(err) = result {
            tracing::warn!(%key, error = %err, "skipping undecodable snapshot");
        }
    }

    fn cancel(&mut self, key: SubscriptionKey, reason: StoreError, updates: &mut Vec<SessionUpdate>) {
        self.release_dependents(&key);
        self.registry.detach(&*self.store, &key);
        if let Some(tracker) = self.windows.get_mut(&key) {
            tracker.on_stop(true);
        }

        let error = SyncError::TransportCancelled { key, reason };
        tracing::warn!(%error, "subscription cancelled");

        let message = error.user_message();
        self.error_message = Some(message.clone());
        note(updates, SessionUpdate::Error { message });
    }

    fn apply_chat(
        &mut self,
        key: &SubscriptionKey,
        kind: ChatKind,
        notification: Notification,
        updates: &mut Vec<SessionUpdate>,
    ) -> Result<(), StoreError> {
        let Some(snapshot) = value_of(notification) else {
            return Ok(());
        };
        let chat_id = key.scope();
        let entry = match snapshot.decode::<ChatRecord>()? {
            Some(record) => ChatEntry::from_record(chat_id, &record, kind, self.config.excerpt_len),
            None => ChatEntry::deleted(chat_id, kind),
        };
        self.chats.upsert(entry);
        note(updates, SessionUpdate::ChatsChanged);
        Ok(())
    }

    fn apply_messages(
        &mut self,
        key: &SubscriptionKey,
        notification: Notification,
        updates: &mut Vec<SessionUpdate>,
    ) -> Result<(), StoreError> {
        let Some(event) = StreamEvent::<MessageRecord>::decode(notification)? else {
            return Ok(());
        };
        let usernames = &self.usernames;
        let event = event.map(|_, mut record| {
            if record.sender_username.is_none() {
                record.sender_username = usernames.get(&record.sender).cloned();
            }
            record
        });

        let chat_id = key.scope();
        if self.messages.entry(chat_id.to_owned()).or_default().apply(event) {
            note(updates, SessionUpdate::MessagesChanged { chat_id: chat_id.to_owned() });
        }
        Ok(())
    }

    fn apply_messages_state(
        &mut self,
        key: &SubscriptionKey,
        notification: Notification,
        updates: &mut Vec<SessionUpdate>,
    ) -> Result<(), StoreError> {
        let Some(snapshot) = value_of(notification) else {
            return Ok(());
        };
        let chat_id = key.scope().to_owned();
        let empty = !snapshot.exists();

        if empty {
            self.messages.entry(chat_id.clone()).or_default();
            let stream = SubscriptionKey::new(EntityKind::Messages, chat_id.as_str()).ok();
            if let Some(tracker) = stream.and_then(|stream| self.windows.get_mut(&stream)) {
                tracker.on_loaded();
            }
        }
        if self.empty_chats.insert(chat_id.clone(), empty) != Some(empty) {
            tracing::debug!(%chat_id, empty, "chat emptiness changed");
            note(updates, SessionUpdate::MessagesStateChanged { chat_id });
        }
        Ok(())
    }

    fn apply_members(
        &mut self,
        key: &SubscriptionKey,
        notification: Notification,
        updates: &mut Vec<SessionUpdate>,
    ) -> Result<(), StoreError> {
        let Some(event) = StreamEvent::<Value>::decode(notification)? else {
            return Ok(());
        };
        let chat_id = key.scope().to_owned();

        match event {
            StreamEvent::Added(user_id, _) => {
                let username = self.usernames.get(&user_id).cloned();
                if self.members.entry(chat_id.clone()).or_default().insert(&user_id, username) {
                    note(updates, SessionUpdate::MembersChanged { chat_id });
                }
                self.attach_dependent(key, EntityKind::Username, &user_id);
                self.attach_dependent(key, EntityKind::ProfilePicture, &user_id);
            },
            StreamEvent::Removed(user_id) => {
                if self.members.get_mut(&chat_id).is_some_and(|m| m.remove(&user_id)) {
                    note(updates, SessionUpdate::MembersChanged { chat_id });
                }
                self.detach_dependent(key, EntityKind::Username, &user_id);
                self.detach_dependent(key, EntityKind::ProfilePicture, &user_id);
            },
            StreamEvent::Changed(..) | StreamEvent::Cancelled(_) => {},
        }
        Ok(())
    }

    fn apply_memberships(
        &mut self,
        key: &SubscriptionKey,
        kind: ChatKind,
        notification: Notification,
        updates: &mut Vec<SessionUpdate>,
    ) -> Result<(), StoreError> {
        let Some(event) = StreamEvent::<Value>::decode(notification)? else {
            return Ok(());
        };

        match event {
            StreamEvent::Added(chat_id, _) => {
                self.attach_dependent(key, EntityKind::Chat(kind), &chat_id);
            },
            StreamEvent::Removed(chat_id) => {
                self.detach_dependent(key, EntityKind::Chat(kind), &chat_id);
                if self.chats.remove(&chat_id).is_some() {
                    note(updates, SessionUpdate::ChatsChanged);
                }
            },
            StreamEvent::Changed(..) | StreamEvent::Cancelled(_) => {},
        }
        Ok(())
    }

    fn apply_directory(
        &mut self,
        notification: Notification,
        updates: &mut Vec<SessionUpdate>,
    ) -> Result<(), StoreError> {
        let Some(event) = StreamEvent::<ChatRecord>::decode(notification)? else {
            return Ok(());
        };

        let changed = match event {
            StreamEvent::Added(chat_id, record) | StreamEvent::Changed(chat_id, record) => {
                let entry = ChatEntry::from_record(
                    chat_id,
                    &record,
                    ChatKind::Public,
                    self.config.excerpt_len,
                );
                self.directory.upsert(entry);
                true
            },
            StreamEvent::Removed(chat_id) => self.directory.remove(&chat_id).is_some(),
            StreamEvent::Cancelled(_) => false,
        };
        if changed {
            note(updates, SessionUpdate::DirectoryChanged);
        }
        Ok(())
    }

    fn apply_username(
        &mut self,
        key: &SubscriptionKey,
        notification: Notification,
        updates: &mut Vec<SessionUpdate>,
    ) -> Result<(), StoreError> {
        let Some(snapshot) = value_of(notification) else {
            return Ok(());
        };
        let user_id = key.scope();

        let Some(name) = snapshot.decode::<String>()? else {
            self.usernames.remove(user_id);
            note(updates, SessionUpdate::UsernameChanged { user_id: user_id.to_owned() });
            return Ok(());
        };

        for (chat_id, members) in &mut self.members {
            if members.set_username(user_id, &name) {
                note(updates, SessionUpdate::MembersChanged { chat_id: chat_id.clone() });
            }
        }
        for (chat_id, messages) in &mut self.messages {
            if messages.set_sender_username(user_id, &name) > 0 {
                note(updates, SessionUpdate::MessagesChanged { chat_id: chat_id.clone() });
            }
        }
        self.usernames.insert(user_id.to_owned(), name);
        note(updates, SessionUpdate::UsernameChanged { user_id: user_id.to_owned() });
        Ok(())
    }

    fn apply_picture(
        &mut self,
        key: &SubscriptionKey,
        notification: Notification,
        updates: &mut Vec<SessionUpdate>,
    ) -> Result<(), StoreError> {
        let Some(snapshot) = value_of(notification) else {
            return Ok(());
        };
        let user_id = key.scope().to_owned();
        match snapshot.decode::<String>()? {
            Some(marker) => self.pictures.insert(user_id.clone(), marker),
            None => self.pictures.remove(&user_id),
        };
        note(updates, SessionUpdate::ProfilePictureChanged { user_id });
        Ok(())
    }

    fn apply_admin(
        &mut self,
        key: &SubscriptionKey,
        notification: Notification,
        updates: &mut Vec<SessionUpdate>,
    ) -> Result<(), StoreError> {
        let Some(snapshot) = value_of(notification) else {
            return Ok(());
        };
        let chat_id = key.scope().to_owned();
        match snapshot.decode::<String>()? {
            Some(admin) => self.admins.insert(chat_id.clone(), admin),
            None => self.admins.remove(&chat_id),
        };
        note(updates, SessionUpdate::ChatStatusChanged { chat_id });
        Ok(())
    }

    fn apply_member_count(
        &mut self,
        key: &SubscriptionKey,
        notification: Notification,
        updates: &mut Vec<SessionUpdate>,
    ) -> Result<(), StoreError> {
        let Some(snapshot) = value_of(notification) else {
            return Ok(());
        };
        let chat_id = key.scope().to_owned();
        match snapshot.decode::<u64>()? {
            Some(count) => self.member_counts.insert(chat_id.clone(), count),
            None => self.member_counts.remove(&chat_id),
        };
        note(updates, SessionUpdate::ChatStatusChanged { chat_id });
        Ok(())
    }

    fn apply_member_flag(
        &mut self,
        key: &SubscriptionKey,
        notification: Notification,
        updates: &mut Vec<SessionUpdate>,
    ) -> Result<(), StoreError> {
        let Some(snapshot) = value_of(notification) else {
            return Ok(());
        };
        let chat_id = key.scope().to_owned();
        self.member_flags.insert(chat_id.clone(), snapshot.exists());
        note(updates, SessionUpdate::ChatStatusChanged { chat_id });
        Ok(())
    }
}

/// Snapshot of a value notification. Child events on a value stream are
/// ignored.
fn value_of(notification: Notification) -> Option<Snapshot> {
    match notification {
        Notification::Value(snapshot) => Some(snapshot),
        _ => None,
    }
}

fn note(updates: &mut Vec<SessionUpdate>, update: SessionUpdate) {
    if !updates.contains(&update) {
        updates.push(update);
    }
}

#[cfg(test)]
mod tests {
    use std::{
        future::{Future, ready},
        sync::Mutex,
    };

    use chatsync_core::{Limit, OrderBy, StoreHandle, StorePath};
    use serde_json::json;

    use super::*;

    /// Records subscriptions and lets tests push notifications into them.
    #[derive(Default)]
    struct RecordingStore {
        inner: Mutex<Recorded>,
    }

    #[derive(Default)]
    struct Recorded {
        next: u64,
        live: HashMap<StoreHandle, Subscription>,
        sinks: HashMap<StoreHandle, DeliverySink>,
        history: Vec<Subscription>,
    }

    impl RecordingStore {
        fn history(&self) -> Vec<Subscription> {
            self.inner.lock().unwrap().history.clone()
        }

        fn live(&self) -> usize {
            self.inner.lock().unwrap().live.len()
        }

        fn handle_at(&self, path: &str) -> StoreHandle {
            let path = StorePath::parse(path);
            let inner = self.inner.lock().unwrap();
            *inner.live.iter().find(|(_, sub)| *sub.path() == path).unwrap().0
        }

        fn push(&self, handle: StoreHandle, notification: Notification) {
            let inner = self.inner.lock().unwrap();
            inner.sinks[&handle].send(Delivery { handle, notification }).unwrap();
        }

        fn issue(&self, subscription: Subscription, sink: DeliverySink) -> StoreHandle {
            let mut inner = self.inner.lock().unwrap();
            inner.next += 1;
            let handle = StoreHandle::new(inner.next);
            inner.live.insert(handle, subscription.clone());
            inner.sinks.insert(handle, sink);
            inner.history.push(subscription);
            handle
        }
    }

    impl BackingStore for RecordingStore {
        fn subscribe_value(&self, path: &StorePath, sink: DeliverySink) -> StoreHandle {
            self.issue(Subscription::Value(path.clone()), sink)
        }

        fn subscribe_child_events(&self, query: &Query, sink: DeliverySink) -> StoreHandle {
            self.issue(Subscription::Children(query.clone()), sink)
        }

        fn unsubscribe(&self, handle: StoreHandle) {
            self.inner.lock().unwrap().live.remove(&handle);
        }

        fn read_once(
            &self,
            query: &Query,
        ) -> impl Future<Output = Result<Snapshot, StoreError>> + Send {
            ready(Ok(Snapshot::missing(query.path.last().unwrap_or_default())))
        }

        fn write(
            &self,
            _path: &StorePath,
            _value: Option<Value>,
        ) -> impl Future<Output = Result<(), StoreError>> + Send {
            ready(Ok(()))
        }
    }

    fn session() -> (Arc<RecordingStore>, StreamCoordinator<RecordingStore>) {
        let store = Arc::new(RecordingStore::default());
        let coordinator =
            StreamCoordinator::new(Arc::clone(&store), "me", CoordinatorConfig::default()).unwrap();
        (store, coordinator)
    }

    fn added(key: &str, value: Value) -> Notification {
        Notification::ChildAdded(Snapshot::new(key, Some(value)))
    }

    #[test]
    fn initial_start_requests_last_ten_by_timestamp() {
        let (store, mut coordinator) = session();
        coordinator.start_or_stop(EntityKind::Messages, "c1", Lifecycle::Start).unwrap();

        let history = store.history();
        assert_eq!(history.len(), 1);
        let Subscription::Children(query) = &history[0] else {
            panic!("expected a child subscription");
        };
        assert_eq!(query.path.to_string(), "/messages/c1");
        assert_eq!(query.order, OrderBy::Child("timestamp".into()));
        assert_eq!(query.limit, Some(Limit::Last(10)));
    }

    #[test]
    fn start_twice_subscribes_once() {
        let (store, mut coordinator) = session();
        coordinator.start_or_stop(EntityKind::Messages, "c1", Lifecycle::Start).unwrap();
        coordinator.start_or_stop(EntityKind::Messages, "c1", Lifecycle::Start).unwrap();
        assert_eq!(store.live(), 1);
    }

    #[test]
    fn empty_scope_fails_loudly() {
        let (_, mut coordinator) = session();
        let err = coordinator.start_or_stop(EntityKind::Messages, "", Lifecycle::Start).unwrap_err();
        assert!(matches!(err, SyncError::Validation(ValidationError::EmptyScope { .. })));
    }

    #[test]
    fn load_more_on_value_stream_is_rejected() {
        let (_, mut coordinator) = session();
        let err = coordinator.load_more(EntityKind::Username, "u1", Some(3)).unwrap_err();
        assert!(matches!(err, SyncError::Validation(ValidationError::NotPaged { .. })));
    }

    #[test]
    fn deliveries_after_stop_are_dropped() {
        let (store, mut coordinator) = session();
        coordinator.start_or_stop(EntityKind::Messages, "c1", Lifecycle::Start).unwrap();
        let handle = store.handle_at("messages/c1");

        coordinator.start_or_stop(EntityKind::Messages, "c1", Lifecycle::Stop).unwrap();
        store.push(handle, added("m1", json!({ "sender": "u1", "text": "late", "timestamp": 1 })));

        assert!(coordinator.pump().is_empty());
        assert!(coordinator.messages("c1").is_none());
    }

    #[test]
    fn cancellation_keeps_data_and_sets_error() {
        let (store, mut coordinator) = session();
        coordinator.start_or_stop(EntityKind::Messages, "c1", Lifecycle::Start).unwrap();
        let handle = store.handle_at("messages/c1");

        store.push(handle, added("m1", json!({ "sender": "u1", "text": "hi", "timestamp": 1 })));
        store.push(handle, Notification::Cancelled(StoreError::PermissionDenied { path: "/messages/c1".into() }));
        let updates = coordinator.pump();

        assert!(updates.contains(&SessionUpdate::Error {
            message: "permission denied at /messages/c1".into()
        }));
        assert_eq!(coordinator.messages("c1").unwrap().len(), 1);
        assert_eq!(coordinator.error_message(), Some("permission denied at /messages/c1"));
        assert!(coordinator.registry().is_empty());

        coordinator.dismiss_error();
        assert!(coordinator.error_message().is_none());
    }

    #[test]
    fn member_added_attaches_name_and_picture() {
        let (store, mut coordinator) = session();
        coordinator.start_or_stop(EntityKind::Members, "c1", Lifecycle::Start).unwrap();
        let handle = store.handle_at("members/c1");

        store.push(handle, added("u2", json!(true)));
        coordinator.pump();
        assert_eq!(store.live(), 3);

        store.push(store.handle_at("users/u2/name"), Notification::Value(Snapshot::new("name", Some(json!("bob")))));
        coordinator.pump();
        let members: Vec<_> = coordinator.members("c1").unwrap().iter().collect();
        assert_eq!(members, [("u2", Some("bob"))]);

        store.push(handle, Notification::ChildRemoved("u2".into()));
        coordinator.pump();
        assert_eq!(store.live(), 1);
        assert!(coordinator.members("c1").unwrap().is_empty());
    }

    #[test]
    fn stopping_parent_releases_dependents() {
        let (store, mut coordinator) = session();
        coordinator
            .start_or_stop(EntityKind::Memberships(ChatKind::Public), "me", Lifecycle::Start)
            .unwrap();
        let handle = store.handle_at("users/me/public_chats");
        store.push(handle, added("c1", json!(true)));
        store.push(handle, added("c2", json!(true)));
        coordinator.pump();
        assert_eq!(store.live(), 3);

        coordinator
            .start_or_stop(EntityKind::Memberships(ChatKind::Public), "me", Lifecycle::Stop)
            .unwrap();
        assert_eq!(store.live(), 0);
    }

    #[test]
    fn cancelled_parent_releases_dependents() {
        let (store, mut coordinator) = session();
        coordinator
            .start_or_stop(EntityKind::Memberships(ChatKind::Public), "me", Lifecycle::Start)
            .unwrap();
        let handle = store.handle_at("users/me/public_chats");
        store.push(handle, added("c1", json!(true)));
        coordinator.pump();
        let metadata = Snapshot::new("c1", Some(json!({ "title": "Reading" })));
        store.push(store.handle_at("public_chats/c1"), Notification::Value(metadata));
        coordinator.pump();
        assert_eq!(store.live(), 2);

        store.push(handle, Notification::Cancelled(StoreError::Disconnected));
        coordinator.pump();

        assert_eq!(store.live(), 0);
        assert!(coordinator.registry().is_empty());
        assert_eq!(coordinator.chats().len(), 1);
        assert_eq!(coordinator.error_message(), Some("store disconnected"));
    }

    #[test]
    fn dependent_also_started_directly_survives_parent_stop() {
        let (store, mut coordinator) = session();
        coordinator.start_or_stop(EntityKind::Username, "u2", Lifecycle::Start).unwrap();
        coordinator.start_or_stop(EntityKind::Members, "c1", Lifecycle::Start).unwrap();
        store.push(store.handle_at("members/c1"), added("u2", json!(true)));
        coordinator.pump();

        coordinator.start_or_stop(EntityKind::Members, "c1", Lifecycle::Stop).unwrap();

        let key = SubscriptionKey::new(EntityKind::Username, "u2").unwrap();
        assert!(coordinator.registry().is_attached(&key));
        assert_eq!(store.live(), 1);
    }

    #[test]
    fn undecodable_message_is_skipped() {
        let (store, mut coordinator) = session();
        coordinator.start_or_stop(EntityKind::Messages, "c1", Lifecycle::Start).unwrap();
        let handle = store.handle_at("messages/c1");

        store.push(handle, added("bad", json!("not a message")));
        store.push(handle, added("m1", json!({ "sender": "u1", "text": "ok", "timestamp": 1 })));
        coordinator.pump();

        let messages = coordinator.messages("c1").unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages.get("bad").is_none());
    }
}
