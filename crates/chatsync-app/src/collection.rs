//! Keyed collections screens render.
//!
//! Each collection pairs an id index with an order index, so upserts and
//! removals are O(log n) and iteration is always in display order regardless
//! of the order events arrived in.

use std::{
    cmp::Reverse,
    collections::{BTreeMap, BTreeSet, HashMap},
};

use chatsync_core::{ChatEntry, MessageEntry, MessageRecord, StreamEvent};

/// Messages of one chat, in ascending `(timestamp, id)` order.
#[derive(Debug, Clone, Default)]
pub struct MessageCollection {
    entries: HashMap<String, MessageEntry>,
    order: BTreeSet<(i64, String)>,
}

impl MessageCollection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a child event. Returns true if the collection changed.
    ///
    /// Added keeps a previously known sender username when the new record
    /// lacks one. Changed replaces the entry as-is. Cancellations do not
    /// touch the collection.
    pub fn apply(&mut self, event: StreamEvent<MessageRecord>) -> bool {
        match event {
            StreamEvent::Added(id, record) => {
                let mut entry = MessageEntry::from_record(id, record);
                if entry.sender_username.is_none() {
                    entry.sender_username =
                        self.entries.get(&entry.id).and_then(|old| old.sender_username.clone());
                }
                self.upsert(entry);
                true
            },
            StreamEvent::Changed(id, record) => {
                self.upsert(MessageEntry::from_record(id, record));
                true
            },
            StreamEvent::Removed(id) => self.remove(&id).is_some(),
            StreamEvent::Cancelled(_) => false,
        }
    }

    /// Insert or replace an entry.
    pub fn upsert(&mut self, entry: MessageEntry) {
        if let Some(old) = self.entries.get(&entry.id) {
            self.order.remove(&(old.timestamp_millis, old.id.clone()));
        }
        self.order.insert((entry.timestamp_millis, entry.id.clone()));
        self.entries.insert(entry.id.clone(), entry);
    }

    /// Remove an entry by id.
    pub fn remove(&mut self, id: &str) -> Option<MessageEntry> {
        let entry = self.entries.remove(id)?;
        self.order.remove(&(entry.timestamp_millis, entry.id.clone()));
        Some(entry)
    }

    /// Set the username on every message by `sender_id`. Returns how many
    /// messages changed.
    pub fn set_sender_username(&mut self, sender_id: &str, username: &str) -> usize {
        let mut changed = 0;
        for entry in self.entries.values_mut().filter(|e| e.sender_id == sender_id) {
            if entry.sender_username.as_deref() != Some(username) {
                entry.sender_username = Some(username.to_owned());
                changed += 1;
            }
        }
        changed
    }

    /// Entry by id.
    pub fn get(&self, id: &str) -> Option<&MessageEntry> {
        self.entries.get(id)
    }

    /// Entries in display order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &MessageEntry> + '_ {
        self.order.iter().filter_map(|(_, id)| self.entries.get(id))
    }

    /// Most recent entry.
    pub fn newest(&self) -> Option<&MessageEntry> {
        self.iter().next_back()
    }

    /// Entry immediately before `id` in display order.
    pub fn before(&self, id: &str) -> Option<&MessageEntry> {
        let entry = self.entries.get(id)?;
        let (_, prev_id) =
            self.order.range(..(entry.timestamp_millis, entry.id.clone())).next_back()?;
        self.entries.get(prev_id)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Chat rows, in descending `(timestamp, id)` order.
#[derive(Debug, Clone, Default)]
pub struct ChatCollection {
    entries: HashMap<String, ChatEntry>,
    order: BTreeSet<(Reverse<i64>, Reverse<String>)>,
}

impl ChatCollection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry.
    pub fn upsert(&mut self, entry: ChatEntry) {
        if let Some(old) = self.entries.get(&entry.id) {
            self.order.remove(&(Reverse(old.timestamp_millis), Reverse(old.id.clone())));
        }
        self.order.insert((Reverse(entry.timestamp_millis), Reverse(entry.id.clone())));
        self.entries.insert(entry.id.clone(), entry);
    }

    /// Remove an entry by id.
    pub fn remove(&mut self, id: &str) -> Option<ChatEntry> {
        let entry = self.entries.remove(id)?;
        self.order.remove(&(Reverse(entry.timestamp_millis), Reverse(entry.id.clone())));
        Some(entry)
    }

    /// Entry by id, including deleted chats.
    pub fn get(&self, id: &str) -> Option<&ChatEntry> {
        self.entries.get(id)
    }

    /// Rows to display, newest first.
    ///
    /// Chats whose metadata was deleted are skipped unless `show_deleted`.
    pub fn visible(&self, show_deleted: bool) -> impl Iterator<Item = &ChatEntry> + '_ {
        self.order
            .iter()
            .filter_map(|(_, Reverse(id))| self.entries.get(id))
            .filter(move |entry| show_deleted || !entry.is_deleted())
    }

    /// Number of entries, including deleted chats.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Members of one chat, keyed by user id, with late-bound usernames.
#[derive(Debug, Clone, Default)]
pub struct MemberCollection {
    members: BTreeMap<String, Option<String>>,
}

impl MemberCollection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member. Returns true if newly added.
    pub fn insert(&mut self, user_id: &str, username: Option<String>) -> bool {
        if self.members.contains_key(user_id) {
            return false;
        }
        self.members.insert(user_id.to_owned(), username);
        true
    }

    /// Remove a member. Returns true if it was present.
    pub fn remove(&mut self, user_id: &str) -> bool {
        self.members.remove(user_id).is_some()
    }

    /// Set a member's username. Returns true if the member exists.
    pub fn set_username(&mut self, user_id: &str, username: &str) -> bool {
        match self.members.get_mut(user_id) {
            Some(slot) => {
                *slot = Some(username.to_owned());
                true
            },
            None => false,
        }
    }

    /// Check if `user_id` is a member.
    pub fn contains(&self, user_id: &str) -> bool {
        self.members.contains_key(user_id)
    }

    /// Members in user id order, with their usernames if known.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> + '_ {
        self.members.iter().map(|(id, name)| (id.as_str(), name.as_deref()))
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chatsync_core::{ChatKind, StoreError};

    use super::*;

    fn record(text: &str, timestamp: i64) -> MessageRecord {
        MessageRecord { sender: "u1".into(), text: text.into(), timestamp, ..MessageRecord::default() }
    }

    fn chat(id: &str, timestamp: i64) -> ChatEntry {
        ChatEntry {
            id: id.into(),
            title: format!("chat {id}"),
            last_message_excerpt: String::new(),
            timestamp_millis: timestamp,
            kind: ChatKind::Public,
        }
    }

    fn ids(messages: &MessageCollection) -> Vec<&str> {
        messages.iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn messages_ascend_regardless_of_arrival() {
        let mut messages = MessageCollection::new();
        messages.apply(StreamEvent::Added("m3".into(), record("c", 300)));
        messages.apply(StreamEvent::Added("m1".into(), record("a", 100)));
        messages.apply(StreamEvent::Added("m2".into(), record("b", 200)));

        assert_eq!(ids(&messages), ["m1", "m2", "m3"]);
        assert_eq!(messages.newest().map(|m| m.id.as_str()), Some("m3"));
    }

    #[test]
    fn timestamp_ties_break_by_id() {
        let mut messages = MessageCollection::new();
        messages.apply(StreamEvent::Added("b".into(), record("x", 100)));
        messages.apply(StreamEvent::Added("a".into(), record("y", 100)));
        assert_eq!(ids(&messages), ["a", "b"]);
    }

    #[test]
    fn added_then_changed_keeps_latest() {
        let mut messages = MessageCollection::new();
        messages.apply(StreamEvent::Added("m1".into(), record("hi", 100)));
        messages.apply(StreamEvent::Changed("m1".into(), record("hi edited", 100)));

        assert_eq!(messages.len(), 1);
        let entry = messages.get("m1").unwrap();
        assert_eq!(entry.text, "hi edited");
        assert_eq!(entry.timestamp_millis, 100);
    }

    #[test]
    fn changed_timestamp_reorders() {
        let mut messages = MessageCollection::new();
        messages.apply(StreamEvent::Added("m1".into(), record("a", 100)));
        messages.apply(StreamEvent::Added("m2".into(), record("b", 200)));
        messages.apply(StreamEvent::Changed("m1".into(), record("a", 300)));
        assert_eq!(ids(&messages), ["m2", "m1"]);
    }

    #[test]
    fn readded_message_keeps_cached_username() {
        let mut messages = MessageCollection::new();
        let named = MessageRecord { sender_username: Some("alice".into()), ..record("hi", 100) };
        messages.apply(StreamEvent::Added("m1".into(), named));
        messages.apply(StreamEvent::Added("m1".into(), record("hi", 100)));

        assert_eq!(messages.get("m1").unwrap().sender_username.as_deref(), Some("alice"));
    }

    #[test]
    fn removed_and_cancelled() {
        let mut messages = MessageCollection::new();
        messages.apply(StreamEvent::Added("m1".into(), record("a", 100)));

        assert!(!messages.apply(StreamEvent::Cancelled(StoreError::Disconnected)));
        assert_eq!(messages.len(), 1);

        assert!(messages.apply(StreamEvent::Removed("m1".into())));
        assert!(messages.is_empty());
        assert!(!messages.apply(StreamEvent::Removed("m1".into())));
    }

    #[test]
    fn before_walks_back_one() {
        let mut messages = MessageCollection::new();
        messages.apply(StreamEvent::Added("m1".into(), record("a", 100)));
        messages.apply(StreamEvent::Added("m2".into(), record("b", 200)));

        assert_eq!(messages.before("m2").map(|m| m.id.as_str()), Some("m1"));
        assert!(messages.before("m1").is_none());
        assert!(messages.before("missing").is_none());
    }

    #[test]
    fn sender_username_fills_every_message() {
        let mut messages = MessageCollection::new();
        messages.apply(StreamEvent::Added("m1".into(), record("a", 100)));
        messages.apply(StreamEvent::Added("m2".into(), record("b", 200)));

        assert_eq!(messages.set_sender_username("u1", "alice"), 2);
        assert_eq!(messages.set_sender_username("u1", "alice"), 0);
        assert!(messages.iter().all(|m| m.sender_username.as_deref() == Some("alice")));
    }

    #[test]
    fn chats_sort_descending_with_id_tiebreak() {
        let mut chats = ChatCollection::new();
        chats.upsert(chat("b", 3));
        chats.upsert(chat("a", 5));
        chats.upsert(chat("c", 3));

        let order: Vec<_> = chats.visible(false).map(|c| c.id.as_str()).collect();
        assert_eq!(order, ["a", "c", "b"]);
    }

    #[test]
    fn deleted_chats_hidden_unless_shown() {
        let mut chats = ChatCollection::new();
        chats.upsert(chat("a", 5));
        chats.upsert(ChatEntry::deleted("gone", ChatKind::Private));

        assert_eq!(chats.visible(false).count(), 1);
        let shown: Vec<_> = chats.visible(true).map(ChatEntry::display_title).collect();
        assert_eq!(shown, ["chat a", "Deleted chat"]);
    }

    #[test]
    fn chat_update_moves_row() {
        let mut chats = ChatCollection::new();
        chats.upsert(chat("a", 5));
        chats.upsert(chat("b", 3));
        chats.upsert(chat("b", 9));

        let order: Vec<_> = chats.visible(false).map(|c| c.id.as_str()).collect();
        assert_eq!(order, ["b", "a"]);
        assert_eq!(chats.len(), 2);
    }

    #[test]
    fn members_late_bind_usernames() {
        let mut members = MemberCollection::new();
        assert!(members.insert("u2", None));
        assert!(!members.insert("u2", None));
        assert!(members.set_username("u2", "bob"));
        assert!(!members.set_username("u9", "nobody"));

        let listed: Vec<_> = members.iter().collect();
        assert_eq!(listed, [("u2", Some("bob"))]);
    }
}
