//! One-shot chat operations.
//!
//! Everything here is a short sequence of reads and writes against the
//! backing store. Each call suspends only at the store boundary and completes
//! exactly once. Store failures come back as [`SyncError::OneShotFailure`]
//! naming the operation; the caller hands them to
//! [`crate::StreamCoordinator::report_error`].
//!
//! Writes are not transactional. A failure part way through leaves the
//! writes before it in place, and the live subscriptions reflect whatever
//! landed.

use std::sync::Arc;

use chatsync_core::{
    BackingStore, ChatEntry, ChatKind, ChatRecord, MessageEntry, MessageRecord, Query, Snapshot,
    StoreError, StorePath, SyncError, ValidationError,
    env::Environment,
    model::excerpt,
    path::{self, user_chat},
};
use serde::Serialize;
use serde_json::{Value, json};

use crate::{
    CoordinatorConfig,
    collection::MessageCollection,
    paths::{other_participant, paths_for, private_chat_id},
};

/// One-shot operations on behalf of one user.
#[derive(Debug, Clone)]
pub struct ChatService<S, E> {
    store: Arc<S>,
    env: E,
    user_id: String,
    excerpt_len: usize,
}

impl<S: BackingStore, E: Environment> ChatService<S, E> {
    /// Create a service acting as `user_id`.
    pub fn new(
        store: Arc<S>,
        env: E,
        user_id: impl Into<String>,
        config: &CoordinatorConfig,
    ) -> Self {
        Self { store, env, user_id: user_id.into(), excerpt_len: config.excerpt_len }
    }

    /// Acting user.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Send a message and make it the chat's last message.
    ///
    /// Returns the message timestamp.
    pub async fn send_message(
        &self,
        kind: ChatKind,
        chat_id: &str,
        sender_username: Option<&str>,
        text: &str,
    ) -> Result<i64, SyncError> {
        const OP: &str = "send_message";

        let copies = paths_for(kind).metadata_copies(&self.user_id, chat_id)?;
        let timestamp = self.env.now_millis();
        let record = MessageRecord {
            sender: self.user_id.clone(),
            sender_username: sender_username.map(str::to_owned),
            text: text.to_owned(),
            timestamp,
            edited: false,
        };
        let message_id = self.env.new_id();

        self.put(path::message(chat_id, &message_id), Some(encode(&record, OP)?), OP).await?;
        self.write_last_message(&copies, text, timestamp).await?;

        tracing::debug!(chat_id, %message_id, timestamp, "message sent");
        Ok(timestamp)
    }

    /// Replace a message's text and mark it edited.
    ///
    /// Refreshes the chat's last message when the edited message is the
    /// newest one loaded.
    pub async fn edit_message(
        &self,
        kind: ChatKind,
        chat_id: &str,
        messages: &MessageCollection,
        message_id: &str,
        text: &str,
    ) -> Result<(), SyncError> {
        const OP: &str = "edit_message";

        let entry = loaded(messages, chat_id, message_id)?;
        let copies = paths_for(kind).metadata_copies(&self.user_id, chat_id)?;

        let mut record = entry.to_record();
        record.text = text.to_owned();
        record.edited = true;
        self.put(path::message(chat_id, message_id), Some(encode(&record, OP)?), OP).await?;

        if messages.newest().is_some_and(|newest| newest.id == message_id) {
            self.write_last_message(&copies, text, entry.timestamp_millis).await?;
        }
        Ok(())
    }

    /// Delete a message.
    ///
    /// Deleting the newest message rolls the chat's last message back to the
    /// one before it, or clears it when none is left.
    pub async fn delete_message(
        &self,
        kind: ChatKind,
        chat_id: &str,
        messages: &MessageCollection,
        message_id: &str,
    ) -> Result<(), SyncError> {
        loaded(messages, chat_id, message_id)?;
        let copies = paths_for(kind).metadata_copies(&self.user_id, chat_id)?;
        let was_newest = messages.newest().is_some_and(|newest| newest.id == message_id);
        let previous = messages.before(message_id).map(|m| (m.text.clone(), m.timestamp_millis));

        self.put(path::message(chat_id, message_id), None, "delete_message").await?;

        if was_newest {
            let (text, timestamp) = previous.unwrap_or_default();
            self.write_last_message(&copies, &text, timestamp).await?;
        }
        Ok(())
    }

    /// Set the chat's last message, truncated to the excerpt length.
    ///
    /// For private chats both participants' copies are updated. A copy that
    /// no longer exists, because its owner left, is not recreated.
    pub async fn update_last_message(
        &self,
        kind: ChatKind,
        chat_id: &str,
        text: &str,
        timestamp: i64,
    ) -> Result<(), SyncError> {
        let copies = paths_for(kind).metadata_copies(&self.user_id, chat_id)?;
        self.write_last_message(&copies, text, timestamp).await
    }

    /// Check if the user belongs to any chat of `kind`.
    pub async fn check_has_chats(&self, kind: ChatKind) -> Result<bool, SyncError> {
        let snapshot =
            self.get(path::user_chats(&self.user_id, kind), "check_has_chats").await?;
        Ok(snapshot.exists())
    }

    /// Check if the user is a member of `chat_id`.
    pub async fn check_is_member(&self, kind: ChatKind, chat_id: &str) -> Result<bool, SyncError> {
        let flag = paths_for(kind).member_flag(&self.user_id, chat_id);
        Ok(self.get(flag, "check_is_member").await?.exists())
    }

    /// Check if the user administers public chat `chat_id`.
    pub async fn check_is_admin(&self, chat_id: &str) -> Result<bool, SyncError> {
        const OP: &str = "check_is_admin";
        let admin = self.get(path::admin(chat_id), OP).await?;
        let admin = admin.decode::<String>().map_err(SyncError::one_shot(OP))?;
        Ok(admin.as_deref() == Some(self.user_id.as_str()))
    }

    /// Open a private chat with `other_user_id`. Returns the chat id.
    ///
    /// Each participant's copy is titled with the other participant's name.
    pub async fn start_private_chat(
        &self,
        other_user_id: &str,
        username: &str,
        other_username: &str,
    ) -> Result<String, SyncError> {
        const OP: &str = "start_private_chat";

        let chat_id = private_chat_id(&self.user_id, other_user_id);
        for (owner, title) in [(self.user_id.as_str(), other_username), (other_user_id, username)] {
            let record = ChatRecord {
                title: title.to_owned(),
                chat_type: ChatKind::Private.as_str().to_owned(),
                ..ChatRecord::default()
            };
            self.put(path::private_chat(owner, &chat_id), Some(encode(&record, OP)?), OP).await?;
            self.put(user_chat(owner, ChatKind::Private, &chat_id), Some(json!(true)), OP).await?;
        }

        tracing::debug!(%chat_id, "private chat started");
        Ok(chat_id)
    }

    /// Leave a private chat. Messages are deleted once both users have left.
    pub async fn leave_private_chat(&self, chat_id: &str) -> Result<(), SyncError> {
        const OP: &str = "leave_private_chat";

        let other = other_participant(chat_id, &self.user_id)?;
        let other_copy = self.get(user_chat(other, ChatKind::Private, chat_id), OP).await?;
        if !other_copy.exists() {
            self.put(path::messages(chat_id), None, OP).await?;
        }
        self.put(user_chat(&self.user_id, ChatKind::Private, chat_id), None, OP).await?;
        self.put(path::private_chat(&self.user_id, chat_id), None, OP).await?;

        tracing::debug!(chat_id, purged = !other_copy.exists(), "left private chat");
        Ok(())
    }

    /// Join a public chat: member flag, member count, and the user's index.
    pub async fn join_public_chat(&self, chat_id: &str) -> Result<(), SyncError> {
        const OP: &str = "join_public_chat";

        self.put(path::member(chat_id, &self.user_id), Some(json!(true)), OP).await?;
        self.increment_member_count(chat_id, OP).await?;
        self.put(user_chat(&self.user_id, ChatKind::Public, chat_id), Some(json!(true)), OP)
            .await?;

        tracing::debug!(chat_id, "joined public chat");
        Ok(())
    }

    /// Leave a public chat.
    ///
    /// With `revoke_membership` the member flag is removed and the member
    /// count decremented; otherwise only the user's index entry goes.
    pub async fn leave_public_chat(
        &self,
        chat_id: &str,
        revoke_membership: bool,
    ) -> Result<(), SyncError> {
        const OP: &str = "leave_public_chat";

        if revoke_membership {
            self.decrement_member_count(chat_id, false, OP).await?;
            self.put(path::member(chat_id, &self.user_id), None, OP).await?;
        }
        self.put(user_chat(&self.user_id, ChatKind::Public, chat_id), None, OP).await?;

        tracing::debug!(chat_id, revoke_membership, "left public chat");
        Ok(())
    }

    /// Create a public chat administered by the user, and join it.
    ///
    /// Returns the new chat id.
    pub async fn create_public_chat(
        &self,
        title: &str,
        description: &str,
    ) -> Result<String, SyncError> {
        const OP: &str = "create_public_chat";

        check_title(title)?;
        let chat_id = self.env.new_id();
        self.put(path::admin(&chat_id), Some(Value::String(self.user_id.clone())), OP).await?;
        self.join_public_chat(&chat_id).await?;

        let record = ChatRecord {
            title: title.to_owned(),
            description: description.to_owned(),
            chat_type: ChatKind::Public.as_str().to_owned(),
            ..ChatRecord::default()
        };
        self.put(path::public_chat(&chat_id), Some(encode(&record, OP)?), OP).await?;

        tracing::debug!(%chat_id, "public chat created");
        Ok(chat_id)
    }

    /// Delete a public chat with its messages, members, count, and admin.
    pub async fn delete_public_chat(&self, chat_id: &str) -> Result<(), SyncError> {
        const OP: &str = "delete_public_chat";

        self.put(path::messages(chat_id), None, OP).await?;
        self.decrement_member_count(chat_id, true, OP).await?;
        self.put(path::public_chat(chat_id), None, OP).await?;
        self.put(path::members(chat_id), None, OP).await?;
        self.put(path::admin(chat_id), None, OP).await?;
        self.leave_public_chat(chat_id, false).await?;

        tracing::debug!(chat_id, "public chat deleted");
        Ok(())
    }

    /// Change a public chat's title and description.
    pub async fn change_public_chat(
        &self,
        chat_id: &str,
        title: &str,
        description: &str,
    ) -> Result<(), SyncError> {
        const OP: &str = "change_public_chat";

        check_title(title)?;
        let chat = path::public_chat(chat_id);
        self.put(chat.child("title"), Some(json!(title)), OP).await?;
        let description = (!description.is_empty()).then(|| json!(description));
        self.put(chat.child("description"), description, OP).await
    }

    /// Public chats whose title equals `title` exactly.
    pub async fn search_chat_by_title(&self, title: &str) -> Result<Vec<ChatEntry>, SyncError> {
        let query = Query::at(path::public_chats()).order_by_child("title").equal_to(title);
        let found =
            self.store.read_once(&query).await.map_err(SyncError::one_shot("search_chat_by_title"))?;

        let mut entries = Vec::new();
        for child in found.children() {
            match child.decode::<ChatRecord>() {
                Ok(Some(record)) => entries.push(ChatEntry::from_record(
                    child.key(),
                    &record,
                    ChatKind::Public,
                    self.excerpt_len,
                )),
                Ok(None) => {},
                Err(err) => tracing::warn!(chat_id = child.key(), error = %err, "skipping undecodable chat"),
            }
        }
        Ok(entries)
    }

    async fn write_last_message(
        &self,
        copies: &[StorePath],
        text: &str,
        timestamp: i64,
    ) -> Result<(), SyncError> {
        const OP: &str = "update_last_message";

        let text = excerpt(text, self.excerpt_len);
        for chat in copies {
            // A participant who left has no copy; writing would recreate it untitled.
            if !self.get(chat.clone(), OP).await?.exists() {
                tracing::debug!(%chat, "skipping missing chat copy");
                continue;
            }
            self.put(chat.child("lastMessage"), Some(json!(text)), OP).await?;
            self.put(chat.child("timestamp"), Some(json!(timestamp)), OP).await?;
        }
        Ok(())
    }

    async fn increment_member_count(
        &self,
        chat_id: &str,
        operation: &'static str,
    ) -> Result<(), SyncError> {
        let count = self.member_count(chat_id, operation).await?.unwrap_or(0);
        self.put(path::member_count(chat_id), Some(json!(count + 1)), operation).await
    }

    /// Decrement the member count. A count that would reach zero, or
    /// `remove`, deletes the node. A missing count is left alone.
    async fn decrement_member_count(
        &self,
        chat_id: &str,
        remove: bool,
        operation: &'static str,
    ) -> Result<(), SyncError> {
        let Some(count) = self.member_count(chat_id, operation).await? else {
            return Ok(());
        };
        let value = (!remove && count > 1).then(|| json!(count - 1));
        self.put(path::member_count(chat_id), value, operation).await
    }

    async fn member_count(
        &self,
        chat_id: &str,
        operation: &'static str,
    ) -> Result<Option<u64>, SyncError> {
        self.get(path::member_count(chat_id), operation)
            .await?
            .decode::<u64>()
            .map_err(SyncError::one_shot(operation))
    }

    async fn get(&self, path: StorePath, operation: &'static str) -> Result<Snapshot, SyncError> {
        self.store.read_value(&path).await.map_err(SyncError::one_shot(operation))
    }

    async fn put(
        &self,
        path: StorePath,
        value: Option<Value>,
        operation: &'static str,
    ) -> Result<(), SyncError> {
        self.store.write(&path, value).await.map_err(SyncError::one_shot(operation))
    }
}

fn loaded<'a>(
    messages: &'a MessageCollection,
    chat_id: &str,
    message_id: &str,
) -> Result<&'a MessageEntry, ValidationError> {
    messages.get(message_id).ok_or_else(|| ValidationError::UnknownMessage {
        chat_id: chat_id.to_owned(),
        message_id: message_id.to_owned(),
    })
}

fn check_title(title: &str) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    Ok(())
}

fn encode(record: &impl Serialize, operation: &'static str) -> Result<Value, SyncError> {
    serde_json::to_value(record)
        .map_err(|e| SyncError::one_shot(operation)(StoreError::Other(e.to_string())))
}
