//! Chat data model.
//!
//! Two layers: the `*Record` types are the serde shapes stored in the backing
//! store (field names and defaults follow the stored JSON), and the `*Entry`
//! types are what screens render, keyed by id.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum length of a chat's last-message excerpt, in characters.
pub const EXCERPT_LEN: usize = 40;

/// Row title shown for a chat whose metadata has been deleted.
pub const DELETED_CHAT_TITLE: &str = "Deleted chat";

/// Kind of chat. Selects the store layout used for its metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    /// One-to-one chat; metadata is stored per participant.
    Private,
    /// Group chat with a single shared metadata node.
    Public,
}

impl ChatKind {
    /// Stored `type` string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
        }
    }

    /// Segment under `users/{id}` indexing the user's chats of this kind.
    pub fn index_segment(self) -> &'static str {
        match self {
            Self::Private => "private_chats",
            Self::Public => "public_chats",
        }
    }

    /// Parse a stored `type` string.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "private" => Some(Self::Private),
            "public" => Some(Self::Public),
            _ => None,
        }
    }
}

impl fmt::Display for ChatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chat metadata as stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatRecord {
    /// Chat title. Empty for a deleted chat.
    pub title: String,
    /// Free-form description (public chats only).
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Text of the most recent message.
    pub last_message: String,
    /// Timestamp of the most recent message, in milliseconds.
    pub timestamp: i64,
    /// `"private"` or `"public"`; may be empty in older records.
    #[serde(rename = "type")]
    pub chat_type: String,
}

impl ChatRecord {
    /// Kind recorded in the `type` field, if recognised.
    pub fn kind(&self) -> Option<ChatKind> {
        ChatKind::parse(&self.chat_type)
    }
}

/// Message as stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageRecord {
    /// Sender's user id.
    pub sender: String,
    /// Sender's username at send time, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_username: Option<String>,
    /// Message text.
    pub text: String,
    /// Send time in milliseconds.
    pub timestamp: i64,
    /// Message was edited after sending.
    pub edited: bool,
}

/// A chat row in a chat list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEntry {
    /// Chat id.
    pub id: String,
    /// Chat title. Empty when the chat's metadata has been deleted.
    pub title: String,
    /// Last message, truncated to at most [`EXCERPT_LEN`] characters.
    pub last_message_excerpt: String,
    /// Timestamp of the last message, in milliseconds.
    pub timestamp_millis: i64,
    /// Chat kind.
    pub kind: ChatKind,
}

impl ChatEntry {
    /// Build an entry from a stored record.
    ///
    /// `fallback_kind` applies when the record carries no `type`.
    pub fn from_record(
        id: impl Into<String>,
        record: &ChatRecord,
        fallback_kind: ChatKind,
        excerpt_len: usize,
    ) -> Self {
        Self {
            id: id.into(),
            title: record.title.clone(),
            last_message_excerpt: excerpt(&record.last_message, excerpt_len),
            timestamp_millis: record.timestamp,
            kind: record.kind().unwrap_or(fallback_kind),
        }
    }

    /// Placeholder for a chat the user belongs to but whose metadata is gone.
    pub fn deleted(id: impl Into<String>, kind: ChatKind) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            last_message_excerpt: String::new(),
            timestamp_millis: 0,
            kind,
        }
    }

    /// Check if the chat's metadata has been deleted.
    pub fn is_deleted(&self) -> bool {
        self.title.is_empty()
    }

    /// Title to render. Deleted chats render as [`DELETED_CHAT_TITLE`].
    pub fn display_title(&self) -> &str {
        if self.is_deleted() { DELETED_CHAT_TITLE } else { &self.title }
    }
}

/// A message row in a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEntry {
    /// Message id.
    pub id: String,
    /// Sender's user id.
    pub sender_id: String,
    /// Sender's username. Late-bound from the username stream when absent.
    pub sender_username: Option<String>,
    /// Message text.
    pub text: String,
    /// Send time in milliseconds.
    pub timestamp_millis: i64,
    /// Message was edited after sending.
    pub edited: bool,
}

impl MessageEntry {
    /// Build an entry from a stored record.
    pub fn from_record(id: impl Into<String>, record: MessageRecord) -> Self {
        Self {
            id: id.into(),
            sender_id: record.sender,
            sender_username: record.sender_username,
            text: record.text,
            timestamp_millis: record.timestamp,
            edited: record.edited,
        }
    }

    /// Stored representation (the id is the record's key, not a field).
    pub fn to_record(&self) -> MessageRecord {
        MessageRecord {
            sender: self.sender_id.clone(),
            sender_username: self.sender_username.clone(),
            text: self.text.clone(),
            timestamp: self.timestamp_millis,
            edited: self.edited,
        }
    }

    /// Display ordering key: ascending by timestamp, ties broken by id.
    pub fn order_key(&self) -> (i64, &str) {
        (self.timestamp_millis, self.id.as_str())
    }
}

/// First `max_chars` characters of `text`.
///
/// Counts `char`s, so multi-byte text is never split mid-character.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
