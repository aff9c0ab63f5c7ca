//! Logical store paths.
//!
//! A [`StorePath`] is a list of segments addressing one node of the store
//! tree. The free functions in this module build every path the chat layer
//! touches, so no caller formats path strings by hand.

use std::fmt;

use crate::model::ChatKind;

/// Path to a node in the backing store tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorePath {
    segments: Vec<String>,
}

impl StorePath {
    /// The root node.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a slash-separated path. Empty segments are skipped.
    pub fn parse(path: &str) -> Self {
        Self { segments: path.split('/').filter(|s| !s.is_empty()).map(str::to_owned).collect() }
    }

    /// Path of a child node.
    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// Path of the parent node. `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.segments.split_last()?;
        Some(Self { segments: rest.to_vec() })
    }

    /// Final segment. `None` for the root.
    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// All segments from the root.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Check if this is the root path.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Check if `self` equals `ancestor` or lies below it.
    pub fn starts_with(&self, ancestor: &StorePath) -> bool {
        self.segments.starts_with(&ancestor.segments)
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}

/// `messages/{chat_id}`
pub fn messages(chat_id: &str) -> StorePath {
    StorePath::root().child("messages").child(chat_id)
}

/// `messages/{chat_id}/{message_id}`
pub fn message(chat_id: &str, message_id: &str) -> StorePath {
    messages(chat_id).child(message_id)
}

/// `private_chats/{user_id}/{chat_id}`
pub fn private_chat(user_id: &str, chat_id: &str) -> StorePath {
    StorePath::root().child("private_chats").child(user_id).child(chat_id)
}

/// `public_chats`
pub fn public_chats() -> StorePath {
    StorePath::root().child("public_chats")
}

/// `public_chats/{chat_id}`
pub fn public_chat(chat_id: &str) -> StorePath {
    public_chats().child(chat_id)
}

/// `members/{chat_id}`
pub fn members(chat_id: &str) -> StorePath {
    StorePath::root().child("members").child(chat_id)
}

/// `members/{chat_id}/{user_id}`
pub fn member(chat_id: &str, user_id: &str) -> StorePath {
    members(chat_id).child(user_id)
}

/// `users/{user_id}`
pub fn user(user_id: &str) -> StorePath {
    StorePath::root().child("users").child(user_id)
}

/// `users/{user_id}/name`
pub fn username(user_id: &str) -> StorePath {
    user(user_id).child("name")
}

/// `users/{user_id}/profilePicUpdated`
pub fn profile_picture(user_id: &str) -> StorePath {
    user(user_id).child("profilePicUpdated")
}

/// `users/{user_id}/private_chats` or `users/{user_id}/public_chats`
pub fn user_chats(user_id: &str, kind: ChatKind) -> StorePath {
    user(user_id).child(kind.index_segment())
}

/// `users/{user_id}/{private|public}_chats/{chat_id}`
pub fn user_chat(user_id: &str, kind: ChatKind, chat_id: &str) -> StorePath {
    user_chats(user_id, kind).child(chat_id)
}

/// `admins/{chat_id}`
pub fn admin(chat_id: &str) -> StorePath {
    StorePath::root().child("admins").child(chat_id)
}

/// `member_count/{chat_id}`
pub fn member_count(chat_id: &str) -> StorePath {
    StorePath::root().child("member_count").child(chat_id)
}
