//! Logical subscription identity.

use std::fmt;

use crate::{error::ValidationError, model::ChatKind};

/// Kind of entity a subscription streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    /// Metadata of one chat.
    Chat(ChatKind),
    /// Messages of one chat, ordered by timestamp.
    Messages,
    /// Whether one chat has any messages at all.
    MessagesState,
    /// Member flags of one public chat.
    Members,
    /// Display name of one user.
    Username,
    /// Profile picture marker of one user.
    ProfilePicture,
    /// Chat ids of one kind the user belongs to.
    Memberships(ChatKind),
    /// All public chats, for browsing.
    PublicDirectory,
    /// Admin of one public chat.
    Admin,
    /// Member count of one public chat.
    MemberCount,
    /// Whether the current user is a member of one public chat.
    MemberFlag,
}

impl EntityKind {
    /// Check if the stream is paginated through a window.
    pub fn is_paged(self) -> bool {
        matches!(self, Self::Messages | Self::Members | Self::PublicDirectory)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chat(kind) => write!(f, "{kind}-chat"),
            Self::Messages => f.write_str("messages"),
            Self::MessagesState => f.write_str("messages-state"),
            Self::Members => f.write_str("members"),
            Self::Username => f.write_str("username"),
            Self::ProfilePicture => f.write_str("profile-picture"),
            Self::Memberships(kind) => write!(f, "{kind}-memberships"),
            Self::PublicDirectory => f.write_str("public-directory"),
            Self::Admin => f.write_str("admin"),
            Self::MemberCount => f.write_str("member-count"),
            Self::MemberFlag => f.write_str("member-flag"),
        }
    }
}

/// Identifies one logical stream: entity kind plus chat or user id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionKey {
    kind: EntityKind,
    scope: String,
}

impl SubscriptionKey {
    /// Create a key.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyScope`] if `scope` is empty.
    pub fn new(kind: EntityKind, scope: impl Into<String>) -> Result<Self, ValidationError> {
        let scope = scope.into();
        if scope.is_empty() {
            return Err(ValidationError::EmptyScope { kind });
        }
        Ok(Self { kind, scope })
    }

    /// Entity kind.
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Chat or user id the stream is scoped to.
    pub fn scope(&self) -> &str {
        &self.scope
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.scope)
    }
}
