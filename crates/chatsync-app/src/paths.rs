//! Store layout per chat kind.
//!
//! Private and public chats share every stream except where their metadata
//! and membership live. [`ChatPaths`] captures just those differences, so the
//! coordinator and the one-shot service are written once for both kinds.
//!
//! | | private | public |
//! |---|---|---|
//! | metadata | `private_chats/{user}/{chat}` (one copy per participant) | `public_chats/{chat}` |
//! | membership flag | `users/{user}/private_chats/{chat}` | `members/{chat}/{user}` |

use chatsync_core::{
    ChatKind, StorePath, ValidationError,
    path::{self, user_chat},
};

/// Store paths that differ between chat kinds.
pub trait ChatPaths: Send + Sync {
    /// Kind these paths belong to.
    fn kind(&self) -> ChatKind;

    /// Metadata node `user_id` sees for `chat_id`.
    fn metadata(&self, user_id: &str, chat_id: &str) -> StorePath;

    /// Every metadata copy a last-message update must reach.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::ForeignPrivateChat`] if a private chat id
    /// does not include `user_id`.
    fn metadata_copies(&self, user_id: &str, chat_id: &str)
    -> Result<Vec<StorePath>, ValidationError>;

    /// Node that exists while `user_id` is a member of `chat_id`.
    fn member_flag(&self, user_id: &str, chat_id: &str) -> StorePath;

    /// Index of the chat ids of this kind `user_id` belongs to.
    fn memberships(&self, user_id: &str) -> StorePath {
        path::user_chats(user_id, self.kind())
    }
}

/// One-to-one chats. Ids are the two user ids joined by `_`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrivateChats;

impl ChatPaths for PrivateChats {
    fn kind(&self) -> ChatKind {
        ChatKind::Private
    }

    fn metadata(&self, user_id: &str, chat_id: &str) -> StorePath {
        path::private_chat(user_id, chat_id)
    }

    fn metadata_copies(
        &self,
        user_id: &str,
        chat_id: &str,
    ) -> Result<Vec<StorePath>, ValidationError> {
        let other = other_participant(chat_id, user_id)?;
        Ok(vec![path::private_chat(user_id, chat_id), path::private_chat(other, chat_id)])
    }

    fn member_flag(&self, user_id: &str, chat_id: &str) -> StorePath {
        user_chat(user_id, ChatKind::Private, chat_id)
    }
}

/// Group chats with shared metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublicChats;

impl ChatPaths for PublicChats {
    fn kind(&self) -> ChatKind {
        ChatKind::Public
    }

    fn metadata(&self, _user_id: &str, chat_id: &str) -> StorePath {
        path::public_chat(chat_id)
    }

    fn metadata_copies(
        &self,
        _user_id: &str,
        chat_id: &str,
    ) -> Result<Vec<StorePath>, ValidationError> {
        Ok(vec![path::public_chat(chat_id)])
    }

    fn member_flag(&self, user_id: &str, chat_id: &str) -> StorePath {
        path::member(chat_id, user_id)
    }
}

/// Path strategy for `kind`.
pub fn paths_for(kind: ChatKind) -> &'static dyn ChatPaths {
    match kind {
        ChatKind::Private => &PrivateChats,
        ChatKind::Public => &PublicChats,
    }
}

/// Id of the private chat between two users.
///
/// Ids are ordered case-insensitively, so both users derive the same chat id.
pub fn private_chat_id(a: &str, b: &str) -> String {
    let mut ids = [a, b];
    ids.sort_by(|x, y| x.to_lowercase().cmp(&y.to_lowercase()).then(x.cmp(y)));
    ids.join("_")
}

/// The participant of a private chat who is not `user_id`.
///
/// User ids may contain `_` themselves, so the chat id is matched against
/// `{user_id}_` and `_{user_id}` rather than split.
///
/// # Errors
///
/// Returns [`ValidationError::ForeignPrivateChat`] if `chat_id` neither
/// starts with `{user_id}_` nor ends with `_{user_id}`.
pub fn other_participant<'a>(chat_id: &'a str, user_id: &str) -> Result<&'a str, ValidationError> {
    let first = chat_id.strip_prefix(user_id).and_then(|rest| rest.strip_prefix('_'));
    let second = chat_id.strip_suffix(user_id).and_then(|rest| rest.strip_suffix('_'));

    first.filter(|other| !other.is_empty()).or(second.filter(|other| !other.is_empty())).ok_or_else(
        || ValidationError::ForeignPrivateChat {
            chat_id: chat_id.to_owned(),
            user_id: user_id.to_owned(),
        },
    )
}
