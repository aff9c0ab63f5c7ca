//! Updates emitted to the screen after applying deliveries.

/// What changed in session state. The screen re-reads the named part.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SessionUpdate {
    /// The chat list changed.
    ChatsChanged,
    /// The public chat directory changed.
    DirectoryChanged,
    /// Messages of a chat changed.
    MessagesChanged {
        /// Chat id.
        chat_id: String,
    },
    /// A chat became empty or got its first message.
    MessagesStateChanged {
        /// Chat id.
        chat_id: String,
    },
    /// Members of a chat changed.
    MembersChanged {
        /// Chat id.
        chat_id: String,
    },
    /// A user's display name changed.
    UsernameChanged {
        /// User id.
        user_id: String,
    },
    /// A user's profile picture marker changed.
    ProfilePictureChanged {
        /// User id.
        user_id: String,
    },
    /// Admin, member count, or membership of a chat changed.
    ChatStatusChanged {
        /// Chat id.
        chat_id: String,
    },
    /// A subscription was cancelled; see the coordinator's error message.
    Error {
        /// User-visible message.
        message: String,
    },
}
