//! Error types for the chat sync layer.
//!
//! Three tiers, matching how each failure is handled:
//!
//! - [`StoreError`]: what the backing store reports, either asynchronously on
//!   a live subscription or as the result of a one-shot read/write.
//! - [`ValidationError`]: caller passed something invalid. Indicates a logic
//!   bug, never a runtime condition.
//! - [`SyncError`]: the taxonomy surfaced to callers. Cancellations are
//!   recovered into session state; one-shot failures are returned to the call
//!   site; validation failures propagate.

use thiserror::Error;

use crate::key::{EntityKind, SubscriptionKey};

/// Errors reported by the backing store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Security rules rejected the read, write, or subscription.
    #[error("permission denied at {path}")]
    PermissionDenied {
        /// Path that was rejected.
        path: String,
    },

    /// Store is unreachable.
    #[error("store disconnected")]
    Disconnected,

    /// Snapshot did not match the expected shape.
    #[error("failed to decode snapshot at {key}: {reason}")]
    Decode {
        /// Key of the offending snapshot.
        key: String,
        /// Decoder message.
        reason: String,
    },

    /// Any other store failure.
    #[error("store error: {0}")]
    Other(String),
}

impl StoreError {
    /// Returns true if this error may clear up without caller action.
    ///
    /// Only connectivity loss qualifies. Permission and decode failures will
    /// repeat until data or rules change.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

/// Invalid input from the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Subscription key with an empty chat or user id.
    #[error("empty scope id for {kind} subscription")]
    EmptyScope {
        /// Kind of the rejected key.
        kind: EntityKind,
    },

    /// Key is already attached to a different query.
    #[error("{key} is already attached with a different subscription")]
    ConflictingSubscription {
        /// Key that is already owned.
        key: SubscriptionKey,
    },

    /// Pagination requested on a stream that has no window.
    #[error("{kind} streams are not paginated")]
    NotPaged {
        /// Kind that was asked to paginate.
        kind: EntityKind,
    },

    /// Private chat id that does not name the current user.
    #[error("private chat id {chat_id} does not include user {user_id}")]
    ForeignPrivateChat {
        /// Offending chat id.
        chat_id: String,
        /// Current user.
        user_id: String,
    },

    /// Message id not present in the loaded window.
    #[error("message {message_id} is not loaded in chat {chat_id}")]
    UnknownMessage {
        /// Chat the message was looked up in.
        chat_id: String,
        /// Missing message id.
        message_id: String,
    },

    /// Public chat title is empty or whitespace. Empty titles mark deleted
    /// chats.
    #[error("chat title must not be empty")]
    EmptyTitle,

    /// Configuration value out of range.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Errors surfaced by the chat sync layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// A live subscription was cancelled by the store.
    #[error("subscription {key} cancelled: {reason}")]
    TransportCancelled {
        /// Subscription that was cancelled.
        key: SubscriptionKey,
        /// Store-reported cause.
        reason: StoreError,
    },

    /// A one-shot read or write failed.
    #[error("{operation} failed: {source}")]
    OneShotFailure {
        /// Operation that failed.
        operation: &'static str,
        /// Store-reported cause.
        #[source]
        source: StoreError,
    },

    /// Caller passed an invalid key, id, or configuration.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl SyncError {
    /// Adapter for `map_err` on store calls made by `operation`.
    pub fn one_shot(operation: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| Self::OneShotFailure { operation, source }
    }

    /// Returns true if retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::TransportCancelled { reason, .. } => reason.is_transient(),
            Self::OneShotFailure { source, .. } => source.is_transient(),
            Self::Validation(_) => false,
        }
    }

    /// Message to show the user.
    ///
    /// Store causes are shown without the subscription or operation prefix.
    pub fn user_message(&self) -> String {
        match self {
            Self::TransportCancelled { reason, .. } => reason.to_string(),
            Self::OneShotFailure { source, .. } => source.to_string(),
            Self::Validation(err) => err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_disconnects_are_transient() {
        assert!(StoreError::Disconnected.is_transient());
        assert!(!StoreError::PermissionDenied { path: "/a".into() }.is_transient());
        assert!(!StoreError::Other("boom".into()).is_transient());
    }

    #[test]
    fn validation_is_never_transient() {
        let err = SyncError::from(ValidationError::Config("page size is zero".into()));
        assert!(!err.is_transient());
    }

    #[test]
    fn one_shot_keeps_operation_name() {
        let err = SyncError::one_shot("send_message")(StoreError::Disconnected);
        assert_eq!(err.to_string(), "send_message failed: store disconnected");
        assert_eq!(err.user_message(), "store disconnected");
        assert!(err.is_transient());
    }
}
