//! Typed stream events.

use serde::de::DeserializeOwned;

use crate::{error::StoreError, store::Notification};

/// Change to one keyed collection, decoded from a child notification.
///
/// Removal is its own variant; there is no placeholder value standing in for
/// a deleted entry.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent<T> {
    /// Entry entered the subscribed window.
    Added(String, T),
    /// Entry inside the window changed.
    Changed(String, T),
    /// Entry left the window or was deleted.
    Removed(String),
    /// Subscription was cancelled by the store.
    Cancelled(StoreError),
}

impl<T: DeserializeOwned> StreamEvent<T> {
    /// Decode a child notification.
    ///
    /// Returns `Ok(None)` for value notifications, which carry no child
    /// event. A child that decodes to a missing value is reported as
    /// [`StreamEvent::Removed`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Decode`] if the child has the wrong shape.
    pub fn decode(notification: Notification) -> Result<Option<Self>, StoreError> {
        let event = match notification {
            Notification::Value(_) => return Ok(None),
            Notification::ChildAdded(snapshot) => match snapshot.decode::<T>()? {
                Some(value) => Self::Added(snapshot.key().to_owned(), value),
                None => Self::Removed(snapshot.key().to_owned()),
            },
            Notification::ChildChanged(snapshot) => match snapshot.decode::<T>()? {
                Some(value) => Self::Changed(snapshot.key().to_owned(), value),
                None => Self::Removed(snapshot.key().to_owned()),
            },
            Notification::ChildRemoved(key) => Self::Removed(key),
            Notification::Cancelled(err) => Self::Cancelled(err),
        };
        Ok(Some(event))
    }
}

impl<T> StreamEvent<T> {
    /// Key of the affected entry. `None` for cancellations.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Added(key, _) | Self::Changed(key, _) | Self::Removed(key) => Some(key),
            Self::Cancelled(_) => None,
        }
    }

    /// Transform the payload.
    pub fn map<U>(self, f: impl FnOnce(&str, T) -> U) -> StreamEvent<U> {
        match self {
            Self::Added(key, value) => {
                let value = f(&key, value);
                StreamEvent::Added(key, value)
            },
            Self::Changed(key, value) => {
                let value = f(&key, value);
                StreamEvent::Changed(key, value)
            },
            Self::Removed(key) => StreamEvent::Removed(key),
            Self::Cancelled(err) => StreamEvent::Cancelled(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{Snapshot, model::MessageRecord};

    #[test]
    fn added_decodes_record() {
        let snapshot = Snapshot::new("m1", Some(json!({ "sender": "u1", "text": "hi", "timestamp": 100 })));
        let event = StreamEvent::<MessageRecord>::decode(Notification::ChildAdded(snapshot))
            .unwrap()
            .unwrap();
        match event {
            StreamEvent::Added(key, record) => {
                assert_eq!(key, "m1");
                assert_eq!(record.text, "hi");
                assert_eq!(record.timestamp, 100);
            },
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn removed_carries_only_key() {
        let event =
            StreamEvent::<MessageRecord>::decode(Notification::ChildRemoved("m1".into())).unwrap();
        assert_eq!(event, Some(StreamEvent::Removed("m1".into())));
    }

    #[test]
    fn value_notifications_are_not_child_events() {
        let event =
            StreamEvent::<bool>::decode(Notification::Value(Snapshot::missing("x"))).unwrap();
        assert!(event.is_none());
    }

    #[test]
    fn cancelled_has_no_key() {
        let event = StreamEvent::<bool>::Cancelled(StoreError::Disconnected);
        assert!(event.key().is_none());
    }

    #[test]
    fn map_preserves_key() {
        let event = StreamEvent::Changed("u1".to_owned(), true);
        let mapped = event.map(|key, flag| format!("{key}={flag}"));
        assert_eq!(mapped, StreamEvent::Changed("u1".into(), "u1=true".to_owned()));
    }
}
