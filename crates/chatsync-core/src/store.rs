//! Backing store capability.
//!
//! The chat layer never talks to a concrete database. It consumes the
//! [`BackingStore`] trait, injected by whoever builds the session:
//!
//! - live subscriptions push [`Delivery`] values into a [`DeliverySink`] from
//!   whatever context the store runs its callbacks on
//! - one-shot reads and writes are futures that complete exactly once
//!
//! Deliveries are tagged with the [`StoreHandle`] of the subscription that
//! produced them, so the receiver can tell a live subscription's events from
//! stragglers of one it already cancelled.

use std::{fmt, future::Future};

use serde_json::Value;
use tokio::sync::mpsc;

use crate::{error::StoreError, path::StorePath, query::Query, snapshot::Snapshot};

/// Opaque token for one live store subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreHandle(u64);

impl StoreHandle {
    /// Wrap a store-assigned id.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Store-assigned id.
    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a subscription listens to.
#[derive(Debug, Clone, PartialEq)]
pub enum Subscription {
    /// Whole value of one node, re-sent on every change.
    Value(StorePath),
    /// Per-child added/changed/removed events within a query window.
    Children(Query),
}

impl Subscription {
    /// Node the subscription is rooted at.
    pub fn path(&self) -> &StorePath {
        match self {
            Self::Value(path) => path,
            Self::Children(query) => &query.path,
        }
    }

    /// Window bound of a child subscription.
    pub fn window(&self) -> Option<usize> {
        match self {
            Self::Value(_) => None,
            Self::Children(query) => query.window(),
        }
    }
}

/// Raw notification from a live subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Current value of a value subscription.
    Value(Snapshot),
    /// Child entered the query window.
    ChildAdded(Snapshot),
    /// Child inside the window changed.
    ChildChanged(Snapshot),
    /// Child left the window or was deleted.
    ChildRemoved(String),
    /// Store cancelled the subscription. No further notifications follow.
    Cancelled(StoreError),
}

/// Notification tagged with the subscription that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Subscription that produced the notification.
    pub handle: StoreHandle,
    /// The notification.
    pub notification: Notification,
}

/// Queue the store pushes deliveries into.
pub type DeliverySink = mpsc::UnboundedSender<Delivery>;

/// Real-time store the chat layer consumes.
///
/// Subscribing never fails synchronously: a rejected subscription is
/// reported as a [`Notification::Cancelled`] delivery. For a single handle,
/// notifications are pushed in the order the store observed the changes.
pub trait BackingStore: Send + Sync {
    /// Listen to the whole value at `path`.
    fn subscribe_value(&self, path: &StorePath, sink: DeliverySink) -> StoreHandle;

    /// Listen to child events within `query`.
    fn subscribe_child_events(&self, query: &Query, sink: DeliverySink) -> StoreHandle;

    /// Stop a subscription. Unknown handles are ignored.
    fn unsubscribe(&self, handle: StoreHandle);

    /// Read the children selected by `query` once.
    ///
    /// An unbounded query over a leaf returns the leaf's value.
    fn read_once(&self, query: &Query) -> impl Future<Output = Result<Snapshot, StoreError>> + Send;

    /// Set the value at `path`. `None` deletes the node.
    fn write(
        &self,
        path: &StorePath,
        value: Option<Value>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Dispatch on the subscription variant.
    fn subscribe(&self, subscription: &Subscription, sink: DeliverySink) -> StoreHandle {
        match subscription {
            Subscription::Value(path) => self.subscribe_value(path, sink),
            Subscription::Children(query) => self.subscribe_child_events(query, sink),
        }
    }

    /// Read the value at `path` once.
    fn read_value(
        &self,
        path: &StorePath,
    ) -> impl Future<Output = Result<Snapshot, StoreError>> + Send {
        let query = Query::at(path.clone());
        async move { self.read_once(&query).await }
    }
}
