//! In-memory backing store.
//!
//! [`MemoryStore`] keeps the whole store as one JSON tree and re-evaluates
//! every live subscription after each write, pushing the difference to its
//! sink. Deliveries are pushed synchronously from inside `write`, so a test
//! that writes and then pumps the coordinator sees every resulting event.
//!
//! Fault injection covers the two failure paths the chat layer handles:
//! [`MemoryStore::deny`] rejects a subtree (cancelling live subscriptions and
//! failing one-shots with the given error), and [`MemoryStore::set_offline`]
//! fails one-shots with [`StoreError::Disconnected`] while subscriptions keep
//! serving cached data.

use std::{
    collections::BTreeMap,
    future::{Future, ready},
    sync::{Arc, Mutex, MutexGuard},
};

use chatsync_core::{
    BackingStore, Delivery, DeliverySink, Notification, Query, Snapshot, StoreError, StoreHandle,
    StorePath, Subscription,
};
use serde_json::{Map, Value};

/// In-memory store for tests and simulation.
///
/// All state is wrapped in `Arc<Mutex<>>` so clones share one tree. Uses
/// `lock().expect()`, which panics if the mutex is poisoned. Acceptable for
/// test code.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    root: Map<String, Value>,
    next_handle: u64,
    live: BTreeMap<StoreHandle, Live>,
    history: Vec<Subscription>,
    denied: Vec<(StorePath, StoreError)>,
    offline: bool,
    writes: usize,
}

struct Live {
    subscription: Subscription,
    sink: DeliverySink,
    seen: Seen,
}

/// Last state pushed to a subscription.
enum Seen {
    Value(Option<Value>),
    Children(Vec<(String, Value)>),
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `path` to `value` without fault checks, notifying subscribers.
    pub fn seed(&self, path: &StorePath, value: Value) {
        let mut inner = self.lock();
        inner.set(path, Some(value));
        inner.notify();
    }

    /// Current value at `path`.
    pub fn get(&self, path: &StorePath) -> Option<Value> {
        self.lock().node(path).cloned()
    }

    /// Check if a node exists at `path`.
    pub fn exists(&self, path: &StorePath) -> bool {
        self.lock().node(path).is_some()
    }

    /// Reject everything at or below `path` with `error`.
    ///
    /// Live subscriptions in the subtree receive a cancellation and stop.
    pub fn deny(&self, path: &StorePath, error: StoreError) {
        let mut inner = self.lock();
        let cancelled: Vec<StoreHandle> = inner
            .live
            .iter()
            .filter(|(_, live)| live.subscription.path().starts_with(path))
            .map(|(handle, _)| *handle)
            .collect();
        for handle in cancelled {
            if let Some(live) = inner.live.remove(&handle) {
                let notification = Notification::Cancelled(error.clone());
                let _ = live.sink.send(Delivery { handle, notification });
            }
        }
        tracing::debug!(%path, %error, "path denied");
        inner.denied.push((path.clone(), error));
    }

    /// Lift every denial.
    pub fn allow_all(&self) {
        self.lock().denied.clear();
    }

    /// Fail one-shot reads and writes with [`StoreError::Disconnected`].
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Number of live subscriptions.
    pub fn live_count(&self) -> usize {
        self.lock().live.len()
    }

    /// Subscriptions currently live, in the order they were opened.
    pub fn live_subscriptions(&self) -> Vec<Subscription> {
        self.lock().live.values().map(|live| live.subscription.clone()).collect()
    }

    /// Every subscription ever opened, in order.
    pub fn history(&self) -> Vec<Subscription> {
        self.lock().history.clone()
    }

    /// Number of successful one-shot writes.
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    #[allow(clippy::expect_used)]
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("Mutex poisoned")
    }

    fn issue(&self, subscription: Subscription, sink: DeliverySink) -> StoreHandle {
        let mut inner = self.lock();
        inner.next_handle += 1;
        let handle = StoreHandle::new(inner.next_handle);
        inner.history.push(subscription.clone());

        if let Err(error) = inner.check(subscription.path()) {
            let _ = sink.send(Delivery { handle, notification: Notification::Cancelled(error) });
            return handle;
        }

        let seen = match &subscription {
            Subscription::Value(_) => Seen::Value(None),
            Subscription::Children(_) => Seen::Children(Vec::new()),
        };
        let mut live = Live { subscription, sink, seen };
        let root = &inner.root;
        live.refresh(handle, root, true);
        inner.live.insert(handle, live);
        tracing::trace!(%handle, "subscription opened");
        handle
    }
}

impl Inner {
    fn check(&self, path: &StorePath) -> Result<(), StoreError> {
        if let Some((_, error)) = self.denied.iter().find(|(denied, _)| path.starts_with(denied)) {
            return Err(error.clone());
        }
        Ok(())
    }

    fn check_one_shot(&self, path: &StorePath) -> Result<(), StoreError> {
        if self.offline {
            return Err(StoreError::Disconnected);
        }
        self.check(path)
    }

    fn node(&self, path: &StorePath) -> Option<&Value> {
        node_at(&self.root, path)
    }

    fn set(&mut self, path: &StorePath, value: Option<Value>) {
        let value = value.and_then(normalize);
        if path.is_root() {
            self.root = match value {
                Some(Value::Object(map)) => map,
                _ => Map::new(),
            };
            return;
        }
        set_at(&mut self.root, path.segments(), value);
    }

    fn notify(&mut self) {
        let root = &self.root;
        for (handle, live) in &mut self.live {
            live.refresh(*handle, root, false);
        }
    }
}

impl Live {
    /// Push whatever changed since the last refresh.
    fn refresh(&mut self, handle: StoreHandle, root: &Map<String, Value>, initial: bool) {
        let mut out = Vec::new();
        match (&self.subscription, &mut self.seen) {
            (Subscription::Value(path), Seen::Value(seen)) => {
                let current = node_at(root, path).cloned();
                if initial || current != *seen {
                    let key = path.last().unwrap_or_default();
                    out.push(Notification::Value(Snapshot::new(key, current.clone())));
                    *seen = current;
                }
            },
            (Subscription::Children(query), Seen::Children(seen)) => {
                let current = visible(root, query);
                diff_children(seen, &current, &mut out);
                *seen = current;
            },
            _ => {},
        }

        for notification in out {
            // The receiver may already be gone; the store does not care.
            let _ = self.sink.send(Delivery { handle, notification });
        }
    }
}

impl BackingStore for MemoryStore {
    fn subscribe_value(&self, path: &StorePath, sink: DeliverySink) -> StoreHandle {
        self.issue(Subscription::Value(path.clone()), sink)
    }

    fn subscribe_child_events(&self, query: &Query, sink: DeliverySink) -> StoreHandle {
        self.issue(Subscription::Children(query.clone()), sink)
    }

    fn unsubscribe(&self, handle: StoreHandle) {
        if self.lock().live.remove(&handle).is_some() {
            tracing::trace!(%handle, "subscription closed");
        }
    }

    fn read_once(&self, query: &Query) -> impl Future<Output = Result<Snapshot, StoreError>> + Send {
        let inner = self.lock();
        let result = inner.check_one_shot(&query.path).map(|()| {
            let key = query.path.last().unwrap_or_default();
            if query.limit.is_none() && query.equal_to.is_none() {
                return Snapshot::new(key, inner.node(&query.path).cloned());
            }
            let selected: Map<String, Value> = visible(&inner.root, query).into_iter().collect();
            let value = (!selected.is_empty()).then_some(Value::Object(selected));
            Snapshot::new(key, value)
        });
        ready(result)
    }

    fn write(
        &self,
        path: &StorePath,
        value: Option<Value>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        let mut inner = self.lock();
        let result = inner.check_one_shot(path).map(|()| {
            inner.set(path, value);
            inner.writes += 1;
            inner.notify();
        });
        if let Err(error) = &result {
            tracing::debug!(%path, %error, "write rejected");
        }
        ready(result)
    }
}

fn node_at<'a>(root: &'a Map<String, Value>, path: &StorePath) -> Option<&'a Value> {
    let (first, rest) = path.segments().split_first()?;
    let mut node = root.get(first)?;
    for segment in rest {
        node = node.get(segment.as_str())?;
    }
    Some(node)
}

/// Children of `query.path` selected by the query, as owned pairs.
fn visible(root: &Map<String, Value>, query: &Query) -> Vec<(String, Value)> {
    let children = if query.path.is_root() {
        Some(root)
    } else {
        node_at(root, &query.path).and_then(Value::as_object)
    };
    let Some(children) = children else {
        return Vec::new();
    };
    query.select(children).into_iter().map(|(k, v)| (k.to_owned(), v.clone())).collect()
}

fn diff_children(
    previous: &[(String, Value)],
    current: &[(String, Value)],
    out: &mut Vec<Notification>,
) {
    let before: BTreeMap<&str, &Value> = previous.iter().map(|(k, v)| (k.as_str(), v)).collect();
    let after: BTreeMap<&str, &Value> = current.iter().map(|(k, v)| (k.as_str(), v)).collect();

    for (key, _) in previous {
        if !after.contains_key(key.as_str()) {
            out.push(Notification::ChildRemoved(key.clone()));
        }
    }
    for (key, value) in current {
        let snapshot = || Snapshot::new(key.clone(), Some(value.clone()));
        match before.get(key.as_str()) {
            None => out.push(Notification::ChildAdded(snapshot())),
            Some(old) if *old != value => out.push(Notification::ChildChanged(snapshot())),
            Some(_) => {},
        }
    }
}

/// Drop nulls and empty objects. `None` if nothing is left.
fn normalize(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(map) => {
            let map: Map<String, Value> =
                map.into_iter().filter_map(|(k, v)| normalize(v).map(|v| (k, v))).collect();
            (!map.is_empty()).then_some(Value::Object(map))
        },
        other => Some(other),
    }
}

/// Set or delete the node at `segments`, pruning parents left empty.
fn set_at(node: &mut Map<String, Value>, segments: &[String], value: Option<Value>) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        match value {
            Some(value) => node.insert(first.clone(), value),
            None => node.remove(first),
        };
        return;
    }
    if value.is_none() && !node.get(first).is_some_and(Value::is_object) {
        return;
    }

    let child = node.entry(first.clone()).or_insert_with(|| Value::Object(Map::new()));
    if !child.is_object() {
        *child = Value::Object(Map::new());
    }
    let now_empty = match child {
        Value::Object(map) => {
            set_at(map, rest, value);
            map.is_empty()
        },
        _ => false,
    };
    if now_empty {
        node.remove(first);
    }
}
