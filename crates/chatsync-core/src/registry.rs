//! Listener registry for live store subscriptions.
//!
//! The registry maintains a bidirectional mapping: key → handle (to detach
//! and to enforce one live subscription per key) and handle → key (to route
//! deliveries, and to recognise deliveries from subscriptions that were
//! already detached). Both directions are O(1).

use std::collections::HashMap;

use crate::{
    error::ValidationError,
    key::SubscriptionKey,
    store::{BackingStore, DeliverySink, StoreHandle, Subscription},
};

#[derive(Debug, Clone)]
struct Entry {
    handle: StoreHandle,
    subscription: Subscription,
}

/// Registry of live store subscriptions, one per [`SubscriptionKey`].
///
/// Attach and detach are idempotent. A key attached twice with the same
/// subscription keeps its original handle; the store sees one subscription.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    /// Key → live subscription
    entries: HashMap<SubscriptionKey, Entry>,
    /// Handle → key (reverse index)
    handles: HashMap<StoreHandle, SubscriptionKey>,
}

impl ListenerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `subscription` under `key`, or return the handle already live
    /// for it.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::ConflictingSubscription`] if `key` is live
    /// with a different subscription. Re-scoping a key requires a detach
    /// first.
    pub fn attach<S: BackingStore>(
        &mut self,
        store: &S,
        key: SubscriptionKey,
        subscription: Subscription,
        sink: &DeliverySink,
    ) -> Result<StoreHandle, ValidationError> {
        if let Some(entry) = self.entries.get(&key) {
            if entry.subscription == subscription {
                tracing::trace!(%key, handle = %entry.handle, "already attached");
                return Ok(entry.handle);
            }
            return Err(ValidationError::ConflictingSubscription { key });
        }

        let handle = store.subscribe(&subscription, sink.clone());
        tracing::debug!(%key, %handle, path = %subscription.path(), window = ?subscription.window(), "attached");

        self.handles.insert(handle, key.clone());
        self.entries.insert(key, Entry { handle, subscription });
        Ok(handle)
    }

    /// Detach the subscription under `key`.
    ///
    /// Returns the released handle, or `None` if nothing was attached.
    pub fn detach<S: BackingStore>(
        &mut self,
        store: &S,
        key: &SubscriptionKey,
    ) -> Option<StoreHandle> {
        let entry = self.entries.remove(key)?;
        self.handles.remove(&entry.handle);
        store.unsubscribe(entry.handle);
        tracing::debug!(%key, handle = %entry.handle, "detached");
        Some(entry.handle)
    }

    /// Detach every key matching `predicate`. Returns how many were detached.
    pub fn detach_where<S: BackingStore>(
        &mut self,
        store: &S,
        predicate: impl Fn(&SubscriptionKey) -> bool,
    ) -> usize {
        let keys: Vec<_> = self.entries.keys().filter(|k| predicate(k)).cloned().collect();
        keys.iter().filter(|key| self.detach(store, key).is_some()).count()
    }

    /// Detach every key. Returns how many were detached.
    pub fn detach_all<S: BackingStore>(&mut self, store: &S) -> usize {
        self.detach_where(store, |_| true)
    }

    /// Key a live handle belongs to. `None` for unknown or detached handles.
    pub fn key_for(&self, handle: StoreHandle) -> Option<&SubscriptionKey> {
        self.handles.get(&handle)
    }

    /// Live handle for `key`. `None` if not attached.
    pub fn handle(&self, key: &SubscriptionKey) -> Option<StoreHandle> {
        self.entries.get(key).map(|e| e.handle)
    }

    /// Live subscription for `key`. `None` if not attached.
    pub fn subscription(&self, key: &SubscriptionKey) -> Option<&Subscription> {
        self.entries.get(key).map(|e| &e.subscription)
    }

    /// Check if `key` is attached.
    pub fn is_attached(&self, key: &SubscriptionKey) -> bool {
        self.entries.contains_key(key)
    }

    /// All attached keys.
    pub fn keys(&self) -> impl Iterator<Item = &SubscriptionKey> + '_ {
        self.entries.keys()
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no subscription is live.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
