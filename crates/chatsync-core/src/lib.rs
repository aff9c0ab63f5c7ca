//! Chatsync core
//!
//! Subscription bookkeeping and pagination logic for chat clients backed by a
//! real-time store. Everything in this crate is synchronous bookkeeping over
//! the [`BackingStore`] capability: the store pushes notifications into a
//! queue, and the session owner decides what to apply.
//!
//! # Components
//!
//! - [`ListenerRegistry`]: at most one live store subscription per
//!   [`SubscriptionKey`], with idempotent attach/detach
//! - [`BatchWindowTracker`]: decides how many trailing items a paginated
//!   stream subscribes to
//! - [`StreamEvent`]: typed Added/Changed/Removed/Cancelled events decoded
//!   from raw store notifications
//! - [`BackingStore`]: the store capability the core consumes
//! - [`env::Environment`]: time and randomness, swappable for simulation

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod env;
pub mod error;
mod event;
mod key;
pub mod model;
pub mod path;
mod query;
mod registry;
mod snapshot;
pub mod store;
mod window;

pub use error::{StoreError, SyncError, ValidationError};
pub use event::StreamEvent;
pub use key::{EntityKind, SubscriptionKey};
pub use model::{ChatEntry, ChatKind, ChatRecord, MessageEntry, MessageRecord};
pub use path::StorePath;
pub use query::{Limit, OrderBy, Query};
pub use registry::ListenerRegistry;
pub use snapshot::Snapshot;
pub use store::{BackingStore, Delivery, DeliverySink, Notification, StoreHandle, Subscription};
pub use window::{
    BatchWindowTracker, FIRST_PAGE_SIZE, PAGE_SIZE, WindowDecision, WindowPhase, WindowState,
};
