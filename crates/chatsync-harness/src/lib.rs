//! Deterministic simulation harness for chatsync.
//!
//! In-memory implementations of the [`BackingStore`] and [`Environment`]
//! capabilities, so whole screen sessions run single-threaded and replay
//! exactly from a seed.
//!
//! # Model-Based Testing
//!
//! The `model` module provides a reference implementation of one chat's
//! message window. Operations are applied to both the model and a real
//! [`StreamCoordinator`] over [`MemoryStore`], and their observable states are
//! compared.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks properties that must hold after every
//! applied delivery: ordering of rendered collections, one live subscription
//! per key, windows that are whole pages. Use
//! [`InvariantRegistry::standard()`] for the common set.
//!
//! [`BackingStore`]: chatsync_core::BackingStore
//! [`Environment`]: chatsync_core::env::Environment
//! [`StreamCoordinator`]: chatsync_app::StreamCoordinator

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod memory;
pub mod model;
pub mod sim_env;

pub use invariants::{
    ChatsNewestFirst, DeletedChatsHidden, Invariant, InvariantRegistry, InvariantResult,
    MessagesAscending, RegistryConsistency, SessionSnapshot, Violation, WindowsWholePages,
};
pub use memory::MemoryStore;
pub use model::{ModelChat, ModelMessage, Operation, SessionDriver};
pub use sim_env::SimEnv;
