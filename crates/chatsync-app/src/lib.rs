//! Application layer for chatsync
//!
//! Screen-session orchestration over the core bookkeeping: the stream
//! coordinator that owns a session's live subscriptions and merged
//! collections, and the one-shot operations screens trigger.
//!
//! # Components
//!
//! - [`StreamCoordinator`]: starts/stops streams, grows pagination windows,
//!   and folds deliveries into ordered collections
//! - [`ChatService`]: send/edit/delete messages, join/leave/create chats
//! - [`ChatPaths`]: store layout differences between private and public chats
//! - [`CoordinatorConfig`]: page sizes, excerpt length, deleted-chat display

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod collection;
mod config;
mod coordinator;
mod paths;
mod service;
mod update;

pub use collection::{ChatCollection, MemberCollection, MessageCollection};
pub use config::CoordinatorConfig;
pub use coordinator::{Lifecycle, StreamCoordinator};
pub use paths::{ChatPaths, PrivateChats, PublicChats, other_participant, paths_for, private_chat_id};
pub use service::ChatService;
pub use update::SessionUpdate;
