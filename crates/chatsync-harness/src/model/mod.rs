//! Model-based testing of one chat's message stream.
//!
//! [`ModelChat`] is the oracle: a plain ordered map of stored messages plus
//! the expected window size. [`SessionDriver`] applies the same
//! [`Operation`]s to a real coordinator and service over
//! [`MemoryStore`](crate::MemoryStore), and both sides are reduced to an
//! [`ObservableState`] for comparison.

mod chat;
mod driver;
mod operation;

pub use chat::{ModelChat, ModelMessage, ObservableState};
pub use driver::{PEER, SessionDriver, USER};
pub use operation::{Operation, SmallText};
