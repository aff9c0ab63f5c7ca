//! Session invariants.
//!
//! An invariant is a property of rendered state and open subscriptions that
//! holds after every drained delivery, whatever order the store produced
//! them in. Checks run against a [`SessionSnapshot`] so one capture is judged
//! by every check at once.
//!
//! ```ignore
//! let invariants = InvariantRegistry::standard();
//! invariants.check_session(&coordinator, Some(store.live_count()))?;
//! ```

mod checks;
mod snapshot;

use std::fmt;

use chatsync_app::StreamCoordinator;
use chatsync_core::BackingStore;

pub use checks::{
    ChatsNewestFirst, DeletedChatsHidden, MessagesAscending, RegistryConsistency,
    WindowsWholePages,
};
pub use snapshot::{ChatRow, SessionSnapshot, WindowRow};

/// Outcome of one check.
pub type InvariantResult = Result<(), Violation>;

/// A broken invariant, located at the list, chat, or stream it concerns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Name of the invariant.
    pub invariant: &'static str,
    /// Where it broke: a rendered list, a chat id, or a stream key.
    pub subject: String,
    /// What was observed.
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.invariant, self.subject, self.message)
    }
}

impl std::error::Error for Violation {}

/// A property every [`SessionSnapshot`] must satisfy.
pub trait Invariant: Send + Sync {
    /// Name used in violations.
    fn name(&self) -> &'static str;

    /// Judge one snapshot.
    fn check(&self, state: &SessionSnapshot) -> InvariantResult;

    /// Violation of this invariant at `subject`.
    fn violation(&self, subject: impl Into<String>, message: String) -> Violation
    where
        Self: Sized,
    {
        Violation { invariant: self.name(), subject: subject.into(), message }
    }
}

/// Set of invariants judged together.
#[derive(Default)]
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl InvariantRegistry {
    /// Registry with no checks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every session invariant: message and chat ordering, deleted chats
    /// hidden, one store subscription per key, whole-page windows.
    pub fn standard() -> Self {
        Self::new()
            .with(MessagesAscending)
            .with(ChatsNewestFirst)
            .with(DeletedChatsHidden)
            .with(RegistryConsistency)
            .with(WindowsWholePages)
    }

    /// Add a check.
    #[must_use]
    pub fn with<I: Invariant + 'static>(mut self, invariant: I) -> Self {
        self.invariants.push(Box::new(invariant));
        self
    }

    /// Names of the registered checks, in the order they run.
    pub fn names(&self) -> Vec<&'static str> {
        self.invariants.iter().map(|inv| inv.name()).collect()
    }

    /// Run every check, collecting all violations.
    pub fn check_all(&self, state: &SessionSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();
        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Capture `coordinator` and run every check. `store_live` is the
    /// store's live subscription count, when the store exposes one.
    pub fn check_session<S: BackingStore>(
        &self,
        coordinator: &StreamCoordinator<S>,
        store_live: Option<usize>,
    ) -> Result<(), Vec<Violation>> {
        let mut snapshot = SessionSnapshot::capture(coordinator);
        snapshot.store_live = store_live;
        self.check_all(&snapshot)
    }

    /// Run every check and panic listing all violations, prefixed by
    /// `context`.
    #[allow(clippy::panic)]
    pub fn assert_all(&self, state: &SessionSnapshot, context: &str) {
        if let Err(violations) = self.check_all(state) {
            let lines: Vec<_> = violations.iter().map(ToString::to_string).collect();
            panic!("{context}: {}", lines.join("; "));
        }
    }
}
