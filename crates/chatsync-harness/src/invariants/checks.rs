//! Standard invariant checks.
//!
//! These invariants capture behavioral properties that must always hold.
//! They verify WHAT must be true, not specific test scenarios.

use std::collections::HashMap;

use super::{ChatRow, Invariant, InvariantResult, SessionSnapshot};

/// Messages render in strictly ascending `(timestamp, id)` order.
///
/// Holds regardless of the order deliveries arrived in.
pub struct MessagesAscending;

impl Invariant for MessagesAscending {
    fn name(&self) -> &'static str {
        "MessagesAscending"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        for (chat_id, rows) in &state.messages {
            for pair in rows.windows(2) {
                if pair[0] >= pair[1] {
                    return Err(self.violation(
                        chat_id,
                        format!("{:?} rendered before {:?}", pair[0], pair[1]),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Chat list and directory render newest first, ties by descending id.
pub struct ChatsNewestFirst;

impl ChatsNewestFirst {
    fn check_rows(&self, list: &str, rows: &[ChatRow]) -> InvariantResult {
        for pair in rows.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if (a.timestamp, &a.id) <= (b.timestamp, &b.id) {
                return Err(self.violation(
                    list,
                    format!("{} ({}) rendered before {} ({})", a.id, a.timestamp, b.id, b.timestamp),
                ));
            }
        }
        Ok(())
    }
}

impl Invariant for ChatsNewestFirst {
    fn name(&self) -> &'static str {
        "ChatsNewestFirst"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        self.check_rows("chats", &state.chats)?;
        self.check_rows("directory", &state.directory)
    }
}

/// Chats with deleted metadata render only when configured to.
pub struct DeletedChatsHidden;

impl Invariant for DeletedChatsHidden {
    fn name(&self) -> &'static str {
        "DeletedChatsHidden"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        if state.show_deleted {
            return Ok(());
        }
        match state.chats.iter().chain(&state.directory).find(|row| row.deleted) {
            Some(row) => Err(self.violation(&row.id, "deleted chat is rendered".to_owned())),
            None => Ok(()),
        }
    }
}

/// Every live key owns exactly one store subscription.
///
/// No two keys share a handle, and when the store's live count was captured
/// it equals the number of registered keys.
pub struct RegistryConsistency;

impl Invariant for RegistryConsistency {
    fn name(&self) -> &'static str {
        "RegistryConsistency"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        let mut owners: HashMap<u64, &str> = HashMap::new();
        for (key, handle) in &state.subscriptions {
            if let Some(other) = owners.insert(*handle, key) {
                return Err(self.violation(key, format!("handle #{handle} also owned by {other}")));
            }
        }

        match state.store_live {
            Some(live) if live != state.subscriptions.len() => Err(self.violation(
                "store",
                format!(
                    "{live} live subscriptions, registry has {}",
                    state.subscriptions.len()
                ),
            )),
            _ => Ok(()),
        }
    }
}

/// A window is 0 or the first page plus a whole number of pages.
pub struct WindowsWholePages;

impl Invariant for WindowsWholePages {
    fn name(&self) -> &'static str {
        "WindowsWholePages"
    }

    fn check(&self, state: &SessionSnapshot) -> InvariantResult {
        for window in &state.windows {
            let whole = window.size == 0
                || (window.size >= window.first_page_size
                    && (window.size - window.first_page_size) % window.page_size == 0);
            if !whole {
                return Err(self.violation(
                    &window.key,
                    format!(
                        "window {} is not {} + n * {}",
                        window.size, window.first_page_size, window.page_size
                    ),
                ));
            }
        }
        Ok(())
    }
}
