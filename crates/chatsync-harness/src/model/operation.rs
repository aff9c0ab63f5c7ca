//! Operations for model-based testing.
//!
//! Operations are generated randomly by proptest (or by the fuzzer through
//! `arbitrary`) and applied to both the model and the real session.

use arbitrary::Arbitrary;

/// Actions a user or the app can take on an open chat screen.
#[derive(Debug, Clone, Arbitrary)]
pub enum Operation {
    /// Send a message.
    Send {
        /// Sent by the other participant instead of the session user.
        from_peer: bool,
        /// Message content.
        text: SmallText,
    },

    /// Edit the newest loaded message.
    EditNewest {
        /// Replacement content.
        text: SmallText,
    },

    /// Delete the newest loaded message.
    DeleteNewest,

    /// Delete the oldest loaded message.
    DeleteOldest,

    /// Scroll to the oldest loaded message, asking for more.
    ScrollToTop,

    /// App went to the background and came back.
    Resume,

    /// Screen stopped and started again with its window retained.
    Restart,

    /// Advance the virtual clock.
    AdvanceTime {
        /// Milliseconds to advance.
        millis: u16,
    },
}

/// Small message content for testing.
///
/// Kept compact so shrunk cases stay readable; the text is deterministic
/// from the seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub struct SmallText {
    /// Message seed.
    pub seed: u8,
}

impl SmallText {
    /// Expand to message text.
    pub fn text(self) -> String {
        format!("message {}", self.seed)
    }
}
