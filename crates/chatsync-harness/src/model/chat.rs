//! Reference model of one chat.

use std::collections::BTreeMap;

use chatsync_core::model::excerpt;

/// A message as observed on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelMessage {
    /// Send time.
    pub timestamp: i64,
    /// Current text.
    pub text: String,
    /// Edited after sending.
    pub edited: bool,
}

/// Observable state for oracle comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservableState {
    /// Rendered messages, oldest first.
    pub messages: Vec<ModelMessage>,
    /// Window size of the message stream.
    pub window: usize,
    /// Last-message excerpt stored on the chat's metadata.
    pub last_message: String,
}

/// Reference implementation of a chat screen's message window.
///
/// Stored messages are keyed by timestamp, which the simulated clock keeps
/// unique. The rendered view is always the newest `window` messages.
#[derive(Debug, Clone)]
pub struct ModelChat {
    stored: BTreeMap<i64, ModelMessage>,
    window: usize,
    page_size: usize,
    excerpt_len: usize,
    last_message: String,
}

impl ModelChat {
    /// Chat whose screen has started with `first_page_size`.
    pub fn new(first_page_size: usize, page_size: usize, excerpt_len: usize) -> Self {
        Self {
            stored: BTreeMap::new(),
            window: first_page_size,
            page_size,
            excerpt_len,
            last_message: String::new(),
        }
    }

    /// A message was sent at `timestamp`.
    pub fn send(&mut self, timestamp: i64, text: &str) {
        self.stored.insert(timestamp, ModelMessage { timestamp, text: text.to_owned(), edited: false });
        self.last_message = excerpt(text, self.excerpt_len);
    }

    /// Edit the newest rendered message. No-op when nothing is rendered.
    pub fn edit_newest(&mut self, text: &str) {
        if let Some(mut newest) = self.stored.last_entry() {
            let message = newest.get_mut();
            message.text = text.to_owned();
            message.edited = true;
            self.last_message = excerpt(text, self.excerpt_len);
        }
    }

    /// Delete the newest rendered message.
    pub fn delete_newest(&mut self) {
        if self.stored.pop_last().is_some() {
            self.roll_back_last_message();
        }
    }

    /// Delete the oldest rendered message.
    pub fn delete_oldest(&mut self) {
        let Some(oldest) = self.view().next().map(|m| m.timestamp) else {
            return;
        };
        let was_newest = self.stored.last_key_value().is_some_and(|(ts, _)| *ts == oldest);
        self.stored.remove(&oldest);
        if was_newest {
            self.roll_back_last_message();
        }
    }

    /// The user scrolled to the oldest rendered message.
    ///
    /// A full window grows by one page.
    pub fn scroll_to_top(&mut self) {
        if self.window > 0 && self.view().count() == self.window {
            self.window += self.page_size;
        }
    }

    /// Rendered messages, oldest first.
    pub fn view(&self) -> impl Iterator<Item = &ModelMessage> + '_ {
        let skip = self.stored.len().saturating_sub(self.window);
        self.stored.values().skip(skip)
    }

    /// Observable state.
    pub fn observe(&self) -> ObservableState {
        ObservableState {
            messages: self.view().cloned().collect(),
            window: self.window,
            last_message: self.last_message.clone(),
        }
    }

    fn roll_back_last_message(&mut self) {
        self.last_message = self
            .stored
            .last_key_value()
            .map(|(_, m)| excerpt(&m.text, self.excerpt_len))
            .unwrap_or_default();
    }
}
