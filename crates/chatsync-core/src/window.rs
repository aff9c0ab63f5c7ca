//! Pagination window tracking.
//!
//! A paginated stream subscribes to a bounded window of items. The tracker is
//! a pure state machine: the caller reports lifecycle and scroll events, and
//! gets back a [`WindowDecision`] saying whether to (re)attach and at what
//! window size. It never touches the store itself.
//!
//! ```text
//!   Idle ──start──► Loading ──loaded──► Loaded
//!    ▲                 ▲                  │
//!    │                 └──scroll at edge──┤ (window + page)
//!    │                 └──resume──────────┤ (same window)
//!    └────────────────stop────────────────┘
//! ```
//!
//! The window only grows on a genuine forward scroll. Resuming from the
//! background re-requests the window the user already had.

/// Window size of the first page.
pub const FIRST_PAGE_SIZE: usize = 10;

/// Window growth per page.
pub const PAGE_SIZE: usize = 10;

/// Lifecycle phase of a tracked stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowPhase {
    /// No subscription. Initial phase.
    #[default]
    Idle,
    /// Subscription requested; no notification seen yet.
    Loading,
    /// At least one notification arrived for the current window.
    Loaded,
}

/// Window bookkeeping of one paginated stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowState {
    /// Number of items currently subscribed to. 0 before the first load.
    pub window_size: usize,
    /// Last index the caller reported near the edge.
    pub last_known_first_visible_index: Option<usize>,
}

/// What the caller must do after a tracker transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowDecision {
    /// Attach a subscription bounded to `window` items.
    Attach {
        /// Target window size.
        window: usize,
        /// Detach the current subscription first.
        teardown: bool,
    },
    /// Leave the current subscription alone.
    Keep,
}

/// Decides the window size of one paginated stream.
#[derive(Debug, Clone)]
pub struct BatchWindowTracker {
    phase: WindowPhase,
    state: WindowState,
    first_page_size: usize,
    page_size: usize,
}

impl Default for BatchWindowTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchWindowTracker {
    /// Tracker with the default page sizes.
    pub fn new() -> Self {
        Self::with_page_sizes(FIRST_PAGE_SIZE, PAGE_SIZE)
    }

    /// Tracker with custom page sizes.
    pub fn with_page_sizes(first_page_size: usize, page_size: usize) -> Self {
        Self { phase: WindowPhase::Idle, state: WindowState::default(), first_page_size, page_size }
    }

    /// Current phase.
    pub fn phase(&self) -> WindowPhase {
        self.phase
    }

    /// Current window bookkeeping.
    pub fn state(&self) -> WindowState {
        self.state
    }

    /// Current window size.
    pub fn window_size(&self) -> usize {
        self.state.window_size
    }

    /// Session start.
    ///
    /// Requests the first page when no window is retained, otherwise the
    /// retained window unchanged. Ignored unless idle.
    pub fn on_initial_start(&mut self) -> WindowDecision {
        if self.phase != WindowPhase::Idle {
            return WindowDecision::Keep;
        }

        if self.state.window_size == 0 {
            self.state.window_size = self.first_page_size;
        }
        self.phase = WindowPhase::Loading;

        tracing::debug!(window = self.state.window_size, "initial window");
        WindowDecision::Attach { window: self.state.window_size, teardown: false }
    }

    /// The caller scrolled; `last_visible_index` is the furthest item it shows.
    ///
    /// Grows by one page when the caller is within one item of the fetched
    /// edge. Nothing rendered yet on an empty window is the initial load. A
    /// stream still loading never grows.
    pub fn on_scroll_near_edge(&mut self, last_visible_index: Option<usize>) -> WindowDecision {
        let Some(index) = last_visible_index else {
            if self.state.window_size == 0 {
                return self.on_initial_start();
            }
            return WindowDecision::Keep;
        };

        if self.phase != WindowPhase::Loaded {
            return WindowDecision::Keep;
        }

        self.state.last_known_first_visible_index = Some(index);
        if index + 1 < self.state.window_size {
            return WindowDecision::Keep;
        }

        self.state.window_size += self.page_size;
        self.phase = WindowPhase::Loading;

        tracing::debug!(index, window = self.state.window_size, "window grown");
        WindowDecision::Attach { window: self.state.window_size, teardown: true }
    }

    /// App returned to the foreground. Re-subscribes at the same window.
    pub fn on_resume_from_background(&mut self) -> WindowDecision {
        if self.state.window_size == 0 {
            return self.on_initial_start();
        }

        self.phase = WindowPhase::Loading;
        tracing::debug!(window = self.state.window_size, "window resumed");
        WindowDecision::Attach { window: self.state.window_size, teardown: true }
    }

    /// First notification for the current window arrived.
    pub fn on_loaded(&mut self) {
        if self.phase == WindowPhase::Loading {
            self.phase = WindowPhase::Loaded;
        }
    }

    /// Subscription torn down. `retain_window` keeps the window for the next
    /// start; otherwise it resets to 0.
    pub fn on_stop(&mut self, retain_window: bool) {
        self.phase = WindowPhase::Idle;
        if !retain_window {
            self.state = WindowState::default();
        }
    }
}
