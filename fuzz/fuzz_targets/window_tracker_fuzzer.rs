//! Fuzz target for the pagination window tracker
//!
//! Ensure the window only ever moves by whole pages (HIGH priority)
//!
//! # Strategy
//!
//! - Page sizes: arbitrary, clamped to at least one item
//! - Events: start, scroll (with and without a visible index), loaded,
//!   resume and stop in any order
//!
//! # Invariants
//!
//! - Window is 0 or first page plus a whole number of pages
//! - Every attach decision carries the tracker's new window
//! - Window grows only from the loaded phase, by exactly one page
//! - Stop without retaining resets to an empty window

#![no_main]

use arbitrary::Arbitrary;
use chatsync_core::{BatchWindowTracker, WindowDecision, WindowPhase};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
struct Scenario {
    first_page_size: u8,
    page_size: u8,
    events: Vec<WindowEvent>,
}

#[derive(Debug, Clone, Arbitrary)]
enum WindowEvent {
    Start,
    Scroll(Option<u8>),
    Loaded,
    Resume,
    Stop { retain: bool },
}

fuzz_target!(|scenario: Scenario| {
    let first = usize::from(scenario.first_page_size.max(1));
    let page = usize::from(scenario.page_size.max(1));
    let mut tracker = BatchWindowTracker::with_page_sizes(first, page);

    for event in scenario.events {
        let before_phase = tracker.phase();
        let before = tracker.window_size();

        let decision = match event {
            WindowEvent::Start => Some(tracker.on_initial_start()),
            WindowEvent::Scroll(index) => {
                Some(tracker.on_scroll_near_edge(index.map(usize::from)))
            },
            WindowEvent::Resume => Some(tracker.on_resume_from_background()),
            WindowEvent::Loaded => {
                tracker.on_loaded();
                None
            },
            WindowEvent::Stop { retain } => {
                tracker.on_stop(retain);
                assert_eq!(tracker.phase(), WindowPhase::Idle);
                if !retain {
                    assert_eq!(tracker.window_size(), 0, "stop without retain must reset");
                }
                None
            },
        };

        let after = tracker.window_size();
        assert!(
            after == 0 || (after >= first && (after - first) % page == 0),
            "window {after} is not whole pages of {first}+{page}"
        );

        if let Some(WindowDecision::Attach { window, .. }) = decision {
            assert_eq!(window, after, "attach must carry the tracker window");
            assert_eq!(tracker.phase(), WindowPhase::Loading);
        }

        if after > before && before > 0 {
            assert_eq!(before_phase, WindowPhase::Loaded, "grew while not loaded");
            assert_eq!(after, before + page, "grew by more than one page");
        }
    }
});
