//! Fuzz target for a full chat session against the reference model
//!
//! Ensure the rendered message window never diverges from the model
//! (HIGH priority integration test)
//!
//! # Strategy
//!
//! - Page sizes: small, so windows grow and shift often
//! - Operations: sends from both participants, edits, deletes at both ends,
//!   scrolls, resumes, restarts and clock jumps in any order
//!
//! # Invariants
//!
//! - Rendered messages, window and last message match the model
//! - Messages ascend by (timestamp, id)
//! - Every live store subscription belongs to exactly one key
//! - Windows are whole pages

#![no_main]

use arbitrary::Arbitrary;
use chatsync_app::CoordinatorConfig;
use chatsync_harness::{Operation, SessionDriver};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
struct Session {
    seed: u64,
    first_page_size: u8,
    page_size: u8,
    operations: Vec<Operation>,
}

fuzz_target!(|session: Session| {
    let config = CoordinatorConfig {
        first_page_size: usize::from(session.first_page_size % 4) + 2,
        page_size: usize::from(session.page_size % 3) + 2,
        ..CoordinatorConfig::default()
    };

    let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
    runtime.block_on(async {
        let mut driver = SessionDriver::start(session.seed, config).await.unwrap();

        for (step, op) in session.operations.iter().enumerate() {
            driver.apply(op).await.unwrap();

            if let Err(violations) = driver.check_invariants() {
                panic!("step {step} {op:?}: {violations:?}");
            }
            assert_eq!(driver.observe(), driver.model().observe(), "step {step} {op:?}");
        }
    });
});
