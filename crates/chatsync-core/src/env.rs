//! Environment abstraction for deterministic testing.
//!
//! Decouples chat logic from system resources (wall clock, randomness).
//! Production uses [`SystemEnv`]; simulations plug in a seeded RNG and a
//! virtual clock so runs replay exactly.

use std::time::{SystemTime, UNIX_EPOCH};

/// Time and randomness used by one-shot operations.
///
/// # Invariants
///
/// - `now_millis()` never goes backwards within one execution
/// - Given the same seed, a simulated environment yields the same bytes
pub trait Environment: Clone + Send + Sync + 'static {
    /// Wall-clock time in milliseconds since the Unix epoch.
    ///
    /// Message and chat timestamps are taken from here.
    fn now_millis(&self) -> i64;

    /// Fill `buffer` with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generate a random `u128`.
    fn random_u128(&self) -> u128 {
        let mut bytes = [0u8; 16];
        self.random_bytes(&mut bytes);
        u128::from_be_bytes(bytes)
    }

    /// Generate a fresh store key (32 lowercase hex digits).
    fn new_id(&self) -> String {
        format!("{:032x}", self.random_u128())
    }
}

/// Production environment backed by the OS clock and entropy source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a system environment.
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        // OS entropy failure is unrecoverable
        getrandom::fill(buffer).expect("OS entropy source failed");
    }
}
