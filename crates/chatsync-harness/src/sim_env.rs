//! Deterministic environment for simulation.
//!
//! A seeded ChaCha RNG and a virtual clock. The clock ticks one millisecond
//! per reading, so consecutive messages never share a timestamp, and
//! [`SimEnv::advance`] jumps it forward explicitly.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicI64, Ordering},
};

use chatsync_core::env::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Virtual clock origin: 2024-01-01T00:00:00Z.
pub const EPOCH_MILLIS: i64 = 1_704_067_200_000;

/// Seeded, virtual-time [`Environment`].
///
/// Clones share the clock and the RNG stream.
#[derive(Clone)]
pub struct SimEnv {
    clock: Arc<AtomicI64>,
    rng: Arc<Mutex<ChaCha8Rng>>,
}

impl SimEnv {
    /// Environment seeded with 0.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Environment seeded with `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            clock: Arc::new(AtomicI64::new(EPOCH_MILLIS)),
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
        }
    }

    /// Move the clock forward by `millis`.
    pub fn advance(&self, millis: i64) {
        self.clock.fetch_add(millis, Ordering::SeqCst);
    }

    /// Current clock reading, without ticking.
    pub fn peek_millis(&self) -> i64 {
        self.clock.load(Ordering::SeqCst)
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimEnv {
    fn now_millis(&self) -> i64 {
        self.clock.fetch_add(1, Ordering::SeqCst)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().expect("Mutex poisoned").fill_bytes(buffer);
    }
}
