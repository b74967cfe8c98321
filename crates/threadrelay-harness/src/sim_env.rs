//! Simulated environment.
//!
//! Seeded ChaCha RNG and a virtual clock that only moves when told to. Two
//! `SimEnv`s built from the same seed produce identical message ids and
//! timestamps.

#![allow(clippy::disallowed_types, reason = "Synchronous RNG and clock state")]

use std::{
    ops::Sub,
    sync::{Arc, Mutex},
    time::Duration,
};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use threadrelay_server::Environment;

/// Wall-clock origin for simulated timestamps (2024-01-01T00:00:00Z).
const SIM_EPOCH_MILLIS: u64 = 1_704_067_200_000;

/// Virtual instant: time elapsed since the environment was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SimInstant(Duration);

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

/// Deterministic environment for simulation and tests.
#[derive(Clone)]
pub struct SimEnv {
    rng: Arc<Mutex<ChaCha8Rng>>,
    elapsed: Arc<Mutex<Duration>>,
}

impl SimEnv {
    /// Create an environment with a fixed seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Move the virtual clock forward.
    #[allow(clippy::expect_used)]
    pub fn advance(&self, duration: Duration) {
        let mut elapsed = self.elapsed.lock().expect("SimEnv clock poisoned");
        *elapsed += duration;
    }

    /// Time elapsed on the virtual clock.
    #[allow(clippy::expect_used)]
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().expect("SimEnv clock poisoned")
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        SimInstant(self.elapsed())
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        self.advance(duration);
        tokio::task::yield_now()
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().expect("SimEnv rng poisoned").fill_bytes(buffer);
    }

    fn wall_clock_millis(&self) -> u64 {
        SIM_EPOCH_MILLIS + self.elapsed().as_millis() as u64
    }
}
