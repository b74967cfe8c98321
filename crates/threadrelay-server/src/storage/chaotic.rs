//! Chaotic storage wrapper for fault injection testing
//!
//! Delegates to an underlying storage implementation but randomly fails
//! operations. Used to verify that the ingestion bridge never publishes a
//! message that was not persisted, and that join authorization degrades to a
//! protocol error instead of tearing the connection down.

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::sync::{Arc, Mutex};

use threadrelay_proto::{MessageRecord, ThreadId, UserId};

use super::{Storage, StorageError, StoredThread};

/// Chaotic storage wrapper that randomly injects failures
///
/// Uses Arc<Mutex<>> for the RNG state, making it Clone and thread-safe.
#[derive(Clone)]
pub struct ChaoticStorage<S: Storage> {
    inner: S,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    /// Only inject failures into mutating operations
    writes_only: bool,
    /// RNG state for deterministic chaos
    rng: Arc<Mutex<ChaoticRng>>,
    /// Number of injected failures so far
    failure_count: Arc<Mutex<usize>>,
}

/// Simple deterministic RNG for chaos injection
///
/// Linear congruential generator, so chaos tests are reproducible with the
/// same seed.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Generate next random value [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // LCG constants from Numerical Recipes
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }

    fn should_fail(&mut self, failure_rate: f64) -> bool {
        self.next() < failure_rate
    }
}

impl<S: Storage> ChaoticStorage<S> {
    /// Create a new chaotic storage wrapper
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Create with explicit seed for reproducible chaos
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            writes_only: false,
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            failure_count: Arc::new(Mutex::new(0)),
        }
    }

    /// Restrict failure injection to writes; lookups always succeed.
    #[must_use]
    pub fn writes_only(mut self) -> Self {
        self.writes_only = true;
        self
    }

    /// Underlying storage (for checking invariants after chaos).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of failures injected so far.
    pub fn failure_count(&self) -> usize {
        #[allow(clippy::expect_used)]
        *self.failure_count.lock().expect("failure_count mutex poisoned")
    }

    fn inject(&self, is_write: bool) -> Result<(), StorageError> {
        if self.writes_only && !is_write {
            return Ok(());
        }

        #[allow(clippy::expect_used)]
        let fail =
            self.rng.lock().expect("ChaoticRng mutex poisoned").should_fail(self.failure_rate);
        if fail {
            #[allow(clippy::expect_used)]
            let mut count = self.failure_count.lock().expect("failure_count mutex poisoned");
            *count += 1;
            return Err(StorageError::Io("chaotic failure injection".to_string()));
        }
        Ok(())
    }
}

impl<S: Storage> Storage for ChaoticStorage<S> {
    fn find_session(&self, token: &str) -> Result<Option<UserId>, StorageError> {
        self.inject(false)?;
        self.inner.find_session(token)
    }

    fn create_session(&self, token: &str, user_id: &UserId) -> Result<(), StorageError> {
        self.inject(true)?;
        self.inner.create_session(token, user_id)
    }

    fn find_thread(&self, thread_id: &ThreadId) -> Result<Option<StoredThread>, StorageError> {
        self.inject(false)?;
        self.inner.find_thread(thread_id)
    }

    fn create_thread(&self, thread: &StoredThread) -> Result<(), StorageError> {
        self.inject(true)?;
        self.inner.create_thread(thread)
    }

    fn list_threads(&self, user_id: &UserId) -> Result<Vec<StoredThread>, StorageError> {
        self.inject(false)?;
        self.inner.list_threads(user_id)
    }

    fn store_message(&self, message: &MessageRecord) -> Result<(), StorageError> {
        self.inject(true)?;
        self.inner.store_message(message)
    }

    fn load_messages(&self, thread_id: &ThreadId) -> Result<Vec<MessageRecord>, StorageError> {
        self.inject(false)?;
        self.inner.load_messages(thread_id)
    }
}
