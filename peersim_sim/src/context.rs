//! Simulation context implementing NodeContext on a virtual clock.

use async_trait::async_trait;
use peersim_env::NodeContext;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Simulation context backed by deterministic time and RNG.
///
/// - Virtual time only moves when someone sleeps or calls `advance_time`
/// - `sleep` advances the clock and yields, so other tasks get to run
/// - A seeded ChaCha8 RNG backs `random_u64`, so two contexts with the
///   same seed hand the core the same draws
pub struct SimContext {
    /// Current virtual time (nanoseconds since simulation start)
    virtual_time_ns: Arc<Mutex<u64>>,

    /// Total virtual time spent in `sleep`
    slept_ns: Arc<Mutex<u64>>,

    rng: Arc<Mutex<ChaCha8Rng>>,
}

impl SimContext {
    /// Creates a new SimContext with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            virtual_time_ns: Arc::new(Mutex::new(0)),
            slept_ns: Arc::new(Mutex::new(0)),
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
        }
    }

    /// Creates an Arc-wrapped context for sharing.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    /// Advances virtual time by the given duration.
    pub fn advance_time(&self, duration: Duration) {
        let mut time = self.virtual_time_ns.lock().unwrap_or_else(PoisonError::into_inner);
        *time += duration.as_nanos() as u64;
    }

    /// Returns the current virtual time in nanoseconds.
    pub fn time_ns(&self) -> u64 {
        *self.virtual_time_ns.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Virtual time spent sleeping so far.
    pub fn slept(&self) -> Duration {
        Duration::from_nanos(*self.slept_ns.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Clone for SimContext {
    fn clone(&self) -> Self {
        Self {
            virtual_time_ns: Arc::clone(&self.virtual_time_ns),
            slept_ns: Arc::clone(&self.slept_ns),
            rng: Arc::clone(&self.rng),
        }
    }
}

#[async_trait]
impl NodeContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }

    async fn sleep(&self, duration: Duration) {
        self.advance_time(duration);
        *self.slept_ns.lock().unwrap_or_else(PoisonError::into_inner) += duration.as_nanos() as u64;
        tokio::task::yield_now().await;
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tracing::debug!(task = name, "Spawning simulated task");
        tokio::spawn(future);
    }

    fn random_u64(&self) -> u64 {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).gen()
    }
}
