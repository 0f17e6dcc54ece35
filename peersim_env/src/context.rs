//! Core environment context trait for simulation nodes.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// The node's view of time and task execution.
///
/// Every timestamp the core records (connection open/close) and every
/// sleep it performs (action interval, bootstrap backoff) goes through
/// this trait, so a run can be replayed on a virtual clock.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`
/// - **Simulation**: `SimContext` - virtual clock, seeded RNG
#[async_trait]
pub trait NodeContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// Connection durations are differences of two `now()` values.
    fn now(&self) -> Duration;

    /// Suspends the calling task for the given duration.
    ///
    /// Only the caller blocks; the substrate's listeners keep running.
    async fn sleep(&self, duration: Duration);

    /// Spawns a background task.
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;

    /// Draws a random `u64`.
    ///
    /// Every random choice the core makes (peer picks, payloads, backoff
    /// jitter) starts from this, so a seeded context replays the same run.
    fn random_u64(&self) -> u64;
}
