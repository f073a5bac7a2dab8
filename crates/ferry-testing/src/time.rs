//! Deterministic time control for tests.

use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use ferry_core::Clock;

/// Test clock with manually driven virtual time.
///
/// `sleep` advances the clock by the requested duration and yields, so a
/// loop that probes every second against a multi-second deadline completes
/// in microseconds of wall time while observing the same elapsed-time
/// arithmetic as production.
#[derive(Debug, Clone)]
pub struct TestClock {
    /// Monotonic time in nanoseconds since clock creation.
    monotonic_ns: Arc<AtomicU64>,
    /// System time as milliseconds since UNIX_EPOCH.
    system_ms: Arc<AtomicU64>,
    /// Base instant for monotonic calculations.
    base_instant: Instant,
}

impl TestClock {
    /// Creates a test clock starting at the current time.
    pub fn new() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();

        Self {
            monotonic_ns: Arc::new(AtomicU64::new(0)),
            system_ms: Arc::new(AtomicU64::new(since_epoch.as_millis() as u64)),
            base_instant: Instant::now(),
        }
    }

    /// Advances both clocks by the specified duration.
    pub fn advance(&self, duration: Duration) {
        self.monotonic_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::AcqRel);
        self.system_ms
            .fetch_add(duration.as_millis() as u64, Ordering::AcqRel);
    }

    /// Returns virtual time elapsed since clock creation.
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.monotonic_ns.load(Ordering::Acquire))
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        let elapsed_ns = self.monotonic_ns.load(Ordering::Acquire);
        self.base_instant + Duration::from_nanos(elapsed_ns)
    }

    fn now_system(&self) -> SystemTime {
        let ms = self.system_ms.load(Ordering::Acquire);
        UNIX_EPOCH + Duration::from_millis(ms)
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.advance(duration);
            // Let other tasks run, as a real sleep would.
            tokio::task::yield_now().await;
        })
    }
}
