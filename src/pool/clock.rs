use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A pluggable source of monotonic "now", so idle expiry and waiter aging
/// can be exercised deterministically in tests without real sleeps.
///
/// Grounded on the teacher's injected `timer: Option<Timer>` capability
/// (`hyper_util::client::legacy::pool`): there, a swappable timer lets the
/// idle-reaping interval be driven by a fake clock in tests; here the same
/// seam is narrowed to a synchronous `now()` query, since the pool lock
/// never awaits a real sleep.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// The default `Clock`, backed by `std::time::Instant::now`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A manually-advanced clock for tests that exercise idle expiry and waiter
/// aging without sleeping.
#[derive(Debug)]
pub struct TestClock {
    now: Mutex<Instant>,
}

impl TestClock {
    pub fn new() -> Self {
        TestClock {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }
}
