use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Picks a uniformly random index in `0..len` to select a victim key for
/// random eviction (see [`crate::pool::Pool::borrow`]).
///
/// Grounded on `saworbit-orbit`'s dependency on `rand = "0.9"` — the
/// teacher crate never evicts to make room, so this seam has no analogue
/// there; it mirrors the way the teacher injects `Timer`/`Executor` as
/// swappable capabilities instead of calling a runtime API directly.
pub trait VictimPicker: Send + Sync + 'static {
    /// `len` is always `> 0`; implementations may assume that.
    fn pick_index(&self, len: usize) -> usize;
}

/// The default picker: draws from the thread-local RNG on every call.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadRngPicker;

impl VictimPicker for ThreadRngPicker {
    fn pick_index(&self, len: usize) -> usize {
        rand::rng().random_range(0..len)
    }
}

/// A deterministic picker for tests, seeded once and advanced on each call.
pub struct SeededPicker {
    rng: Mutex<StdRng>,
}

impl SeededPicker {
    pub fn new(seed: u64) -> Self {
        SeededPicker {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl VictimPicker for SeededPicker {
    fn pick_index(&self, len: usize) -> usize {
        self.rng.lock().unwrap().random_range(0..len)
    }
}
