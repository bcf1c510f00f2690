use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use futures_channel::oneshot;
use tracing::trace;

use crate::pool::config::Config;
use crate::pool::conn::ConnectionBuilder;
use crate::pool::error::PoolError;
use crate::pool::key::RequestKey;
use crate::pool::lease::Lease;

pub(crate) type Completion<K, B> = oneshot::Sender<Result<Lease<K, B>, PoolError<K>>>;

/// A queued request for a connection that could not be served immediately.
///
/// `enqueued_at` is a monotonic instant from the pool's injected `Clock`.
/// spec.md describes waiter aging as wall-clock; this crate takes the
/// simplification spec.md itself offers (see DESIGN.md open question 2)
/// and ages waiters against the same monotonic clock used for idle
/// deadlines.
pub(crate) struct Waiter<K: RequestKey, B: ConnectionBuilder<K>> {
    pub(crate) key: K,
    pub(crate) completion: Completion<K, B>,
    pub(crate) enqueued_at: Instant,
    /// Identifies this entry to the caller's [`crate::pool::WaiterRegistration`]
    /// so a dropped/abandoned `borrow()` can remove exactly this waiter
    /// without disturbing others queued for the same key.
    pub(crate) token: u64,
}

pub(crate) fn is_expired<K: RequestKey, B: ConnectionBuilder<K>>(
    waiter: &Waiter<K, B>,
    now: Instant,
    config: &Config<K>,
) -> bool {
    match config.waiter_timeout() {
        Some(timeout) => now.saturating_duration_since(waiter.enqueued_at) > timeout,
        None => false,
    }
}

/// Fails and removes every waiter at the front of the queue that has aged
/// past its timeout. Because waiters are enqueued in order, the expired set
/// is always exactly a prefix.
pub(crate) fn sweep_expired<K: RequestKey, B: ConnectionBuilder<K>>(
    wait: &mut VecDeque<Waiter<K, B>>,
    now: Instant,
    config: &Config<K>,
) {
    while let Some(front) = wait.front() {
        if is_expired(front, now, config) {
            let waiter = wait.pop_front().expect("front just checked");
            trace!(key = ?waiter.key, "expiring waiter");
            let _ = waiter.completion.send(Err(PoolError::WaitQueueTimeout));
        } else {
            break;
        }
    }
}

/// Sweeps the expired prefix, then returns the first waiter (in order)
/// whose per-key count has room, removing it from the queue. Waiters
/// blocked solely by their own per-key ceiling are left in place.
pub(crate) fn find_first_admissible<K: RequestKey, B: ConnectionBuilder<K>>(
    wait: &mut VecDeque<Waiter<K, B>>,
    allocated: &HashMap<K, usize>,
    now: Instant,
    config: &Config<K>,
) -> Option<Waiter<K, B>> {
    sweep_expired(wait, now, config);

    let idx = wait.iter().position(|w| {
        let current = allocated.get(&w.key).copied().unwrap_or(0);
        current < config.max_per_key(&w.key)
    })?;

    wait.remove(idx)
}

/// Removes and fails every remaining waiter, used by `shutdown`.
pub(crate) fn fail_all<K: RequestKey, B: ConnectionBuilder<K>>(wait: &mut VecDeque<Waiter<K, B>>) {
    for waiter in wait.drain(..) {
        let _ = waiter.completion.send(Err(PoolError::PoolClosed));
    }
}
