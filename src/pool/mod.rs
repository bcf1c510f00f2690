//! The connection pool core.
//!
//! Grounded on `hyper_util::client::legacy::pool` (see `TEACHER.txt` and
//! `DESIGN.md`): an `Arc<Mutex<PoolInner>>` guards the accounting record, a
//! `oneshot` channel per waiter lets the pool hand a connection straight to
//! a blocked borrower, and a background interval task reaps entries that
//! have gone stale. This module generalizes that shape with a global
//! ceiling, a bounded wait queue, waiter aging, and random eviction, none of
//! which the teacher's pool needs (it has no cross-host capacity to defend).

pub mod clock;
pub mod config;
pub mod conn;
pub mod error;
pub mod exec;
pub mod key;
mod lease;
#[cfg(test)]
mod proptests;
pub mod rng;
#[cfg(test)]
mod test_support;
mod waiter;

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures_channel::oneshot;
use tracing::{debug, trace};

pub use clock::{Clock, SystemClock, TestClock};
pub use config::{Config, ConfigBuilder};
pub use conn::{BoxFuture, Connection, ConnectionBuilder};
pub use error::PoolError;
pub use exec::{Executor, TokioExecutor};
pub use key::RequestKey;
pub use lease::Lease;
pub use rng::{SeededPicker, ThreadRngPicker, VictimPicker};

use waiter::Waiter;

/// An idle entry waiting to be recycled, with the deadline computed at the
/// moment it was parked (spec.md §3 PooledConnection).
struct PooledEntry<C> {
    conn: C,
    borrow_deadline: Option<Instant>,
}

/// The protected mutable record (spec.md §3 PoolState). Every field here is
/// only ever touched while holding `PoolShared::inner`'s mutex.
struct PoolInner<K: RequestKey, B: ConnectionBuilder<K>> {
    closed: bool,
    total: usize,
    allocated: HashMap<K, usize>,
    idle: HashMap<K, VecDeque<PooledEntry<B::Connection>>>,
    wait: VecDeque<Waiter<K, B>>,
    idle_sweeper_ref: Option<oneshot::Sender<std::convert::Infallible>>,
}

impl<K: RequestKey, B: ConnectionBuilder<K>> PoolInner<K, B> {
    fn new() -> Self {
        PoolInner {
            closed: false,
            total: 0,
            allocated: HashMap::new(),
            idle: HashMap::new(),
            wait: VecDeque::new(),
            idle_sweeper_ref: None,
        }
    }
}

/// The pool's shared, reference-counted state: the lock-guarded record plus
/// the injected capabilities (builder, clock, RNG, executor) and immutable
/// configuration.
pub struct PoolShared<K: RequestKey, B: ConnectionBuilder<K>> {
    inner: Mutex<PoolInner<K, B>>,
    builder: B,
    clock: Arc<dyn Clock + Send + Sync>,
    victim_picker: Arc<dyn VictimPicker + Send + Sync>,
    executor: Arc<dyn Executor + Send + Sync>,
    config: Config<K>,
    next_waiter_token: AtomicU64,
}

/// A capacity-bounded, async connection pool keyed by destination endpoint.
///
/// Cloning a `Pool` is cheap (an `Arc` bump) and yields a handle to the same
/// underlying state, mirroring the teacher's `Pool<T, K>: Clone`.
pub struct Pool<K: RequestKey, B: ConnectionBuilder<K>> {
    shared: Arc<PoolShared<K, B>>,
}

impl<K: RequestKey, B: ConnectionBuilder<K>> Clone for Pool<K, B> {
    fn clone(&self) -> Self {
        Pool {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K: RequestKey, B: ConnectionBuilder<K>> Pool<K, B> {
    /// Builds a pool with the default `SystemClock`, thread-RNG victim
    /// picker, and Tokio executor.
    pub fn new(builder: B, config: Config<K>) -> Self {
        Self::with_parts(
            builder,
            config,
            Arc::new(SystemClock),
            Arc::new(ThreadRngPicker),
            Arc::new(TokioExecutor),
        )
    }

    /// Builds a pool with explicit capability implementations, for tests
    /// that need a controllable clock and/or deterministic victim picker.
    pub fn with_parts(
        builder: B,
        config: Config<K>,
        clock: Arc<dyn Clock + Send + Sync>,
        victim_picker: Arc<dyn VictimPicker + Send + Sync>,
        executor: Arc<dyn Executor + Send + Sync>,
    ) -> Self {
        let shared = Arc::new(PoolShared {
            inner: Mutex::new(PoolInner::new()),
            builder,
            clock,
            victim_picker,
            executor,
            config,
            next_waiter_token: AtomicU64::new(0),
        });
        let pool = Pool { shared };
        pool.spawn_idle_sweeper();
        pool
    }

    fn spawn_idle_sweeper(&self) {
        let interval = match sweep_interval(&self.shared.config) {
            Some(d) => d,
            None => return,
        };
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.shared.lock();
            inner.idle_sweeper_ref = Some(tx);
        }
        let sweeper = IdleSweeper {
            shared: Arc::downgrade(&self.shared),
            interval,
            drop_notifier: rx,
        };
        self.shared.executor.spawn(Box::pin(sweeper.run()));
    }

    /// Acquires a connection for `key`, building one if none is idle and
    /// capacity allows, waiting if capacity is currently exhausted, or
    /// failing per spec.md §4.1 / §7.
    pub async fn borrow(&self, key: K) -> Result<Lease<K, B>, PoolError<K>> {
        match self.shared.try_borrow(&key) {
            BorrowOutcome::Deliver(lease) => Ok(lease),
            BorrowOutcome::Fail(err) => Err(err),
            BorrowOutcome::Build => match self.shared.builder.build(key.clone()).await {
                Ok(conn) => Ok(self.shared.make_lease(key, conn, true)),
                Err(err) => {
                    self.shared.dispose(&key);
                    Err(PoolError::BuildFailed(Box::new(err)))
                }
            },
            BorrowOutcome::Wait(registration) => match registration.await {
                Ok(result) => result,
                Err(_canceled) => Err(PoolError::PoolClosed),
            },
        }
    }

    /// Returns a borrowed connection to the pool. Equivalent to simply
    /// dropping the [`Lease`]; exposed as a named operation for parity with
    /// the pool's documented surface.
    pub fn release(&self, lease: Lease<K, B>) {
        drop(lease);
    }

    /// Tells the pool a borrowed connection is unusable right now, even if
    /// it is still nominally "in use". Unlike a recyclable release, this
    /// always decrements accounting and tears the connection down; like a
    /// non-recyclable release, it then tries to satisfy the first
    /// admissible waiter with a freshly built connection.
    pub fn invalidate(&self, mut lease: Lease<K, B>) {
        if let Some(conn) = lease.take() {
            self.shared.invalidate(lease.request_key().clone(), conn);
        }
    }

    /// Terminal: marks the pool closed, tears down every idle connection,
    /// fails every queued waiter with [`PoolError::PoolClosed`], and clears
    /// all accounting. Every subsequent `borrow` fails with `PoolClosed`.
    pub fn shutdown(&self) {
        self.shared.shutdown();
    }

    /// A point-in-time snapshot of pool occupancy (spec.md §4.6). Values
    /// may be stale by the time the caller reads them; no lock is held
    /// after this call returns.
    pub fn state(&self) -> PoolStats<K> {
        self.shared.state()
    }
}

/// A snapshot of pool occupancy, returned by [`Pool::state`].
#[derive(Debug, Clone)]
pub struct PoolStats<K: RequestKey> {
    pub closed: bool,
    pub total: usize,
    pub allocated: HashMap<K, usize>,
    pub idle_depths: HashMap<K, usize>,
    pub wait_len: usize,
}

/// What `try_borrow` decided to do, so the async caller can step outside
/// the lock before awaiting a build or a waiter handoff.
enum BorrowOutcome<K: RequestKey, B: ConnectionBuilder<K>> {
    Deliver(Lease<K, B>),
    /// Accounting has already been reserved; the caller must run the
    /// builder and, on failure, call `dispose`.
    Build,
    Wait(WaiterRegistration<K, B>),
    Fail(PoolError<K>),
}

/// A still-queued waiter's side of the handoff, wrapping the raw
/// [`oneshot::Receiver`] with a token identifying its [`Waiter`] entry.
///
/// Grounded on the teacher's `Checkout: Drop` (`pool.rs` lines ~470-473,
/// 716-724), whose `Drop` impl calls `inner.clean_waiters(&self.key)` to
/// purge the abandoned sender the moment a caller drops an in-flight
/// checkout future, so a canceled borrow never occupies a wait-queue slot
/// indefinitely. This crate's equivalent removes the exact `Waiter` entry
/// by token (rather than sweeping every canceled sender for the key, since
/// `oneshot::Sender::is_canceled` has no analogue here — the pool never
/// polls a waiter's sender to check liveness) when the registration itself
/// is dropped, whether that is because the caller is still waiting and
/// abandons the future, or simply because `borrow` awaited it to
/// completion and is dropping it on the way out.
struct WaiterRegistration<K: RequestKey, B: ConnectionBuilder<K>> {
    rx: oneshot::Receiver<Result<Lease<K, B>, PoolError<K>>>,
    token: u64,
    shared: Weak<PoolShared<K, B>>,
}

impl<K: RequestKey, B: ConnectionBuilder<K>> Future for WaiterRegistration<K, B> {
    type Output = Result<Result<Lease<K, B>, PoolError<K>>, oneshot::Canceled>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx).poll(cx)
    }
}

impl<K: RequestKey, B: ConnectionBuilder<K>> Drop for WaiterRegistration<K, B> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.remove_waiter(self.token);
        }
    }
}

impl<K: RequestKey, B: ConnectionBuilder<K>> PoolShared<K, B> {
    fn lock(&self) -> MutexGuard<'_, PoolInner<K, B>> {
        self.inner.lock().expect("pool mutex poisoned")
    }

    fn decrement_locked(inner: &mut PoolInner<K, B>, key: &K) {
        inner.total -= 1;
        if let Some(count) = inner.allocated.get_mut(key) {
            *count -= 1;
            if *count == 0 {
                inner.allocated.remove(key);
            }
        }
    }

    fn increment_locked(inner: &mut PoolInner<K, B>, key: &K) {
        inner.total += 1;
        *inner.allocated.entry(key.clone()).or_insert(0) += 1;
    }

    fn make_lease(self: &Arc<Self>, key: K, conn: B::Connection, fresh: bool) -> Lease<K, B> {
        Lease {
            conn: Some(conn),
            key,
            fresh,
            shared: Arc::downgrade(self),
        }
    }

    /// spec.md §4.1. Runs the whole borrow algorithm, including any number
    /// of random-victim-eviction retries, under one lock acquisition: none
    /// of it awaits, so there is no reason to release and re-acquire.
    fn try_borrow(self: &Arc<Self>, key: &K) -> BorrowOutcome<K, B> {
        let now = self.clock.now();
        let mut inner = self.lock();

        if inner.closed {
            return BorrowOutcome::Fail(PoolError::PoolClosed);
        }

        loop {
            if let Some(queue) = inner.idle.get_mut(key) {
                while let Some(entry) = queue.pop_front() {
                    if entry.conn.is_closed() {
                        trace!(key = ?key, "discarding closed idle connection");
                        Self::decrement_locked(&mut inner, key);
                        continue;
                    }
                    if let Some(deadline) = entry.borrow_deadline {
                        if now >= deadline {
                            debug!(key = ?key, "evicting expired idle connection");
                            entry.conn.shutdown();
                            Self::decrement_locked(&mut inner, key);
                            continue;
                        }
                    }
                    if queue.is_empty() {
                        inner.idle.remove(key);
                    }
                    debug!(key = ?key, "recycling idle connection");
                    return BorrowOutcome::Deliver(self.make_lease(key.clone(), entry.conn, false));
                }
                inner.idle.remove(key);
            }

            let max_per_key = self.config.max_per_key(key);
            if max_per_key == 0 {
                return BorrowOutcome::Fail(PoolError::NoConnectionAllowed(key.clone()));
            }

            let allocated_for_key = inner.allocated.get(key).copied().unwrap_or(0);
            if inner.total < self.config.max_total && allocated_for_key < max_per_key {
                Self::increment_locked(&mut inner, key);
                return BorrowOutcome::Build;
            }

            if inner.total >= self.config.max_total {
                let candidates: Vec<K> = inner.idle.keys().cloned().collect();
                if !candidates.is_empty() {
                    let idx = self.victim_picker.pick_index(candidates.len());
                    let victim = candidates[idx].clone();
                    let queue = inner
                        .idle
                        .get_mut(&victim)
                        .expect("victim key present in idle map");
                    let victim_entry = queue.pop_front().expect("victim queue non-empty");
                    if queue.is_empty() {
                        inner.idle.remove(&victim);
                    }
                    victim_entry.conn.shutdown();
                    Self::decrement_locked(&mut inner, &victim);
                    debug!(victim = ?victim, requested = ?key, "random eviction to satisfy capacity");
                    continue;
                }
            }

            if inner.wait.len() >= self.config.max_wait_queue_limit {
                return BorrowOutcome::Fail(PoolError::WaitQueueFull);
            }
            let (tx, rx) = oneshot::channel();
            let token = self.next_waiter_token.fetch_add(1, Ordering::Relaxed);
            inner.wait.push_back(Waiter {
                key: key.clone(),
                completion: tx,
                enqueued_at: now,
                token,
            });
            debug!(key = ?key, wait_len = inner.wait.len(), "enqueueing waiter");
            return BorrowOutcome::Wait(WaiterRegistration {
                rx,
                token,
                shared: Arc::downgrade(self),
            });
        }
    }

    /// spec.md §4.3 dispose: reverses the optimistic reservation made
    /// before a build was attempted. Never touches waiters.
    fn dispose(&self, key: &K) {
        let mut inner = self.lock();
        Self::decrement_locked(&mut inner, key);
    }

    /// Removes the `Waiter` matching `token`, if it is still queued.
    ///
    /// Called by [`WaiterRegistration::drop`] so an abandoned `borrow()`
    /// call (the caller dropped the future, e.g. on its own timeout or
    /// cancellation) doesn't leave a dead entry occupying a
    /// `max_wait_queue_limit` slot forever. A no-op if the waiter was
    /// already removed (handed off, expired, or the pool shut down), which
    /// is the common case since this also runs on the successful path.
    fn remove_waiter(&self, token: u64) {
        let mut inner = self.lock();
        let before = inner.wait.len();
        inner.wait.retain(|w| w.token != token);
        if inner.wait.len() != before {
            trace!(token, "removed abandoned waiter registration");
        }
    }

    fn complete_release(self: &Arc<Self>, key: K, conn: B::Connection) {
        if conn.is_recyclable() {
            self.recyclable_release(key, conn);
        } else {
            self.non_recyclable_release(key, conn);
        }
    }

    /// spec.md §4.2 recyclable release.
    fn recyclable_release(self: &Arc<Self>, key: K, conn: B::Connection) {
        loop {
            let now = self.clock.now();
            let mut inner = self.lock();

            if inner.closed {
                drop(inner);
                conn.shutdown();
                return;
            }

            if let Some(idx) = inner.wait.iter().position(|w| w.key == key) {
                let waiter = inner.wait.remove(idx).expect("index just found");
                if waiter::is_expired(&waiter, now, &self.config) {
                    let _ = waiter.completion.send(Err(PoolError::WaitQueueTimeout));
                    drop(inner);
                    continue;
                }
                drop(inner);
                debug!(key = ?key, "handing off recyclable connection to same-key waiter");
                let lease = self.make_lease(key, conn, false);
                let _ = waiter.completion.send(Ok(lease));
                return;
            }

            if inner.wait.is_empty() {
                let deadline = self.config.max_idle_duration.map(|d| now + d);
                inner.idle.entry(key.clone()).or_default().push_back(PooledEntry {
                    conn,
                    borrow_deadline: deadline,
                });
                debug!(key = ?key, "parking idle connection");
                return;
            }

            if let Some(waiter) =
                waiter::find_first_admissible(&mut inner.wait, &inner.allocated, now, &self.config)
            {
                Self::decrement_locked(&mut inner, &key);
                Self::increment_locked(&mut inner, &waiter.key);
                drop(inner);
                debug!(
                    from = ?key,
                    to = ?waiter.key,
                    "evicting wrong-key connection to serve a waiter"
                );
                conn.shutdown();
                self.spawn_build_for_waiter(waiter);
                return;
            }

            // No admissible waiter exists (every waiter is blocked solely
            // by its own per-key ceiling): park anyway. See spec.md §9,
            // Design Notes open question — preserved deliberately, not a
            // bug.
            let deadline = self.config.max_idle_duration.map(|d| now + d);
            inner.idle.entry(key.clone()).or_default().push_back(PooledEntry {
                conn,
                borrow_deadline: deadline,
            });
            debug!(key = ?key, "parking idle connection over a per-key-blocked waiter");
            return;
        }
    }

    /// spec.md §4.2 non-recyclable release, and the shared core of
    /// `invalidate` (§4.3): decrement, tear down if not already closed,
    /// then try to satisfy the first admissible waiter with a fresh build.
    fn non_recyclable_release(self: &Arc<Self>, key: K, conn: B::Connection) {
        let now = self.clock.now();
        let mut inner = self.lock();

        if inner.closed {
            drop(inner);
            if !conn.is_closed() {
                conn.shutdown();
            }
            return;
        }

        Self::decrement_locked(&mut inner, &key);
        if !conn.is_closed() {
            conn.shutdown();
        }

        if let Some(waiter) =
            waiter::find_first_admissible(&mut inner.wait, &inner.allocated, now, &self.config)
        {
            Self::increment_locked(&mut inner, &waiter.key);
            drop(inner);
            debug!(key = ?waiter.key, "building fresh connection for waiter after release");
            self.spawn_build_for_waiter(waiter);
        }
    }

    fn invalidate(self: &Arc<Self>, key: K, conn: B::Connection) {
        self.non_recyclable_release(key, conn);
    }

    fn spawn_build_for_waiter(self: &Arc<Self>, waiter: Waiter<K, B>) {
        let shared = Arc::clone(self);
        let build_key = waiter.key.clone();
        let fut = async move {
            match shared.builder.build(build_key.clone()).await {
                Ok(conn) => {
                    let lease = shared.make_lease(build_key, conn, true);
                    let _ = waiter.completion.send(Ok(lease));
                }
                Err(err) => {
                    shared.dispose(&build_key);
                    let _ = waiter
                        .completion
                        .send(Err(PoolError::BuildFailed(Box::new(err))));
                }
            }
        };
        self.executor.spawn(Box::pin(fut));
    }

    fn shutdown(&self) {
        let mut inner = self.lock();
        if inner.closed {
            return;
        }
        inner.closed = true;
        for (_key, queue) in inner.idle.drain() {
            for entry in queue {
                entry.conn.shutdown();
            }
        }
        inner.allocated.clear();
        inner.total = 0;
        waiter::fail_all(&mut inner.wait);
        inner.idle_sweeper_ref.take();
    }

    fn state(&self) -> PoolStats<K> {
        let inner = self.lock();
        PoolStats {
            closed: inner.closed,
            total: inner.total,
            allocated: inner.allocated.clone(),
            idle_depths: inner.idle.iter().map(|(k, v)| (k.clone(), v.len())).collect(),
            wait_len: inner.wait.len(),
        }
    }

    /// Run by the background [`IdleSweeper`]: evicts closed/expired idle
    /// entries and fails expired waiters. Grounded on the teacher's
    /// `PoolInner::clear_expired`.
    fn sweep(&self) {
        let now = self.clock.now();
        let mut inner = self.lock();

        inner.idle.retain(|key, queue| {
            let before = queue.len();
            queue.retain(|entry| {
                if entry.conn.is_closed() {
                    return false;
                }
                if let Some(deadline) = entry.borrow_deadline {
                    if now >= deadline {
                        entry.conn.shutdown();
                        return false;
                    }
                }
                true
            });
            if queue.len() != before {
                trace!(key = ?key, remaining = queue.len(), "idle sweep evicted entries");
            }
            !queue.is_empty()
        });

        waiter::sweep_expired(&mut inner.wait, now, &self.config);
    }
}

/// The smallest finite timeout this pool cares about, floored so the
/// sweeper never wakes more often than necessary. Grounded on the
/// teacher's `MIN_CHECK` floor in `spawn_idle_interval`.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(90);

fn sweep_interval<K: RequestKey>(config: &Config<K>) -> Option<Duration> {
    let idle = config.max_idle_duration;
    let waiter = config.waiter_timeout();
    let smallest = match (idle, waiter) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    };
    smallest.map(|d| d.max(MIN_SWEEP_INTERVAL))
}

/// Periodically sweeps expired idle entries and waiters. Grounded on the
/// teacher's `IdleTask`: a oneshot receiver doubles as a pool-dropped
/// signal so the task exits as soon as the pool (here: `shutdown`) lets go
/// of its sender.
struct IdleSweeper<K: RequestKey, B: ConnectionBuilder<K>> {
    shared: Weak<PoolShared<K, B>>,
    interval: Duration,
    drop_notifier: oneshot::Receiver<std::convert::Infallible>,
}

impl<K: RequestKey, B: ConnectionBuilder<K>> IdleSweeper<K, B> {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.shared.upgrade() {
                        Some(shared) => shared.sweep(),
                        None => break,
                    }
                }
                _ = &mut self.drop_notifier => break,
            }
        }
    }
}
