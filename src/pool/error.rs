use crate::pool::key::RequestKey;

/// The error type surfaced by a failed connection build, erased to a
/// trait object so `PoolError` doesn't need to carry the builder's
/// associated error type as a generic parameter everywhere it's named.
pub type BoxBuildError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The pool's error taxonomy.
///
/// The pool itself is infallible under normal operation: every recoverable
/// situation is absorbed into accounting changes or waiter failures. These
/// variants are the handful of outcomes that must be surfaced to a caller.
#[derive(thiserror::Error, Debug)]
pub enum PoolError<K: RequestKey> {
    /// `borrow` was called after `shutdown`. Terminal: the pool will never
    /// recover from this state.
    #[error("pool is closed")]
    PoolClosed,

    /// `max_per_key(key) == 0`; permanent for that key.
    #[error("no connections allowed for key {0:?}")]
    NoConnectionAllowed(K),

    /// The wait queue was already at `max_wait_queue_limit`; the caller may
    /// back off and retry.
    #[error("wait queue is full")]
    WaitQueueFull,

    /// A queued waiter aged out past its configured timeout before it could
    /// be served.
    #[error("timed out waiting for a connection")]
    WaitQueueTimeout,

    /// The `ConnectionBuilder` failed; accounting was reversed before this
    /// error was propagated.
    #[error("failed to build connection: {0}")]
    BuildFailed(#[source] BoxBuildError),
}
