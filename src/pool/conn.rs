use std::future::Future;
use std::pin::Pin;

use crate::pool::key::RequestKey;

/// A boxed, `Send` future, used where the pool needs to hold a connection
/// builder's output behind a trait object.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An external, pool-managed transport handle.
///
/// The pool treats connections as an opaque capability: it never dials,
/// reads, or writes through one. `is_closed` and `is_recyclable` are not
/// assumed to be monotone over a connection's lifetime, except that once the
/// pool has observed `is_closed() == true` it will never hand that
/// connection out again.
pub trait Connection<K: RequestKey>: Send + 'static {
    /// The destination this connection was built for.
    fn request_key(&self) -> &K;

    /// Whether the underlying transport has gone away. A closed connection
    /// is discarded rather than recycled or reused.
    fn is_closed(&self) -> bool;

    /// Whether this connection is in a clean, reusable state right now.
    /// Checked only at release time; borrowing never reads it.
    fn is_recyclable(&self) -> bool;

    /// Idempotent, synchronous teardown. Must not panic.
    fn shutdown(&self);
}

/// An asynchronous factory that produces fresh connections for a key.
///
/// A successful build must yield a healthy, never-used connection tagged
/// with the requested key.
///
/// Grounded on `bb8`'s `ManageConnection` (`bb8::lib`): rather than thread
/// both a connection type and a builder type as separate parameters through
/// `Pool`, the connection type hangs off the builder as an associated type,
/// so `Pool<K, B>` only ever needs two generic parameters.
pub trait ConnectionBuilder<K: RequestKey>: Send + Sync + 'static {
    /// The connection type this builder produces.
    type Connection: Connection<K>;

    /// The failure type surfaced through [`crate::pool::error::PoolError::BuildFailed`].
    type Error: std::error::Error + Send + Sync + 'static;

    fn build(&self, key: K) -> BoxFuture<'static, Result<Self::Connection, Self::Error>>;
}
