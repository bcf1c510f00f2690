use std::ops::{Deref, DerefMut};
use std::sync::Weak;

use crate::pool::conn::ConnectionBuilder;
use crate::pool::key::RequestKey;
use crate::pool::PoolShared;

/// A connection checked out of the pool.
///
/// Grounded on the teacher's `Pooled<T, K>`: dereferences to the connection,
/// and on `Drop` returns it to the pool (recyclable release) unless it was
/// consumed first via [`crate::pool::Pool::invalidate`]. This is the
/// ergonomic layer the borrow/release contract presupposes but does not
/// itself name; a connection tagged fresh/recycled is exactly what this
/// type carries.
pub struct Lease<K: RequestKey, B: ConnectionBuilder<K>> {
    pub(crate) conn: Option<B::Connection>,
    pub(crate) key: K,
    pub(crate) fresh: bool,
    pub(crate) shared: Weak<PoolShared<K, B>>,
}

impl<K: RequestKey, B: ConnectionBuilder<K>> Lease<K, B> {
    /// `true` if this connection was just built by the
    /// [`crate::pool::conn::ConnectionBuilder`]; `false` if it was recycled
    /// from the idle pool or handed off directly from another release.
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    pub fn request_key(&self) -> &K {
        &self.key
    }

    pub(crate) fn take(&mut self) -> Option<B::Connection> {
        self.conn.take()
    }
}

impl<K: RequestKey, B: ConnectionBuilder<K>> Deref for Lease<K, B> {
    type Target = B::Connection;

    fn deref(&self) -> &B::Connection {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl<K: RequestKey, B: ConnectionBuilder<K>> DerefMut for Lease<K, B> {
    fn deref_mut(&mut self) -> &mut B::Connection {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl<K: RequestKey, B: ConnectionBuilder<K>> Drop for Lease<K, B> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Some(shared) = self.shared.upgrade() {
                shared.complete_release(self.key.clone(), conn);
            } else {
                use crate::pool::conn::Connection;
                conn.shutdown();
            }
        }
    }
}

impl<K, B> std::fmt::Debug for Lease<K, B>
where
    K: RequestKey,
    B: ConnectionBuilder<K>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("key", &self.key)
            .field("fresh", &self.fresh)
            .finish()
    }
}
