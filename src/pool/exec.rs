use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// A boxed, `'static + Send` unit future, the shape the pool spawns onto an
/// [`Executor`].
type BoxSendFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Runs background work: builds started to satisfy a released/invalidated
/// waiter, and the idle/waiter sweep task.
///
/// Grounded on the teacher's `crate::common::exec::Exec`, which wraps
/// whatever `hyper::rt::Executor` the embedding client was built with so
/// the pool never hardcodes `tokio::spawn`. This crate keeps that
/// indirection for the same reason, with a `TokioExecutor` default.
pub trait Executor: Send + Sync + 'static {
    fn spawn(&self, future: BoxSendFuture);
}

impl fmt::Debug for dyn Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Executor")
    }
}

/// Spawns onto the ambient Tokio runtime.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioExecutor;

impl Executor for TokioExecutor {
    fn spawn(&self, future: BoxSendFuture) {
        tokio::spawn(future);
    }
}
