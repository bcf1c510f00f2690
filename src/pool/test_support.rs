//! Test-only fakes, grounded on the teacher's `Uniq<T>` / `CanClose` test
//! `Poolable` impls (`hyper_util::client::legacy::pool::tests`).
#![cfg(test)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::pool::conn::{BoxFuture, Connection, ConnectionBuilder};

#[derive(Debug, Clone)]
pub(crate) struct FakeConn {
    pub(crate) key: &'static str,
    pub(crate) id: u64,
    closed: Arc<AtomicBool>,
    recyclable: Arc<AtomicBool>,
}

impl FakeConn {
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub(crate) fn set_recyclable(&self, value: bool) {
        self.recyclable.store(value, Ordering::SeqCst);
    }
}

impl Connection<&'static str> for FakeConn {
    fn request_key(&self) -> &&'static str {
        &self.key
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn is_recyclable(&self) -> bool {
        self.recyclable.load(Ordering::SeqCst)
    }

    fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Builds `FakeConn`s, optionally failing by key or after N successes, and
/// recording how many builds it has started (for assertions on whether a
/// borrow actually built a fresh connection).
#[derive(Default)]
pub(crate) struct FakeBuilder {
    next_id: AtomicU64,
    fail_keys: std::sync::Mutex<std::collections::HashSet<&'static str>>,
    build_count: AtomicU64,
}

impl FakeBuilder {
    pub(crate) fn builds(&self) -> u64 {
        self.build_count.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_key(&self, key: &'static str) {
        self.fail_keys.lock().unwrap().insert(key);
    }
}

#[derive(Debug, thiserror::Error)]
#[error("fake build failure for {0}")]
pub(crate) struct FakeBuildError(pub &'static str);

impl ConnectionBuilder<&'static str> for FakeBuilder {
    type Connection = FakeConn;
    type Error = FakeBuildError;

    fn build(&self, key: &'static str) -> BoxFuture<'static, Result<FakeConn, Self::Error>> {
        self.build_count.fetch_add(1, Ordering::SeqCst);
        let should_fail = self.fail_keys.lock().unwrap().contains(key);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if should_fail {
                Err(FakeBuildError(key))
            } else {
                Ok(FakeConn {
                    key,
                    id,
                    closed: Arc::new(AtomicBool::new(false)),
                    recyclable: Arc::new(AtomicBool::new(true)),
                })
            }
        })
    }
}
