use std::sync::Arc;
use std::time::Duration;

use crate::pool::key::RequestKey;

/// Immutable pool configuration, fixed at construction.
///
/// Grounded on the teacher's `pool::Config { idle_timeout, max_idle_per_host }`,
/// generalized to carry the global ceiling, the wait-queue bound, and the
/// two waiter-aging timeouts the teacher has no analogue for.
pub struct Config<K: RequestKey> {
    pub(crate) max_total: usize,
    pub(crate) max_per_key: Arc<dyn Fn(&K) -> usize + Send + Sync>,
    pub(crate) max_wait_queue_limit: usize,
    pub(crate) response_header_timeout: Option<Duration>,
    pub(crate) request_timeout: Option<Duration>,
    pub(crate) max_idle_duration: Option<Duration>,
}

impl<K: RequestKey> Config<K> {
    pub(crate) fn max_per_key(&self, key: &K) -> usize {
        (self.max_per_key)(key)
    }

    /// The waiter-aging timeout: a waiter expires once it has waited longer
    /// than the smaller of the two finite timeouts, if either is finite.
    pub(crate) fn waiter_timeout(&self) -> Option<Duration> {
        match (self.response_header_timeout, self.request_timeout) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }
}

/// Builds a [`Config`].
///
/// `max_total` defaults to `usize::MAX` squashed down by the first call to
/// `max_total`; callers are expected to set it explicitly since spec.md
/// requires `max_total > 0` as a hard ceiling, not an optional one.
pub struct ConfigBuilder<K: RequestKey> {
    max_total: usize,
    max_per_key: Arc<dyn Fn(&K) -> usize + Send + Sync>,
    max_wait_queue_limit: usize,
    response_header_timeout: Option<Duration>,
    request_timeout: Option<Duration>,
    max_idle_duration: Option<Duration>,
}

impl<K: RequestKey> ConfigBuilder<K> {
    pub fn new(max_total: usize) -> Self {
        assert!(max_total > 0, "max_total must be > 0");
        ConfigBuilder {
            max_total,
            max_per_key: Arc::new(|_: &K| usize::MAX),
            max_wait_queue_limit: 0,
            response_header_timeout: None,
            request_timeout: None,
            max_idle_duration: None,
        }
    }

    pub fn max_per_key<F>(mut self, f: F) -> Self
    where
        F: Fn(&K) -> usize + Send + Sync + 'static,
    {
        self.max_per_key = Arc::new(f);
        self
    }

    pub fn max_wait_queue_limit(mut self, limit: usize) -> Self {
        self.max_wait_queue_limit = limit;
        self
    }

    pub fn response_header_timeout(mut self, dur: Option<Duration>) -> Self {
        self.response_header_timeout = dur;
        self
    }

    pub fn request_timeout(mut self, dur: Option<Duration>) -> Self {
        self.request_timeout = dur;
        self
    }

    pub fn max_idle_duration(mut self, dur: Option<Duration>) -> Self {
        self.max_idle_duration = dur;
        self
    }

    pub fn build(self) -> Config<K> {
        Config {
            max_total: self.max_total,
            max_per_key: self.max_per_key,
            max_wait_queue_limit: self.max_wait_queue_limit,
            response_header_timeout: self.response_header_timeout,
            request_timeout: self.request_timeout,
            max_idle_duration: self.max_idle_duration,
        }
    }
}
