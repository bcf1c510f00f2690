//! Property tests for the universal invariants (spec.md §8) under random
//! operation sequences, grounded in spec.md §8's own framing rather than in
//! any single teacher test — see `DESIGN.md` / `SPEC_FULL.md` §9.5 for why
//! `proptest` was added as a dev-dependency for this crate specifically.
#![cfg(test)]

use std::sync::Arc;

use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

use crate::pool::config::ConfigBuilder;
use crate::pool::rng::ThreadRngPicker;
use crate::pool::test_support::FakeBuilder;
use crate::pool::{Clock, Lease, Pool, SystemClock, TokioExecutor};

const KEYS: [&str; 3] = ["k0", "k1", "k2"];
const MAX_TOTAL: usize = 3;
const MAX_PER_KEY: usize = 3;
const MAX_WAIT: usize = 2;

#[derive(Debug, Clone, Copy)]
enum Op {
    Borrow(usize),
    Release(usize),
    Invalidate(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..KEYS.len()).prop_map(Op::Borrow),
        any::<usize>().prop_map(Op::Release),
        any::<usize>().prop_map(Op::Invalidate),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Drives a bounded sequence of borrow/release/invalidate calls and
    /// checks spec.md §8 invariants 1-3 after every step, plus a derived
    /// bookkeeping check (idle + outstanding == total) standing in for
    /// invariant 4 (a connection is never both checked out and idle).
    ///
    /// `Borrow` is only attempted while fewer than `MAX_TOTAL` leases are
    /// currently held, which (given `MAX_PER_KEY == MAX_TOTAL`) guarantees
    /// every borrow can be satisfied by recycling, building, or evicting an
    /// idle entry without ever parking a waiter — so this sequence can
    /// never deadlock the single task driving it.
    #[test]
    fn invariants_hold_under_random_operation_sequences(ops in prop::collection::vec(op_strategy(), 0..40)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        // `prop_assert!`'s `return` targets the nearest enclosing function-like
        // scope, which for a bare `async {}` block is the block itself — so
        // the block is written to produce a `Result` and that result is
        // propagated out of the test function explicitly, rather than being
        // silently discarded by `block_on`.
        let outcome: Result<(), TestCaseError> = rt.block_on(async {
            let cfg = ConfigBuilder::new(MAX_TOTAL)
                .max_per_key(|_: &&'static str| MAX_PER_KEY)
                .max_wait_queue_limit(MAX_WAIT)
                .build();
            let pool: Pool<&'static str, FakeBuilder> = Pool::with_parts(
                FakeBuilder::default(),
                cfg,
                Arc::new(SystemClock) as Arc<dyn Clock + Send + Sync>,
                Arc::new(ThreadRngPicker),
                Arc::new(TokioExecutor),
            );
            let mut outstanding: Vec<Lease<&'static str, FakeBuilder>> = Vec::new();

            for op in ops {
                match op {
                    Op::Borrow(key_idx) if outstanding.len() < MAX_TOTAL => {
                        let key = KEYS[key_idx % KEYS.len()];
                        if let Ok(lease) = pool.borrow(key).await {
                            outstanding.push(lease);
                        }
                    }
                    Op::Release(idx) if !outstanding.is_empty() => {
                        let lease = outstanding.remove(idx % outstanding.len());
                        pool.release(lease);
                    }
                    Op::Invalidate(idx) if !outstanding.is_empty() => {
                        let lease = outstanding.remove(idx % outstanding.len());
                        pool.invalidate(lease);
                    }
                    _ => {}
                }

                let stats = pool.state();
                let sum_allocated: usize = stats.allocated.values().sum();
                prop_assert_eq!(sum_allocated, stats.total, "invariant 1: total == sum(allocated)");
                prop_assert!(stats.total <= MAX_TOTAL, "invariant 2: total <= max_total");
                for count in stats.allocated.values() {
                    prop_assert!(*count <= MAX_PER_KEY, "invariant 2: allocated[k] <= max_per_key");
                }
                prop_assert!(stats.wait_len <= MAX_WAIT, "invariant 3: |wait| <= max_wait_queue_limit");

                let idle_total: usize = stats.idle_depths.values().sum();
                prop_assert_eq!(
                    idle_total + outstanding.len(),
                    stats.total,
                    "derived: idle + outstanding == total (no connection is both checked out and idle)"
                );
            }
            Ok(())
        });
        outcome?;
    }

    /// spec.md §8 invariant 5: once `shutdown` runs, every later `borrow`
    /// fails with `PoolClosed`, regardless of what state the pool was in.
    #[test]
    fn shutdown_is_terminal_after_any_sequence(ops in prop::collection::vec(op_strategy(), 0..20)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let outcome: Result<(), TestCaseError> = rt.block_on(async {
            let cfg = ConfigBuilder::new(MAX_TOTAL)
                .max_per_key(|_: &&'static str| MAX_PER_KEY)
                .max_wait_queue_limit(MAX_WAIT)
                .build();
            let pool: Pool<&'static str, FakeBuilder> = Pool::with_parts(
                FakeBuilder::default(),
                cfg,
                Arc::new(SystemClock) as Arc<dyn Clock + Send + Sync>,
                Arc::new(ThreadRngPicker),
                Arc::new(TokioExecutor),
            );
            let mut outstanding: Vec<Lease<&'static str, FakeBuilder>> = Vec::new();

            for op in ops {
                match op {
                    Op::Borrow(key_idx) if outstanding.len() < MAX_TOTAL => {
                        let key = KEYS[key_idx % KEYS.len()];
                        if let Ok(lease) = pool.borrow(key).await {
                            outstanding.push(lease);
                        }
                    }
                    Op::Release(idx) if !outstanding.is_empty() => {
                        let lease = outstanding.remove(idx % outstanding.len());
                        pool.release(lease);
                    }
                    Op::Invalidate(idx) if !outstanding.is_empty() => {
                        let lease = outstanding.remove(idx % outstanding.len());
                        pool.invalidate(lease);
                    }
                    _ => {}
                }
            }

            pool.shutdown();
            let err = pool.borrow(KEYS[0]).await.unwrap_err();
            prop_assert!(matches!(err, crate::pool::PoolError::PoolClosed));
            Ok(())
        });
        outcome?;
    }
}
