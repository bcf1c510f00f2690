//! A capacity-bounded, async connection pool keyed by destination endpoint.
//!
//! This crate owns connection *lifecycle and accounting* only: it hands out
//! connections built by a caller-supplied [`ConnectionBuilder`], tracks how
//! many are outstanding per key and in total, parks idle connections for
//! reuse, queues borrowers when capacity is exhausted, and evicts to break
//! deadlocks. It never parses a protocol, owns a socket, retries a request,
//! resolves a name, or negotiates TLS — see `DESIGN.md` for the module-by-
//! module grounding of this design in `hyper-util`'s connection pool.
//!
//! ```ignore
//! let pool = Pool::new(my_builder, ConfigBuilder::new(64).max_per_key(|_| 8).build());
//! let lease = pool.borrow(key).await?;
//! // use *lease ...
//! // dropping `lease` returns the connection to the pool automatically
//! ```

pub mod pool;

pub use pool::clock::{Clock, SystemClock, TestClock};
pub use pool::config::{Config, ConfigBuilder};
pub use pool::conn::{BoxFuture, Connection, ConnectionBuilder};
pub use pool::error::{BoxBuildError, PoolError};
pub use pool::exec::{Executor, TokioExecutor};
pub use pool::key::RequestKey;
pub use pool::rng::{SeededPicker, ThreadRngPicker, VictimPicker};
pub use pool::{Lease, Pool, PoolStats};
