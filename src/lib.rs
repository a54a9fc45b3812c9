//! slotpool: bounded-concurrency work pools with incrementally
//! consumable results.
//!
//! A pool runs user-supplied work items under a strict cap on simultaneous
//! executions and surfaces outcomes as a lazy sequence, in completion or
//! submission order. [`WorkPool`] drives async work on a Tokio runtime;
//! [`SyncPool`] drives synchronous work on dedicated threads. Both sit on
//! the same core state machine: one mutex, one result slot per submitted
//! item, and a trailing sentinel slot that marks the end of results once
//! intake closes.

mod core;
mod error;
mod ext;
mod order;
mod pool;
mod slot;
mod stream;
mod sync_pool;

pub use error::{PoolError, PoolResult};
pub use ext::{ConcurrentIterExt, ConcurrentStreamExt};
pub use order::ResultOrder;
pub use pool::WorkPool;
pub use stream::{ResultIter, ResultStream};
pub use sync_pool::SyncPool;

/// Best-effort tracing for tests; enable output with `RUST_LOG`.
#[cfg(test)]
pub(crate) fn init_test_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_test_writer())
        .try_init();
}
