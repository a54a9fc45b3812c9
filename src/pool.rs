//! Async work pool driver.
//!
//! Flow:
//! 1. `submit` boxes the work, hands it to the core, and spawns a runner
//! 2. A runner loops: pull work under the cap, run it, record the outcome
//! 3. A completed runner immediately pulls again, reusing its capacity
//! 4. Runners exit on `Saturated` (someone else holds the capacity) or
//!    `Drained` (nothing queued right now; the next submit spawns anew)
//!
//! Since every runner holds at most one unit of capacity and the core hands
//! out work under a single mutex, at most `limit` items execute at any
//! moment, however many are submitted.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::core::{CapPolicy, Dispatch, PoolCore, SlotLookup};
use crate::error::{PoolError, panic_message};
use crate::order::ResultOrder;
use crate::stream::ResultStream;

type WorkFuture<T, E> = BoxFuture<'static, Result<T, E>>;

/// Bounded-concurrency pool over async work items.
///
/// Work submitted through [`submit`](Self::submit) runs on the ambient Tokio
/// runtime, never more than `limit` items at once. Results are consumed
/// incrementally through [`results`](Self::results), in completion or
/// submission order per the [`ResultOrder`] the pool was built with.
///
/// Handles are cheap to clone; all clones drive the same pool.
pub struct WorkPool<T, E> {
    core: Arc<PoolCore<WorkFuture<T, E>, T, E>>,
    cancel: CancellationToken,
    limit: usize,
}

impl<T, E> WorkPool<T, E>
where
    T: Clone + Send + 'static,
    E: Send + Sync + 'static,
{
    /// New dynamic pool accepting submissions until
    /// [`close_intake`](Self::close_intake).
    ///
    /// # Panics
    /// Panics if `limit` is zero - such a pool could never run anything.
    pub fn new(limit: usize, order: ResultOrder) -> Self {
        assert!(limit > 0, "concurrency limit must be at least 1");
        Self {
            core: Arc::new(PoolCore::new(order, CapPolicy::Bounded(limit))),
            cancel: CancellationToken::new(),
            limit,
        }
    }

    /// Static pool: submit `process(item)` for the whole collection and
    /// close intake, results in completion order.
    pub fn from_items<I, F, Fut>(items: I, limit: usize, mut process: F) -> Self
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let pool = Self::new(limit, ResultOrder::Completion);
        let added = pool
            .core
            .add(items.into_iter().map(|item| process(item).boxed()))
            .unwrap_or(0);
        for _ in 0..added.min(limit) {
            pool.spawn_runner();
        }
        pool.close_intake();
        pool
    }

    /// Submit one work item.
    ///
    /// Returns [`PoolError::IntakeClosed`] after `close_intake`. On a
    /// failed pool the item is dropped silently; consumers already hold
    /// the terminal error.
    pub fn submit<F>(&self, work: F) -> Result<(), PoolError<E>>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        let added = self.core.add([work.boxed()])?;
        if added > 0 {
            self.spawn_runner();
        }
        Ok(())
    }

    /// Submit a batch, spawning up to `limit` runners to saturate the cap
    /// quickly.
    pub fn submit_many<I, F>(&self, works: I) -> Result<(), PoolError<E>>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        let added = self.core.add(works.into_iter().map(FutureExt::boxed))?;
        for _ in 0..added.min(self.limit) {
            self.spawn_runner();
        }
        Ok(())
    }

    /// Close intake: no further submissions, results drain to the end
    /// marker. Idempotent.
    pub fn close_intake(&self) {
        self.core.seal();
    }

    /// Cancel the pool: queued work is purged and every consumer resolves
    /// to [`PoolError::Cancelled`]. Items already running finish but their
    /// outcomes are discarded; the pool never aborts in-flight work.
    pub fn cancel(&self) {
        self.core.fail(PoolError::Cancelled);
        self.cancel.cancel();
    }

    /// Token fired by [`cancel`](Self::cancel). Work items that want to
    /// wind down early on pool cancellation opt in by watching it.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stream of results. Independent of any other stream over this pool.
    pub fn results(&self) -> ResultStream<T, E> {
        let lookup: Arc<dyn SlotLookup<T, E>> = Arc::clone(&self.core) as Arc<dyn SlotLookup<T, E>>;
        ResultStream::new(lookup)
    }

    /// Await every result into a vector.
    pub async fn collect(&self) -> Result<Vec<T>, PoolError<E>> {
        let mut stream = self.results();
        let mut values = Vec::new();
        while let Some(item) = stream.next().await {
            values.push(item?);
        }
        Ok(values)
    }

    /// Await completion, discarding results.
    pub async fn wait(&self) -> Result<(), PoolError<E>> {
        let mut stream = self.results();
        while let Some(item) = stream.next().await {
            item?;
        }
        Ok(())
    }

    fn spawn_runner(&self) {
        let core = Arc::clone(&self.core);
        tokio::spawn(async move {
            loop {
                let (work, execution) = match core.next_work() {
                    Dispatch::Run { work, execution } => (work, execution),
                    Dispatch::Saturated | Dispatch::Drained => return,
                };
                // In-flight work always runs to completion; a failed core
                // discards the outcome in `complete`.
                match AssertUnwindSafe(work).catch_unwind().await {
                    Ok(Ok(value)) => core.complete(execution, value),
                    Ok(Err(error)) => {
                        core.fail(PoolError::Work(Arc::new(error)));
                        return;
                    }
                    Err(payload) => {
                        let message = panic_message(payload);
                        tracing::warn!(execution, %message, "work item panicked");
                        core.fail(PoolError::Panicked(message));
                        return;
                    }
                }
            }
        });
    }
}

impl<T, E> Clone for WorkPool<T, E> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            cancel: self.cancel.clone(),
            limit: self.limit,
        }
    }
}
