//! Synchronous thread-pool driver.
//!
//! For synchronous work the OS thread count is the concurrency bound, so
//! the core runs with the unbounded cap policy: each worker thread holds at
//! most one item at a time, giving exactly `threads` concurrent executions.
//! The pool is static - the whole collection is submitted and sealed at
//! construction - and threads exit once the queue drains.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread;

use crate::core::{CapPolicy, Dispatch, PoolCore, SlotLookup};
use crate::error::{PoolError, panic_message};
use crate::order::ResultOrder;
use crate::stream::ResultIter;

type WorkFn<T, E> = Box<dyn FnOnce() -> Result<T, E> + Send>;

/// Bounded-concurrency pool over synchronous work, driven by dedicated
/// worker threads.
pub struct SyncPool<T, E> {
    core: Arc<PoolCore<WorkFn<T, E>, T, E>>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl<T, E> SyncPool<T, E>
where
    T: Clone + Send + 'static,
    E: Send + Sync + 'static,
{
    /// Run `process` over `items` on `threads` worker threads.
    ///
    /// # Panics
    /// Panics if `threads` is zero.
    pub fn new<I, F>(threads: usize, order: ResultOrder, items: I, process: F) -> Self
    where
        I: IntoIterator,
        I::Item: Send + 'static,
        F: Fn(I::Item) -> Result<T, E> + Send + Sync + 'static,
    {
        assert!(threads > 0, "worker thread count must be at least 1");

        let core = Arc::new(PoolCore::new(order, CapPolicy::Unbounded));
        let process = Arc::new(process);
        let work = items.into_iter().map(|item| {
            let process = Arc::clone(&process);
            Box::new(move || process(item)) as WorkFn<T, E>
        });
        // Fresh pool: intake is open by construction.
        let submitted = core.add(work).unwrap_or(0);
        core.seal();
        tracing::debug!(threads, submitted, "sync pool started");

        let workers = (0..threads)
            .map(|index| {
                let core = Arc::clone(&core);
                thread::Builder::new()
                    .name(format!("slotpool-worker-{index}"))
                    .spawn(move || worker_loop(core))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self { core, workers }
    }

    /// Fail the pool with [`PoolError::Cancelled`]. Queued work is purged;
    /// items already running finish but their outcomes are discarded.
    pub fn cancel(&self) {
        self.core.fail(PoolError::Cancelled);
    }

    /// Blocking iterator over results. Independent of any other iterator
    /// over this pool.
    pub fn results(&self) -> ResultIter<T, E> {
        let lookup: Arc<dyn SlotLookup<T, E>> = Arc::clone(&self.core) as Arc<dyn SlotLookup<T, E>>;
        ResultIter::new(lookup)
    }

    /// Block until every result is in, collecting them.
    pub fn collect(&self) -> Result<Vec<T>, PoolError<E>> {
        self.results().collect()
    }

    /// Block until completion, discarding results.
    pub fn wait(&self) -> Result<(), PoolError<E>> {
        for item in self.results() {
            item?;
        }
        Ok(())
    }

    /// Join the worker threads. Also happens on drop.
    pub fn join(mut self) {
        self.join_workers();
    }
}

impl<T, E> SyncPool<T, E> {
    fn join_workers(&mut self) {
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("worker thread terminated abnormally");
            }
        }
    }
}

impl<T, E> Drop for SyncPool<T, E> {
    fn drop(&mut self) {
        self.join_workers();
    }
}

fn worker_loop<T: Clone, E>(core: Arc<PoolCore<WorkFn<T, E>, T, E>>) {
    loop {
        match core.next_work() {
            Dispatch::Run { work, execution } => {
                match catch_unwind(AssertUnwindSafe(work)) {
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
            Dispatch::Saturated | Dispatch::Drained => return,
        }
    }
}
