//! Bounded-concurrency helpers over plain inputs.
//!
//! Thin fronts that feed a dynamic [`WorkPool`] from an async stream or a
//! synchronous collection and hand back the collected results. Intake is
//! owned by the helper, so submissions cannot observe a closed intake; a
//! failed pool swallows late submissions and the terminal error surfaces
//! from the final collect.

use std::future::Future;
use std::pin::pin;

use futures::{Stream, StreamExt};

use crate::error::PoolError;
use crate::order::ResultOrder;
use crate::pool::WorkPool;

/// Bounded concurrent mapping over async streams.
pub trait ConcurrentStreamExt: Stream + Sized {
    /// Run `f` over every stream item with at most `limit` in flight,
    /// collecting results in input order.
    fn map_bounded<F, Fut, T, E>(
        self,
        limit: usize,
        f: F,
    ) -> impl Future<Output = Result<Vec<T>, PoolError<E>>>
    where
        F: FnMut(Self::Item) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Clone + Send + 'static,
        E: Send + Sync + 'static;

    /// Run `f` over every stream item with at most `limit` in flight,
    /// discarding results.
    fn for_each_bounded<F, Fut, E>(
        self,
        limit: usize,
        f: F,
    ) -> impl Future<Output = Result<(), PoolError<E>>>
    where
        F: FnMut(Self::Item) -> Fut,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Send + Sync + 'static;
}

impl<S: Stream + Sized> ConcurrentStreamExt for S {
    async fn map_bounded<F, Fut, T, E>(
        self,
        limit: usize,
        mut f: F,
    ) -> Result<Vec<T>, PoolError<E>>
    where
        F: FnMut(Self::Item) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Clone + Send + 'static,
        E: Send + Sync + 'static,
    {
        let pool = WorkPool::new(limit, ResultOrder::Submission);
        let mut input = pin!(self);
        while let Some(item) = input.next().await {
            let _ = pool.submit(f(item));
        }
        pool.close_intake();
        pool.collect().await
    }

    async fn for_each_bounded<F, Fut, E>(self, limit: usize, mut f: F) -> Result<(), PoolError<E>>
    where
        F: FnMut(Self::Item) -> Fut,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Send + Sync + 'static,
    {
        let pool = WorkPool::new(limit, ResultOrder::Completion);
        let mut input = pin!(self);
        while let Some(item) = input.next().await {
            let _ = pool.submit(f(item));
        }
        pool.close_intake();
        pool.wait().await
    }
}

/// Bounded concurrent mapping over synchronous collections.
pub trait ConcurrentIterExt: IntoIterator + Sized {
    /// Run `f` over every item with at most `limit` in flight, collecting
    /// results in input order.
    fn map_bounded<F, Fut, T, E>(
        self,
        limit: usize,
        f: F,
    ) -> impl Future<Output = Result<Vec<T>, PoolError<E>>>
    where
        F: FnMut(Self::Item) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Clone + Send + 'static,
        E: Send + Sync + 'static;

    /// Run `f` over every item with at most `limit` in flight, discarding
    /// results.
    fn for_each_bounded<F, Fut, E>(
        self,
        limit: usize,
        f: F,
    ) -> impl Future<Output = Result<(), PoolError<E>>>
    where
        F: FnMut(Self::Item) -> Fut,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Send + Sync + 'static;
}

impl<I: IntoIterator + Sized> ConcurrentIterExt for I {
    async fn map_bounded<F, Fut, T, E>(
        self,
        limit: usize,
        mut f: F,
    ) -> Result<Vec<T>, PoolError<E>>
    where
        F: FnMut(Self::Item) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Clone + Send + 'static,
        E: Send + Sync + 'static,
    {
        let pool = WorkPool::new(limit, ResultOrder::Submission);
        for item in self {
            let _ = pool.submit(f(item));
        }
        pool.close_intake();
        pool.collect().await
    }

    async fn for_each_bounded<F, Fut, E>(self, limit: usize, mut f: F) -> Result<(), PoolError<E>>
    where
        F: FnMut(Self::Item) -> Fut,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Send + Sync + 'static,
    {
        let pool = WorkPool::new(limit, ResultOrder::Completion);
        for item in self {
            let _ = pool.submit(f(item));
        }
        pool.close_intake();
        pool.wait().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn iter_map_bounded_preserves_input_order() {
        let doubled = (0..100u32)
            .map_bounded(8, |i| async move {
                // Scramble wall-clock completion order.
                tokio::time::sleep(Duration::from_micros((i as u64 * 53) % 400)).await;
                Ok::<_, String>(i * 2)
            })
            .await
            .unwrap();

        assert_eq!(doubled, (0..100).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn stream_map_bounded_preserves_input_order() {
        let squares = futures::stream::iter(0..50u64)
            .map_bounded(4, |i| async move { Ok::<_, String>(i * i) })
            .await
            .unwrap();

        assert_eq!(squares, (0..50).map(|i| i * i).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn for_each_bounded_visits_everything() {
        let counter = Arc::new(AtomicUsize::new(0));
        (0..64u32)
            .for_each_bounded(6, |_| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(())
                }
            })
            .await
            .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 64);
    }

    #[tokio::test]
    async fn map_bounded_surfaces_the_first_failure() {
        let result = (0..20u32)
            .map_bounded(3, |i| async move {
                if i == 11 {
                    Err(format!("item {i} broke"))
                } else {
                    Ok(i)
                }
            })
            .await;

        match result {
            Err(PoolError::Work(e)) => assert_eq!(*e, "item 11 broke"),
            other => panic!("expected work error, got {other:?}"),
        }
    }
}
