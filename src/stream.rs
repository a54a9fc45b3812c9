//! Result consumption: an async stream and a blocking iterator.
//!
//! Both are cursors over the pool's result slots: fetch slot `i`, advance,
//! await. Cursors are independent; several consumers over one pool each see
//! the full result sequence.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;

use crate::core::{SlotLookup, SlotValue};
use crate::error::PoolError;
use crate::slot::SlotFuture;

/// Async stream of pool results.
///
/// Yields `Ok(value)` per completed work item, ends after the sentinel, and
/// yields the terminal error once (then fuses) if the pool fails.
pub struct ResultStream<T, E> {
    lookup: Arc<dyn SlotLookup<T, E>>,
    cursor: usize,
    in_flight: Option<SlotFuture<SlotValue<T, E>>>,
    done: bool,
}

impl<T: Clone, E> ResultStream<T, E> {
    pub(crate) fn new(lookup: Arc<dyn SlotLookup<T, E>>) -> Self {
        Self {
            lookup,
            cursor: 0,
            in_flight: None,
            done: false,
        }
    }

    /// Next result, `None` once the pool is drained and sealed.
    pub async fn next(&mut self) -> Option<Result<T, PoolError<E>>> {
        futures::StreamExt::next(self).await
    }
}

impl<T: Clone, E> Stream for ResultStream<T, E> {
    type Item = Result<T, PoolError<E>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        let fut = this.in_flight.get_or_insert_with(|| {
            let fut = this.lookup.slot(this.cursor);
            this.cursor += 1;
            fut
        });
        match Pin::new(fut).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(value) => {
                this.in_flight = None;
                match value {
                    Ok(Some(v)) => Poll::Ready(Some(Ok(v))),
                    Ok(None) => {
                        this.done = true;
                        Poll::Ready(None)
                    }
                    Err(e) => {
                        this.done = true;
                        Poll::Ready(Some(Err(e)))
                    }
                }
            }
        }
    }
}

/// Blocking iterator over pool results, for the sync driver.
pub struct ResultIter<T, E> {
    lookup: Arc<dyn SlotLookup<T, E>>,
    cursor: usize,
    done: bool,
}

impl<T: Clone, E> ResultIter<T, E> {
    pub(crate) fn new(lookup: Arc<dyn SlotLookup<T, E>>) -> Self {
        Self {
            lookup,
            cursor: 0,
            done: false,
        }
    }
}

impl<T: Clone, E> Iterator for ResultIter<T, E> {
    type Item = Result<T, PoolError<E>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let fut = self.lookup.slot(self.cursor);
        self.cursor += 1;
        match futures::executor::block_on(fut) {
            Ok(Some(v)) => Some(Ok(v)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CapPolicy, Dispatch, PoolCore};
    use crate::order::ResultOrder;

    fn drained_core(values: &[u32]) -> Arc<PoolCore<u32, u32, String>> {
        let core = Arc::new(PoolCore::new(ResultOrder::Completion, CapPolicy::Unbounded));
        core.add(values.iter().copied()).unwrap();
        while let Dispatch::Run { work, execution } = core.next_work() {
            core.complete(execution, work);
        }
        core.seal();
        core
    }

    #[tokio::test]
    async fn stream_yields_all_then_ends() {
        let core = drained_core(&[1, 2, 3]);
        let mut stream = ResultStream::new(core as Arc<dyn SlotLookup<u32, String>>);

        let mut seen = Vec::new();
        while let Some(item) = stream.next().await {
            seen.push(item.unwrap());
        }
        assert_eq!(seen, vec![1, 2, 3]);

        // Fused after the sentinel.
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn independent_cursors_see_the_same_results() {
        let core = drained_core(&[5, 6]);
        let lookup: Arc<dyn SlotLookup<u32, String>> = core;

        let mut a = ResultStream::new(Arc::clone(&lookup));
        let mut b = ResultStream::new(lookup);

        assert_eq!(a.next().await.unwrap().unwrap(), 5);
        assert_eq!(b.next().await.unwrap().unwrap(), 5);
        assert_eq!(a.next().await.unwrap().unwrap(), 6);
        assert_eq!(b.next().await.unwrap().unwrap(), 6);
        assert!(a.next().await.is_none());
        assert!(b.next().await.is_none());
    }

    #[test]
    fn blocking_iter_drains() {
        let core = drained_core(&[9, 8, 7]);
        let iter = ResultIter::new(core as Arc<dyn SlotLookup<u32, String>>);
        let values: Vec<u32> = iter.map(Result::unwrap).collect();
        assert_eq!(values, vec![9, 8, 7]);
    }

    #[tokio::test]
    async fn error_is_yielded_once_then_fused() {
        let core = Arc::new(PoolCore::<u32, u32, String>::new(
            ResultOrder::Completion,
            CapPolicy::Unbounded,
        ));
        core.add([1]).unwrap();
        core.fail(PoolError::Cancelled);

        let mut stream = ResultStream::new(core as Arc<dyn SlotLookup<u32, String>>);
        assert!(matches!(
            stream.next().await,
            Some(Err(PoolError::Cancelled))
        ));
        assert!(stream.next().await.is_none());
    }
}
