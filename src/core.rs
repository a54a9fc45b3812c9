//! Pool core - the shared state machine behind every pool front.
//!
//! Coordinates three populations:
//! 1. Producers appending work items
//! 2. Workers pulling items under the concurrency cap
//! 3. Consumers awaiting result slots
//!
//! All mutable state sits behind a single mutex and every operation is
//! non-blocking: suspension happens only on slot futures and inside the
//! user's work, never in here. Result slots transition to ready exactly
//! once; success and sentinel writes happen under the pool mutex so the
//! transitions for any one slot are serialized, while `fail` collects the
//! still-pending slots under the mutex and rejects them after releasing
//! it. Results delivered before a failure stay readable by index.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::error::PoolError;
use crate::order::{OrderPolicy, ResultOrder};
use crate::slot::{Slot, SlotFuture};

/// Outcome stored in a result slot: a value, the end-of-results sentinel
/// (`Ok(None)`), or the pool's terminal error.
pub(crate) type SlotValue<T, E> = Result<Option<T>, PoolError<E>>;

/// Concurrency cap enforced by [`PoolCore::next_work`].
///
/// `Unbounded` is for drivers whose execution substrate is already bounded
/// (the sync driver's worker thread count).
#[derive(Clone, Copy)]
pub(crate) enum CapPolicy {
    Bounded(usize),
    Unbounded,
}

enum Phase<E> {
    /// Submissions accepted.
    Intake,
    /// No further submissions; `sentinel` is the end-of-results slot.
    Sealed { sentinel: usize },
    /// Terminal. Every current and future await sees this error.
    Failed(PoolError<E>),
}

struct CoreInner<W, T, E> {
    phase: Phase<E>,
    queue: VecDeque<W>,
    /// One slot per submitted item plus the trailing sentinel slot.
    slots: Vec<Arc<Slot<SlotValue<T, E>>>>,
    order: OrderPolicy,
    cap: CapPolicy,
}

/// Answer to a worker asking for something to run.
pub(crate) enum Dispatch<W> {
    /// Run this item and report back with the execution index.
    Run { work: W, execution: usize },
    /// Cap reached; retry after a completion frees capacity.
    Saturated,
    /// Nothing to hand out: queue empty, or the pool is failed.
    Drained,
}

/// Slot lookup capability handed to result iterators, so they need not
/// know the work item type of the core they read from.
pub(crate) trait SlotLookup<T, E>: Send + Sync {
    fn slot(&self, index: usize) -> SlotFuture<SlotValue<T, E>>;
}

pub(crate) struct PoolCore<W, T, E> {
    inner: Mutex<CoreInner<W, T, E>>,
}

impl<W, T: Clone, E> PoolCore<W, T, E> {
    pub(crate) fn new(order: ResultOrder, cap: CapPolicy) -> Self {
        Self {
            inner: Mutex::new(CoreInner {
                phase: Phase::Intake,
                queue: VecDeque::new(),
                // The sentinel candidate. Every submission pushes one more
                // slot, keeping the invariant slots.len() == submitted + 1.
                slots: vec![Slot::new()],
                order: OrderPolicy::new(order),
                cap,
            }),
        }
    }

    /// Append work items, allocating a pending result slot for each.
    ///
    /// Returns the number of items accepted. Submitting to a sealed pool is
    /// an error; submitting to a failed pool drops the items silently.
    pub(crate) fn add<I>(&self, items: I) -> Result<usize, PoolError<E>>
    where
        I: IntoIterator<Item = W>,
    {
        let mut inner = self.inner.lock().unwrap();
        match inner.phase {
            Phase::Intake => {
                let mut added = 0;
                for item in items {
                    inner.queue.push_back(item);
                    inner.slots.push(Slot::new());
                    added += 1;
                }
                tracing::trace!(added, queued = inner.queue.len(), "work accepted");
                Ok(added)
            }
            Phase::Sealed { .. } => Err(PoolError::IntakeClosed),
            Phase::Failed(_) => {
                tracing::debug!("submission dropped, pool already failed");
                Ok(0)
            }
        }
    }

    /// Hand out the next work item if the cap allows.
    pub(crate) fn next_work(&self) -> Dispatch<W> {
        let mut inner = self.inner.lock().unwrap();
        if let Phase::Failed(_) = inner.phase {
            return Dispatch::Drained;
        }
        if let CapPolicy::Bounded(limit) = inner.cap
            && inner.order.in_flight() >= limit
        {
            return Dispatch::Saturated;
        }
        match inner.queue.pop_front() {
            Some(work) => {
                let execution = inner.order.add_execution();
                tracing::trace!(execution, in_flight = inner.order.in_flight(), "work dispatched");
                Dispatch::Run { work, execution }
            }
            None => Dispatch::Drained,
        }
    }

    /// Record a successful outcome for an execution.
    ///
    /// Discarded without effect when the pool has failed; the terminal
    /// error has already been broadcast.
    pub(crate) fn complete(&self, execution: usize, value: T) {
        let mut inner = self.inner.lock().unwrap();
        if let Phase::Failed(_) = inner.phase {
            tracing::trace!(execution, "outcome discarded, pool failed");
            return;
        }
        let position = inner.order.result_position(execution);
        if let Phase::Sealed { sentinel } = inner.phase {
            debug_assert!(position < sentinel, "result would land in the sentinel slot");
        }
        tracing::trace!(execution, position, "work completed");
        inner.slots[position].fulfil(Ok(Some(value)));
    }

    /// Close intake and resolve the sentinel slot. Idempotent; no-op once
    /// failed.
    pub(crate) fn seal(&self) {
        let mut inner = self.inner.lock().unwrap();
        if !matches!(inner.phase, Phase::Intake) {
            return;
        }
        let sentinel = inner.slots.len() - 1;
        inner.phase = Phase::Sealed { sentinel };
        tracing::debug!(sentinel, "intake sealed");
        inner.slots[sentinel].fulfil(Ok(None));
    }

    /// Transition to the terminal failed state. The first error wins; the
    /// queue is purged and every still-pending slot is rejected with the
    /// error after the lock is released. Slots already fulfilled keep
    /// their values.
    pub(crate) fn fail(&self, error: PoolError<E>) {
        let pending = {
            let mut inner = self.inner.lock().unwrap();
            if let Phase::Failed(_) = inner.phase {
                return;
            }
            tracing::debug!(
                kind = error.kind(),
                dropped = inner.queue.len(),
                "pool entering failed state"
            );
            inner.queue.clear();
            inner.phase = Phase::Failed(error.clone());
            inner
                .slots
                .iter()
                .filter(|slot| !slot.is_ready())
                .map(Arc::clone)
                .collect::<Vec<_>>()
        };
        // Reject outside the pool mutex. The phase is Failed, so nothing
        // else can fulfil the collected slots.
        for slot in pending {
            slot.fulfil(Err(error.clone()));
        }
    }

    pub(crate) fn is_failed(&self) -> bool {
        matches!(self.inner.lock().unwrap().phase, Phase::Failed(_))
    }

    /// Future for the slot at `index`.
    ///
    /// Delivered results are never rescinded: on a failed pool an in-range
    /// lookup still finds the stored slot, which holds either its value or
    /// the rejection recorded by `fail`.
    pub(crate) fn slot(&self, index: usize) -> SlotFuture<SlotValue<T, E>> {
        let inner = self.inner.lock().unwrap();
        match inner.slots.get(index) {
            Some(slot) => slot.subscribe(),
            None => match &inner.phase {
                Phase::Failed(error) => Slot::ready(Err(error.clone())).subscribe(),
                // A cursor only runs past the end after the sentinel has
                // resolved, which requires a sealed pool.
                _ => Slot::ready(Ok(None)).subscribe(),
            },
        }
    }
}

impl<W, T, E> SlotLookup<T, E> for PoolCore<W, T, E>
where
    W: Send + 'static,
    T: Clone + Send + 'static,
    E: Send + Sync + 'static,
{
    fn slot(&self, index: usize) -> SlotFuture<SlotValue<T, E>> {
        PoolCore::slot(self, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestCore = PoolCore<u32, u32, String>;

    fn bounded(limit: usize, order: ResultOrder) -> TestCore {
        PoolCore::new(order, CapPolicy::Bounded(limit))
    }

    fn take_work(core: &TestCore) -> (u32, usize) {
        match core.next_work() {
            Dispatch::Run { work, execution } => (work, execution),
            _ => panic!("expected work"),
        }
    }

    #[test]
    fn cap_gates_dispatch() {
        let core = bounded(2, ResultOrder::Completion);
        core.add([10, 11, 12]).unwrap();

        let (w0, e0) = take_work(&core);
        let (_w1, _e1) = take_work(&core);
        assert!(matches!(core.next_work(), Dispatch::Saturated));

        core.complete(e0, w0);
        let (w2, _e2) = take_work(&core);
        assert_eq!(w2, 12);
        assert!(matches!(core.next_work(), Dispatch::Drained));
    }

    #[test]
    fn add_after_seal_is_rejected() {
        let core = bounded(1, ResultOrder::Completion);
        core.add([1]).unwrap();
        core.seal();
        assert!(matches!(core.add([2]), Err(PoolError::IntakeClosed)));
    }

    #[test]
    fn add_after_fail_is_dropped_silently() {
        let core = bounded(1, ResultOrder::Completion);
        core.fail(PoolError::Cancelled);
        assert_eq!(core.add([1]).unwrap(), 0);
    }

    #[test]
    fn seal_is_idempotent() {
        let core = bounded(1, ResultOrder::Completion);
        core.add([1]).unwrap();
        core.seal();
        core.seal();
    }

    #[tokio::test]
    async fn sealed_empty_pool_yields_end_immediately() {
        let core = bounded(1, ResultOrder::Completion);
        core.seal();
        assert_eq!(core.slot(0).await, Ok(None));
    }

    #[tokio::test]
    async fn completed_value_lands_in_slot() {
        let core = bounded(4, ResultOrder::Completion);
        core.add([7]).unwrap();
        let (work, execution) = take_work(&core);
        core.complete(execution, work * 10);
        assert_eq!(core.slot(0).await, Ok(Some(70)));
    }

    #[tokio::test]
    async fn fail_rejects_pending_slots_and_purges_queue() {
        crate::init_test_tracing();
        let core = bounded(1, ResultOrder::Completion);
        core.add([1, 2, 3]).unwrap();
        let (_w, _e) = take_work(&core);

        let pending = core.slot(1);
        core.fail(PoolError::Cancelled);

        assert!(matches!(pending.await, Err(PoolError::Cancelled)));
        assert!(matches!(core.next_work(), Dispatch::Drained));
        // Slots requested after the failure are ready-failed too, in range
        // or past the end.
        assert!(matches!(core.slot(2).await, Err(PoolError::Cancelled)));
        assert!(matches!(core.slot(99).await, Err(PoolError::Cancelled)));
        assert!(core.is_failed());
    }

    #[tokio::test]
    async fn delivered_results_survive_failure() {
        let core = bounded(2, ResultOrder::Completion);
        core.add([1, 2]).unwrap();
        let (w0, e0) = take_work(&core);
        core.complete(e0, w0);
        core.fail(PoolError::Cancelled);

        assert_eq!(core.slot(0).await, Ok(Some(1)));
        assert!(matches!(core.slot(1).await, Err(PoolError::Cancelled)));
    }

    #[test]
    fn complete_after_fail_is_discarded() {
        let core = bounded(1, ResultOrder::Completion);
        core.add([1]).unwrap();
        let (_w, execution) = take_work(&core);
        core.fail(PoolError::Cancelled);
        // Must not panic or resurrect a slot.
        core.complete(execution, 99);
    }

    #[test]
    fn fail_is_idempotent_first_error_wins() {
        let core = bounded(1, ResultOrder::Completion);
        core.fail(PoolError::Work(std::sync::Arc::new("first".to_string())));
        core.fail(PoolError::Cancelled);

        match futures::executor::block_on(core.slot(0)) {
            Err(PoolError::Work(e)) => assert_eq!(*e, "first"),
            other => panic!("expected first error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn past_the_end_on_sealed_pool_is_end() {
        let core = bounded(1, ResultOrder::Completion);
        core.add([1]).unwrap();
        let (w, e) = take_work(&core);
        core.complete(e, w);
        core.seal();
        assert_eq!(core.slot(5).await, Ok(None));
    }
}
