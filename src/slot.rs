//! Single-set, multi-await result cells.
//!
//! A [`Slot`] holds one outcome. It starts pending, is fulfilled exactly
//! once, and may be awaited by any number of consumers before or after the
//! value lands. Each waiter registers under its own key; dropping a waiter
//! unregisters only that key, so one abandoned consumer never disturbs the
//! others.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

enum State<V> {
    Pending { waiters: HashMap<u64, Waker> },
    Ready(V),
}

/// A one-shot broadcast cell for a single result.
pub(crate) struct Slot<V> {
    state: Mutex<State<V>>,
    next_key: AtomicU64,
}

impl<V: Clone> Slot<V> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::Pending {
                waiters: HashMap::new(),
            }),
            next_key: AtomicU64::new(0),
        })
    }

    /// Fast path for values known at lookup time.
    pub(crate) fn ready(value: V) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::Ready(value)),
            next_key: AtomicU64::new(0),
        })
    }

    /// Store the value and wake every registered waiter.
    ///
    /// # Panics
    /// Panics if the slot was already fulfilled. Slots are written exactly
    /// once; a second write is a bug in the caller.
    pub(crate) fn fulfil(&self, value: V) {
        let waiters = {
            let mut state = self.state.lock().unwrap();
            match &mut *state {
                State::Pending { waiters } => {
                    let drained = std::mem::take(waiters);
                    *state = State::Ready(value);
                    drained
                }
                State::Ready(_) => panic!("result slot fulfilled twice"),
            }
        };
        for waker in waiters.into_values() {
            waker.wake();
        }
    }

    pub(crate) fn is_ready(&self) -> bool {
        matches!(*self.state.lock().unwrap(), State::Ready(_))
    }

    pub(crate) fn subscribe(self: &Arc<Self>) -> SlotFuture<V> {
        SlotFuture {
            slot: Arc::clone(self),
            key: None,
        }
    }
}

/// One consumer's await on a [`Slot`].
///
/// The waiter key is allocated on first poll, under the slot lock, so
/// registration and removal cannot race. Dropping the future mid-wait
/// removes only this waiter.
pub(crate) struct SlotFuture<V> {
    slot: Arc<Slot<V>>,
    key: Option<u64>,
}

impl<V: Clone> Future for SlotFuture<V> {
    type Output = V;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<V> {
        let this = self.get_mut();
        let mut state = this.slot.state.lock().unwrap();
        match &mut *state {
            State::Ready(value) => {
                this.key = None;
                Poll::Ready(value.clone())
            }
            State::Pending { waiters } => {
                let key = *this
                    .key
                    .get_or_insert_with(|| this.slot.next_key.fetch_add(1, Ordering::Relaxed));
                waiters.insert(key, cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl<V> Drop for SlotFuture<V> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take()
            && let Ok(mut state) = self.slot.state.lock()
            && let State::Pending { waiters } = &mut *state
        {
            waiters.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn ready_slot_resolves_immediately() {
        let slot = Slot::ready(7_u32);
        assert!(slot.is_ready());
        assert_eq!(slot.subscribe().await, 7);
    }

    #[tokio::test]
    async fn fulfil_wakes_all_waiters() {
        let slot = Slot::<u32>::new();

        let a = tokio::spawn({
            let fut = slot.subscribe();
            async move { fut.await }
        });
        let b = tokio::spawn({
            let fut = slot.subscribe();
            async move { fut.await }
        });

        // Give both waiters a chance to park.
        tokio::time::sleep(Duration::from_millis(10)).await;
        slot.fulfil(42);

        assert_eq!(a.await.unwrap(), 42);
        assert_eq!(b.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn late_subscriber_sees_value() {
        let slot = Slot::<u32>::new();
        slot.fulfil(5);
        assert_eq!(slot.subscribe().await, 5);
    }

    #[tokio::test]
    async fn dropped_waiter_does_not_disturb_others() {
        let slot = Slot::<u32>::new();

        let keeper = tokio::spawn({
            let fut = slot.subscribe();
            async move { fut.await }
        });

        {
            let abandoned = slot.subscribe();
            // Poll once so the waiter registers, then drop it.
            let mut abandoned = Box::pin(abandoned);
            let _ = futures::poll!(abandoned.as_mut());
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
        slot.fulfil(9);
        assert_eq!(keeper.await.unwrap(), 9);
    }

    #[test]
    #[should_panic(expected = "fulfilled twice")]
    fn double_fulfil_panics() {
        let slot = Slot::<u32>::new();
        slot.fulfil(1);
        slot.fulfil(2);
    }
}
