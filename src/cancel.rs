//! Cooperative cancellation of blocked `put`/`get` calls.
//!
//! A [`CancelToken`] is handed to every blocking call. Cancelling it from any
//! thread wakes every call currently suspended with that token (or a clone of
//! it), and makes every later call that would have to suspend return
//! [`Cancelled`](crate::Cancelled) straight away.
//!
//! # Wake-up protocol
//! A waiter registers a [`Wake`] handle with the token while holding its
//! buffer's lock, then checks [`CancelToken::is_cancelled`] and suspends.
//! `cancel` sets the flag first and only then collects the registered
//! handles. Both sides go through the registry lock, so either the waiter sees
//! the flag, or `cancel` sees the registration and wakes the waiter through
//! the buffer's lock (which it cannot take until the waiter is suspended).

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use crate::sync::{self, AtomicBool, AtomicU64, Mutex, Ordering};

/// Something parked on a condition variable that `cancel` must wake.
pub(crate) trait Wake: Send + Sync {
    fn wake(&self);
}

/// A shareable cancellation flag for blocking buffer operations.
///
/// Clones share state: cancelling any clone cancels them all. Cancellation is
/// permanent; use a fresh token for the next batch of calls.
///
/// ```
/// use blocking_ringbuffer::{BoundedRingBuffer, CancelToken, Cancelled};
/// use std::thread;
///
/// let buffer = BoundedRingBuffer::<u32>::new(1);
/// let token = CancelToken::new();
///
/// let canceller = token.clone();
/// let handle = thread::spawn(move || canceller.cancel());
///
/// // Empty buffer: `get` blocks until the token is cancelled.
/// assert_eq!(buffer.get(&token), Err(Cancelled));
/// handle.join().unwrap();
/// ```
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

struct Inner {
    cancelled: AtomicBool,
    next_id: AtomicU64,
    waiters: Mutex<HashMap<u64, Arc<dyn Wake>>>,
    /// Dropped on cancel, which disconnects `signal`.
    trigger: Mutex<Option<Sender<()>>>,
    signal: Receiver<()>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (trigger, signal) = crossbeam_channel::bounded(0);
        CancelToken {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                next_id: AtomicU64::new(0),
                waiters: Mutex::new(HashMap::new()),
                trigger: Mutex::new(Some(trigger)),
                signal,
            }),
        }
    }

    /// Cancel the token and wake every call blocked on it. Idempotent.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }

        drop(sync::lock(&self.inner.trigger).take());

        // Collect first: `wake` takes a buffer lock, and a waiter holding
        // that buffer lock may be trying to register with us.
        let waiters: Vec<Arc<dyn Wake>> = sync::lock(&self.inner.waiters).values().cloned().collect();
        for waiter in waiters {
            waiter.wake();
        }
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Register `waker` until the returned guard is dropped.
    pub(crate) fn register(&self, waker: Arc<dyn Wake>) -> Registration<'_> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        sync::lock(&self.inner.waiters).insert(id, waker);
        Registration { token: self, id }
    }

    /// A receiver that becomes disconnected once the token is cancelled.
    ///
    /// Nothing is ever sent on it, so it is only useful as a
    /// `crossbeam_channel::select!` arm.
    pub(crate) fn signal(&self) -> &Receiver<()> {
        &self.inner.signal
    }

    #[cfg(test)]
    fn registered(&self) -> usize {
        sync::lock(&self.inner.waiters).len()
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        CancelToken::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

pub(crate) struct Registration<'a> {
    token: &'a CancelToken,
    id: u64,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        sync::lock(&self.token.inner.waiters).remove(&self.id);
    }
}
