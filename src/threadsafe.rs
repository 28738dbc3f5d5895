//! Blocking ring buffer for any number of producers and consumers.
//!
//! # Design
//! - One mutex guards both counters *and* the slots, so a waiter always sees a
//!   consistent `(written, read)` pair and a slot is never touched outside it.
//! - Suspension uses condition variables; the guard condition is re-checked
//!   after every wake-up.
//! - `written` and `read` only ever grow. The next slot to write is
//!   `written % capacity`, the next slot to read is `read % capacity`.
//!
//! # Wake policies
//! - [`WakePolicy::Selective`] (default): two condition variables. A successful
//!   `put` wakes one reader, a successful `get` wakes one writer.
//! - [`WakePolicy::Broadcast`]: a single condition variable. Every successful
//!   operation wakes every waiter, readers and writers alike.
//!
//! Both give the same observable behaviour. Selective avoids thundering herds
//! under contention.

use std::sync::Arc;

use crate::cancel::{CancelToken, Wake};
use crate::sync::{self, Condvar, Mutex, MutexGuard, UnsafeCell};
use crate::{Cancelled, CapacityError, RingBuffer};

/// How waiters are woken after a successful operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WakePolicy {
    /// Separate "readable"/"writable" conditions, one waiter signalled per
    /// operation.
    #[default]
    Selective,
    /// A single condition, all waiters signalled on every operation.
    Broadcast,
}

/// Snapshot of the buffer's monotonic counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counters {
    /// Values successfully written since construction.
    pub written: u64,
    /// Values successfully read since construction.
    pub read: u64,
}

impl Counters {
    /// Number of unread values.
    #[inline]
    pub fn len(&self) -> usize {
        (self.written - self.read) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.written == self.read
    }
}

/// Construction-time configuration for [`BoundedRingBuffer`].
///
/// ```
/// use blocking_ringbuffer::{Builder, WakePolicy};
///
/// let buffer = Builder::new(16)
///     .wake_policy(WakePolicy::Broadcast)
///     .build::<u64>()
///     .unwrap();
/// assert_eq!(buffer.capacity(), 16);
/// assert_eq!(buffer.wake_policy(), WakePolicy::Broadcast);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Builder {
    capacity: usize,
    policy: WakePolicy,
}

impl Builder {
    pub fn new(capacity: usize) -> Self {
        Builder {
            capacity,
            policy: WakePolicy::default(),
        }
    }

    pub fn wake_policy(mut self, policy: WakePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Build the buffer.
    ///
    /// Fails with [`CapacityError::Zero`] if the capacity is zero.
    pub fn build<T: Send>(self) -> Result<BoundedRingBuffer<T>, CapacityError> {
        if self.capacity == 0 {
            return Err(CapacityError::Zero);
        }

        let slots = (0..self.capacity).map(|_| UnsafeCell::new(None)).collect();

        Ok(BoundedRingBuffer {
            monitor: Arc::new(Monitor {
                counters: Mutex::new(Counters { written: 0, read: 0 }),
                readable: Condvar::new(),
                writable: Condvar::new(),
                policy: self.policy,
            }),
            capacity: self.capacity,
            slots,
        })
    }
}

/// The lock, counters and conditions of a buffer.
///
/// Kept apart from the slots so a [`CancelToken`] can hold on to it without
/// knowing the element type.
struct Monitor {
    counters: Mutex<Counters>,
    /// Signalled when a value becomes available. Under
    /// [`WakePolicy::Broadcast`] every waiter uses this one.
    readable: Condvar,
    /// Signalled when a slot becomes free.
    writable: Condvar,
    policy: WakePolicy,
}

impl Monitor {
    #[inline]
    fn readable(&self) -> &Condvar {
        &self.readable
    }

    #[inline]
    fn writable(&self) -> &Condvar {
        match self.policy {
            WakePolicy::Selective => &self.writable,
            WakePolicy::Broadcast => &self.readable,
        }
    }

    /// Called after a successful `put`.
    #[inline]
    fn notify_written(&self) {
        match self.policy {
            WakePolicy::Selective => self.readable.notify_one(),
            WakePolicy::Broadcast => self.readable.notify_all(),
        }
    }

    /// Called after a successful `get`.
    #[inline]
    fn notify_read(&self) {
        match self.policy {
            WakePolicy::Selective => self.writable.notify_one(),
            WakePolicy::Broadcast => self.readable.notify_all(),
        }
    }
}

impl Wake for Monitor {
    fn wake(&self) {
        // Holding the lock while notifying closes the window between a
        // waiter's cancellation check and its suspension.
        let _counters = sync::lock(&self.counters);
        self.readable.notify_all();
        self.writable.notify_all();
    }
}

/// A fixed-capacity FIFO ring buffer with blocking, cancellable `put`/`get`.
///
/// Share it between threads with an `Arc` (or use [`new`] for split handles).
/// Values are delivered in the order their `put` calls committed; there is no
/// fairness between threads waiting on the same condition.
pub struct BoundedRingBuffer<T> {
    monitor: Arc<Monitor>,
    capacity: usize,
    /// Only accessed while holding `monitor.counters`.
    slots: Box<[UnsafeCell<Option<T>>]>,
}

// SAFETY: every slot access goes through `commit_put`/`commit_get`, which take
// the counters guard as proof that the lock is held.
unsafe impl<T: Send> Sync for BoundedRingBuffer<T> {}

impl<T: Send> BoundedRingBuffer<T> {
    /// Create a buffer holding up to `capacity` values with the default
    /// [`WakePolicy`].
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        Self::with_policy(capacity, WakePolicy::default())
    }

    /// Like [`new`](Self::new), but reports a zero capacity as an error.
    pub fn try_new(capacity: usize) -> Result<Self, CapacityError> {
        Builder::new(capacity).build()
    }

    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn with_policy(capacity: usize, policy: WakePolicy) -> Self {
        match Builder::new(capacity).wake_policy(policy).build() {
            Ok(buffer) => buffer,
            Err(err) => panic!("{}", err),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn wake_policy(&self) -> WakePolicy {
        self.monitor.policy
    }

    /// Snapshot of the write/read counters.
    pub fn counters(&self) -> Counters {
        *self.lock()
    }

    /// Number of unread values. Stale as soon as it returns.
    pub fn len(&self) -> usize {
        self.counters().len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity
    }

    /// Store `value` in the next free slot, waiting while the buffer is full.
    ///
    /// Returns [`Cancelled`] if `cancel` is cancelled while waiting; the value
    /// is then dropped and the buffer is unchanged. A call that finds a free
    /// slot succeeds even if `cancel` was already cancelled.
    pub fn put(&self, value: T, cancel: &CancelToken) -> Result<(), Cancelled> {
        let mut counters = self.lock();
        if self.full(&counters) {
            counters = self.wait_while(counters, self.monitor.writable(), cancel, |c| {
                self.full(c)
            })?;
        }

        self.commit_put(&mut counters, value);
        drop(counters);
        self.monitor.notify_written();
        Ok(())
    }

    /// Remove and return the oldest value, waiting while the buffer is empty.
    ///
    /// Returns [`Cancelled`] if `cancel` is cancelled while waiting; the
    /// buffer is then unchanged.
    pub fn get(&self, cancel: &CancelToken) -> Result<T, Cancelled> {
        let mut counters = self.lock();
        if counters.is_empty() {
            counters = self.wait_while(counters, self.monitor.readable(), cancel, Counters::is_empty)?;
        }

        let value = self.commit_get(&mut counters);
        drop(counters);
        self.monitor.notify_read();
        Ok(value)
    }

    /// Store `value` if a slot is free, otherwise hand it back.
    pub fn try_put(&self, value: T) -> Result<(), T> {
        let mut counters = self.lock();
        if self.full(&counters) {
            return Err(value);
        }

        self.commit_put(&mut counters, value);
        drop(counters);
        self.monitor.notify_written();
        Ok(())
    }

    /// Remove the oldest value if there is one.
    pub fn try_get(&self) -> Option<T> {
        let mut counters = self.lock();
        if counters.is_empty() {
            return None;
        }

        let value = self.commit_get(&mut counters);
        drop(counters);
        self.monitor.notify_read();
        Some(value)
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, Counters> {
        sync::lock(&self.monitor.counters)
    }

    #[inline]
    fn full(&self, counters: &Counters) -> bool {
        counters.len() == self.capacity
    }

    /// Suspend on `cv` until `blocked` turns false or `cancel` fires.
    ///
    /// The token is registered for the whole wait so `cancel` can wake us.
    /// Cancellation is only honoured while still blocked, so a wake-up that
    /// brings both data and cancellation proceeds with the data.
    fn wait_while<'a>(
        &'a self,
        mut counters: MutexGuard<'a, Counters>,
        cv: &Condvar,
        cancel: &CancelToken,
        blocked: impl Fn(&Counters) -> bool,
    ) -> Result<MutexGuard<'a, Counters>, Cancelled> {
        let _registration = cancel.register(self.monitor.clone());
        while blocked(&counters) {
            if cancel.is_cancelled() {
                return Err(Cancelled);
            }
            counters = sync::wait(cv, counters);
        }
        Ok(counters)
    }

    fn commit_put(&self, counters: &mut MutexGuard<'_, Counters>, value: T) {
        debug_assert!(counters.len() < self.capacity);
        // SAFETY: we hold the lock (`counters`), and the slot at `written` is
        // not among the `written - read` unread ones, so nobody else sees it.
        self.slot(counters.written).with_mut(|slot| unsafe {
            debug_assert!((*slot).is_none());
            *slot = Some(value);
        });
        counters.written += 1;
    }

    fn commit_get(&self, counters: &mut MutexGuard<'_, Counters>) -> T {
        debug_assert!(!counters.is_empty());
        // SAFETY: we hold the lock, and the slot at `read` holds the oldest
        // unread value written under the same lock.
        let value = self.slot(counters.read).with_mut(|slot| unsafe { (*slot).take() });
        counters.read += 1;
        match value {
            Some(value) => value,
            None => unreachable!("slot {} of an unread value is empty", counters.read - 1),
        }
    }

    #[inline]
    fn slot(&self, count: u64) -> &UnsafeCell<Option<T>> {
        &self.slots[(count % self.capacity as u64) as usize]
    }
}

impl<T: Send> RingBuffer<T> for BoundedRingBuffer<T> {
    fn put(&self, value: T, cancel: &CancelToken) -> Result<(), Cancelled> {
        BoundedRingBuffer::put(self, value, cancel)
    }

    fn get(&self, cancel: &CancelToken) -> Result<T, Cancelled> {
        BoundedRingBuffer::get(self, cancel)
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> std::fmt::Debug for BoundedRingBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counters = *sync::lock(&self.monitor.counters);
        f.debug_struct("BoundedRingBuffer")
            .field("capacity", &self.capacity)
            .field("policy", &self.monitor.policy)
            .field("written", &counters.written)
            .field("read", &counters.read)
            .finish()
    }
}

/// Producing half of a shared buffer. Clone it for more producers.
pub struct RingBufferProducer<T> {
    inner: Arc<BoundedRingBuffer<T>>,
}

impl<T: Send> RingBufferProducer<T> {
    pub fn put(&self, value: T, cancel: &CancelToken) -> Result<(), Cancelled> {
        self.inner.put(value, cancel)
    }

    pub fn try_put(&self, value: T) -> Result<(), T> {
        self.inner.try_put(value)
    }
}

impl<T> Clone for RingBufferProducer<T> {
    fn clone(&self) -> Self {
        RingBufferProducer {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[doc(hidden)]
impl<T> From<Arc<BoundedRingBuffer<T>>> for RingBufferProducer<T> {
    fn from(inner: Arc<BoundedRingBuffer<T>>) -> Self {
        RingBufferProducer { inner }
    }
}

/// Consuming half of a shared buffer. Clone it for more consumers.
pub struct RingBufferConsumer<T> {
    inner: Arc<BoundedRingBuffer<T>>,
}

impl<T: Send> RingBufferConsumer<T> {
    pub fn get(&self, cancel: &CancelToken) -> Result<T, Cancelled> {
        self.inner.get(cancel)
    }

    pub fn try_get(&self) -> Option<T> {
        self.inner.try_get()
    }
}

impl<T> Clone for RingBufferConsumer<T> {
    fn clone(&self) -> Self {
        RingBufferConsumer {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[doc(hidden)]
impl<T> From<Arc<BoundedRingBuffer<T>>> for RingBufferConsumer<T> {
    fn from(inner: Arc<BoundedRingBuffer<T>>) -> Self {
        RingBufferConsumer { inner }
    }
}

/// Create a buffer of `capacity` and return its producer and consumer halves.
///
/// # Panics
/// Panics if `capacity` is zero.
pub fn new<T: Send>(capacity: usize) -> (RingBufferProducer<T>, RingBufferConsumer<T>) {
    let buffer = Arc::new(BoundedRingBuffer::new(capacity));

    (buffer.clone().into(), buffer.into())
}
