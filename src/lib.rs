//! Bounded, blocking, cancellable ring buffers shared by any number of
//! producer and consumer threads.
//!
//! [`BoundedRingBuffer`] stores up to `capacity` values in a circular slot
//! array. [`put`](BoundedRingBuffer::put) blocks while the buffer is full and
//! [`get`](BoundedRingBuffer::get) blocks while it is empty. Either call can be
//! aborted from another thread through a [`CancelToken`], in which case it
//! returns [`Cancelled`] without having touched the buffer.
//!
//! ```
//! use blocking_ringbuffer::{BoundedRingBuffer, CancelToken};
//! use std::sync::Arc;
//! use std::thread;
//!
//! let buffer = Arc::new(BoundedRingBuffer::new(4));
//! let token = CancelToken::new();
//!
//! let producer = {
//!     let buffer = Arc::clone(&buffer);
//!     let token = token.clone();
//!     thread::spawn(move || {
//!         for i in 0..100 {
//!             buffer.put(i, &token).unwrap();
//!         }
//!     })
//! };
//!
//! let received: Vec<i32> = (0..100).map(|_| buffer.get(&token).unwrap()).collect();
//! producer.join().unwrap();
//! assert_eq!(received, (0..100).collect::<Vec<_>>());
//! ```
//!
//! # Backends
//! Every backend implements [`RingBuffer`], so the same test suite can drive
//! the ring buffer and the channel-backed [`reference::ChannelBuffer`] oracle.

use thiserror::Error;

pub mod cancel;
pub mod reference;
mod sync;
pub mod threadsafe;

pub use cancel::CancelToken;
pub use threadsafe::{BoundedRingBuffer, Builder, Counters, WakePolicy};

/// The wait of a blocking call was cancelled before it could proceed.
///
/// The call had no effect on the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation was cancelled while waiting")]
pub struct Cancelled;

/// Rejected buffer capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CapacityError {
    #[error("ring buffer capacity must be greater than zero")]
    Zero,
}

/// The blocking put/get capability shared by every buffer backend.
///
/// Both operations may block the calling thread. Both may end early with
/// [`Cancelled`] when `cancel` is cancelled while they wait, in which case the
/// operation did not take effect.
pub trait RingBuffer<T>: Send + Sync {
    /// Store `value`, waiting while the buffer is full.
    fn put(&self, value: T, cancel: &CancelToken) -> Result<(), Cancelled>;

    /// Remove and return the oldest value, waiting while the buffer is empty.
    fn get(&self, cancel: &CancelToken) -> Result<T, Cancelled>;

    /// Maximum number of values the buffer holds at once.
    fn capacity(&self) -> usize;
}
