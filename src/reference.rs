//! Reference backend built on a general-purpose bounded channel.
//!
//! [`ChannelBuffer`] is not a ring buffer: it delegates storage and blocking
//! to `crossbeam_channel::bounded`. It exists as an oracle for the shared test
//! suite, which must pass against it and [`BoundedRingBuffer`] alike.
//!
//! [`BoundedRingBuffer`]: crate::BoundedRingBuffer

use crossbeam_channel::{select, Receiver, Sender, TryRecvError, TrySendError};

use crate::{CancelToken, Cancelled, CapacityError, RingBuffer};

pub struct ChannelBuffer<T> {
    sender: Sender<T>,
    receiver: Receiver<T>,
    capacity: usize,
}

impl<T: Send> ChannelBuffer<T> {
    /// # Panics
    /// Panics if `capacity` is zero. A zero-capacity crossbeam channel is a
    /// rendezvous channel, which has different blocking behaviour.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be greater than zero");
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        ChannelBuffer {
            sender,
            receiver,
            capacity,
        }
    }

    pub fn try_new(capacity: usize) -> Result<Self, CapacityError> {
        if capacity == 0 {
            return Err(CapacityError::Zero);
        }
        Ok(Self::new(capacity))
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn put(&self, value: T, cancel: &CancelToken) -> Result<(), Cancelled> {
        // Try first: `select!` picks randomly among ready arms, and a free
        // slot must win over an already-cancelled token.
        let value = match self.sender.try_send(value) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Full(value)) | Err(TrySendError::Disconnected(value)) => value,
        };

        select! {
            send(self.sender, value) -> res => match res {
                Ok(()) => Ok(()),
                Err(_) => unreachable!("buffer owns both ends of its channel"),
            },
            recv(cancel.signal()) -> _ => Err(Cancelled),
        }
    }

    pub fn get(&self, cancel: &CancelToken) -> Result<T, Cancelled> {
        match self.receiver.try_recv() {
            Ok(value) => return Ok(value),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {}
        }

        select! {
            recv(self.receiver) -> msg => match msg {
                Ok(value) => Ok(value),
                Err(_) => unreachable!("buffer owns both ends of its channel"),
            },
            recv(cancel.signal()) -> _ => Err(Cancelled),
        }
    }
}

impl<T: Send> RingBuffer<T> for ChannelBuffer<T> {
    fn put(&self, value: T, cancel: &CancelToken) -> Result<(), Cancelled> {
        ChannelBuffer::put(self, value, cancel)
    }

    fn get(&self, cancel: &CancelToken) -> Result<T, Cancelled> {
        ChannelBuffer::get(self, cancel)
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}
