//! Shared harness for the integration tests.

#![allow(dead_code, unused_macros)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use blocking_ringbuffer::reference::ChannelBuffer;
use blocking_ringbuffer::{BoundedRingBuffer, RingBuffer, WakePolicy};

/// Runs closures on timer threads at a fixed instant.
///
/// A task that returns `Err` marks the scheduler as failed; [`finish`]
/// joins every task and panics if any of them failed or panicked.
///
/// [`finish`]: Scheduler::finish
#[derive(Default)]
pub struct Scheduler {
    tasks: Vec<JoinHandle<()>>,
    failed: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` no earlier than `delay` from now. Returns that instant.
    pub fn schedule<F>(&mut self, delay: Duration, task: F) -> Instant
    where
        F: FnOnce() -> Result<(), String> + Send + 'static,
    {
        let at = Instant::now() + delay;
        let failed = Arc::clone(&self.failed);
        self.tasks.push(thread::spawn(move || {
            let now = Instant::now();
            if at > now {
                thread::sleep(at - now);
            }
            if let Err(err) = task() {
                eprintln!("background task failed: {}", err);
                failed.store(true, Ordering::SeqCst);
            }
        }));
        at
    }

    pub fn finish(self) {
        for task in self.tasks {
            if task.join().is_err() {
                self.failed.store(true, Ordering::SeqCst);
            }
        }
        assert!(!self.failed.load(Ordering::SeqCst), "a background task failed");
    }
}

/// The backends every contract test runs against.
pub fn selective<T: Send + 'static>(capacity: usize) -> Arc<dyn RingBuffer<T>> {
    Arc::new(BoundedRingBuffer::with_policy(capacity, WakePolicy::Selective))
}

pub fn broadcast<T: Send + 'static>(capacity: usize) -> Arc<dyn RingBuffer<T>> {
    Arc::new(BoundedRingBuffer::with_policy(capacity, WakePolicy::Broadcast))
}

pub fn channel<T: Send + 'static>(capacity: usize) -> Arc<dyn RingBuffer<T>> {
    Arc::new(ChannelBuffer::new(capacity))
}

/// Instantiate a generic test function once per backend.
///
/// ```ignore
/// backends!(get_blocks_if_empty);
/// ```
/// expands to a module `get_blocks_if_empty` with one `#[test]` per backend,
/// each calling `get_blocks_if_empty(common::<backend>)`.
macro_rules! backends {
    ($($name:ident),* $(,)?) => {
        $(
            mod $name {
                #[test]
                fn selective() {
                    super::$name(crate::common::selective);
                }

                #[test]
                fn broadcast() {
                    super::$name(crate::common::broadcast);
                }

                #[test]
                fn channel() {
                    super::$name(crate::common::channel);
                }
            }
        )*
    };
}
