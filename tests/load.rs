//! Conservation under load: every value sent is received exactly once.
//!
//! Each producer and consumer keeps its own per-value tally, so the test adds
//! no synchronization of its own that could mask a broken buffer. When all
//! threads are done, the summed sent and received tallies must match.

#[macro_use]
mod common;

use std::sync::Arc;
use std::thread;

use blocking_ringbuffer::{CancelToken, Cancelled, RingBuffer};

type Make = fn(usize) -> Arc<dyn RingBuffer<i32>>;

const N_WORKERS: usize = 8;
const BUFFER_SIZE: usize = N_WORKERS / 2;
const N_ROUNDS: usize = 20_000;
const MAX_VALUE: usize = 50;

type Tally = [u64; MAX_VALUE];

fn produce(buffer: &dyn RingBuffer<i32>) -> Result<Tally, Cancelled> {
    let token = CancelToken::new();
    let mut sent = [0; MAX_VALUE];
    for i in 0..N_ROUNDS {
        let value = i % MAX_VALUE;
        buffer.put(value as i32, &token)?;
        sent[value] += 1;
    }
    Ok(sent)
}

fn consume(buffer: &dyn RingBuffer<i32>) -> Result<Tally, Cancelled> {
    let token = CancelToken::new();
    let mut received = [0; MAX_VALUE];
    for _ in 0..N_ROUNDS {
        let value = buffer.get(&token)?;
        received[value as usize] += 1;
    }
    Ok(received)
}

fn sum(tallies: impl IntoIterator<Item = Tally>) -> Tally {
    let mut total = [0; MAX_VALUE];
    for tally in tallies {
        for (t, n) in total.iter_mut().zip(tally) {
            *t += n;
        }
    }
    total
}

fn join_all(handles: Vec<thread::ScopedJoinHandle<'_, Result<Tally, Cancelled>>>) -> Vec<Tally> {
    handles
        .into_iter()
        .map(|h| h.join().expect("worker panicked").expect("worker was cancelled"))
        .collect()
}

fn sent_and_received_counts_match(make: Make) {
    let buffer = make(BUFFER_SIZE);
    let buffer: &dyn RingBuffer<i32> = &*buffer;

    let (sent, received) = thread::scope(|s| {
        let consumers: Vec<_> = (0..N_WORKERS)
            .map(move |_| s.spawn(move || consume(buffer)))
            .collect();
        let producers: Vec<_> = (0..N_WORKERS)
            .map(move |_| s.spawn(move || produce(buffer)))
            .collect();

        (sum(join_all(producers)), sum(join_all(consumers)))
    });

    assert_eq!(sent, received);
    assert_eq!(sent.iter().sum::<u64>(), (N_WORKERS * N_ROUNDS) as u64);
    assert_eq!(sent[0], (N_WORKERS * N_ROUNDS / MAX_VALUE) as u64);
    println!("{} values moved through a buffer of {}", sent.iter().sum::<u64>(), BUFFER_SIZE);
}

backends!(sent_and_received_counts_match);

#[test]
fn counters_satisfy_invariants_after_load() {
    use blocking_ringbuffer::{BoundedRingBuffer, Counters};

    let buffer = BoundedRingBuffer::<i32>::new(BUFFER_SIZE);
    thread::scope(|s| {
        for _ in 0..N_WORKERS {
            s.spawn(|| produce(&buffer).unwrap());
            s.spawn(|| consume(&buffer).unwrap());
        }
    });

    let total = (N_WORKERS * N_ROUNDS) as u64;
    assert_eq!(buffer.counters(), Counters { written: total, read: total });
    assert!(buffer.is_empty());
}
