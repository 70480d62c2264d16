//! Bounded outbound queue decoupling sample producers from the network
//! consumer.
//!
//! Producers enqueue without ever blocking; when the queue is full the
//! oldest retained message is evicted (drop-oldest). A single consumer
//! blocks on `dequeue` until a message arrives or the queue closes.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// An encoded message with its queue-assigned sequence number.
///
/// Sequence numbers increase strictly with enqueue order, so a collector
/// comparing them can detect gaps caused by drop-on-full.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    pub sequence: u64,
    pub payload: Vec<u8>,
}

/// Outcome of a non-blocking enqueue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueResult {
    /// Message admitted. `evicted` carries the sequence number dropped to
    /// make room, if the queue was full.
    Accepted {
        sequence: u64,
        evicted: Option<u64>,
    },
    /// Queue already closed; the payload was discarded.
    Closed,
}

#[derive(Debug)]
struct QueueInner {
    buf: VecDeque<WireMessage>,
    next_sequence: u64,
    enqueued: u64,
    dequeued: u64,
    dropped: u64,
    closed: bool,
}

/// Bounded FIFO with drop-oldest overflow, internally synchronized.
#[derive(Debug)]
pub struct OutboundQueue {
    inner: Mutex<QueueInner>,
    available: Condvar,
    capacity: usize,
}

impl OutboundQueue {
    /// Create a queue with the given capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(QueueInner {
                buf: VecDeque::with_capacity(capacity),
                next_sequence: 0,
                enqueued: 0,
                dequeued: 0,
                dropped: 0,
                closed: false,
            }),
            available: Condvar::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Admit a payload without blocking, stamping the next sequence number.
    ///
    /// If the queue is full, the oldest retained message is evicted first.
    pub fn enqueue(&self, payload: Vec<u8>) -> EnqueueResult {
        let mut inner = self.lock();
        if inner.closed {
            return EnqueueResult::Closed;
        }

        let mut evicted = None;
        if inner.buf.len() >= self.capacity {
            if let Some(oldest) = inner.buf.pop_front() {
                evicted = Some(oldest.sequence);
                inner.dropped += 1;
            }
        }

        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.enqueued += 1;
        inner.buf.push_back(WireMessage { sequence, payload });
        drop(inner);

        self.available.notify_one();
        EnqueueResult::Accepted { sequence, evicted }
    }

    /// Block until a message is available; `None` once the queue is closed
    /// and drained.
    pub fn dequeue(&self) -> Option<WireMessage> {
        let mut inner = self.lock();
        loop {
            if let Some(message) = inner.buf.pop_front() {
                inner.dequeued += 1;
                return Some(message);
            }
            if inner.closed {
                return None;
            }
            inner = self
                .available
                .wait(inner)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Wait up to `timeout`, returning early when the queue closes.
    ///
    /// Returns whether the queue is closed. Used by the consumer to make
    /// backoff sleeps cancellable by session teardown.
    pub fn wait_close(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.lock();
        while !inner.closed {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .available
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            inner = guard;
        }
        true
    }

    /// Close the queue, unblocking any pending dequeue. Idempotent.
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        drop(inner);
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Messages currently buffered.
    pub fn depth(&self) -> usize {
        self.lock().buf.len()
    }

    /// Messages evicted by the drop-oldest policy.
    pub fn dropped_count(&self) -> u64 {
        self.lock().dropped
    }

    /// Messages ever admitted.
    pub fn enqueued_count(&self) -> u64 {
        self.lock().enqueued
    }

    /// Messages handed to the consumer.
    pub fn dequeued_count(&self) -> u64 {
        self.lock().dequeued
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn payload(n: u8) -> Vec<u8> {
        vec![n]
    }

    #[test]
    fn test_fifo_order_preserved() {
        let queue = OutboundQueue::new(8);
        for n in 0..5u8 {
            queue.enqueue(payload(n));
        }
        for n in 0..5u8 {
            let message = queue.dequeue().expect("message");
            assert_eq!(message.payload, payload(n));
            assert_eq!(message.sequence, u64::from(n));
        }
    }

    #[test]
    fn test_drop_oldest_on_overflow() {
        let queue = OutboundQueue::new(2);
        queue.enqueue(payload(1));
        queue.enqueue(payload(2));
        let result = queue.enqueue(payload(3));

        assert_eq!(
            result,
            EnqueueResult::Accepted {
                sequence: 2,
                evicted: Some(0),
            }
        );
        assert_eq!(queue.dropped_count(), 1);
        assert_eq!(queue.dequeue().expect("message").payload, payload(2));
        assert_eq!(queue.dequeue().expect("message").payload, payload(3));
    }

    #[test]
    fn test_overflow_by_k_drops_exactly_k_oldest() {
        let queue = OutboundQueue::new(3);
        for n in 0..8u8 {
            queue.enqueue(payload(n));
        }
        assert_eq!(queue.dropped_count(), 5);
        assert_eq!(queue.depth(), 3);
        for n in 5..8u8 {
            assert_eq!(queue.dequeue().expect("message").payload, payload(n));
        }
    }

    #[test]
    fn test_counter_invariant_after_drain() {
        let queue = OutboundQueue::new(2);
        for n in 0..7u8 {
            queue.enqueue(payload(n));
        }
        queue.close();
        while queue.dequeue().is_some() {}
        assert_eq!(
            queue.enqueued_count() - queue.dropped_count(),
            queue.dequeued_count()
        );
    }

    #[test]
    fn test_sequences_strictly_increase() {
        let queue = OutboundQueue::new(2);
        let mut last = None;
        for n in 0..10u8 {
            if let EnqueueResult::Accepted { sequence, .. } = queue.enqueue(payload(n)) {
                if let Some(prev) = last {
                    assert!(sequence > prev);
                }
                last = Some(sequence);
            }
        }
    }

    #[test]
    fn test_close_unblocks_pending_dequeue() {
        let queue = Arc::new(OutboundQueue::new(4));
        let consumer_queue = queue.clone();
        let consumer = thread::spawn(move || consumer_queue.dequeue());

        // Let the consumer block, then close.
        thread::sleep(Duration::from_millis(50));
        queue.close();

        let result = consumer.join().expect("consumer thread");
        assert!(result.is_none());
    }

    #[test]
    fn test_dequeue_drains_after_close() {
        let queue = OutboundQueue::new(4);
        queue.enqueue(payload(1));
        queue.enqueue(payload(2));
        queue.close();

        assert!(queue.dequeue().is_some());
        assert!(queue.dequeue().is_some());
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn test_enqueue_after_close_is_rejected() {
        let queue = OutboundQueue::new(4);
        queue.close();
        assert_eq!(queue.enqueue(payload(1)), EnqueueResult::Closed);
        assert_eq!(queue.enqueued_count(), 0);
    }

    #[test]
    fn test_wait_close_times_out_while_open() {
        let queue = OutboundQueue::new(4);
        let start = Instant::now();
        assert!(!queue.wait_close(Duration::from_millis(50)));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_wait_close_returns_early_on_close() {
        let queue = Arc::new(OutboundQueue::new(4));
        let closer_queue = queue.clone();
        let closer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            closer_queue.close();
        });

        let start = Instant::now();
        assert!(queue.wait_close(Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(2));
        closer.join().expect("closer thread");
    }
}
