//! Bounded single-producer/single-consumer handoff queue.
//!
//! Exactly one application worker pushes committed log records and exactly
//! one paired validator pops them. The release store of the producer index
//! is the fence that publishes the record body to the consumer.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::log::LogHead;

pub const LOG_QUEUE_CAPACITY: usize = 2048;

/// Keeps producer and consumer counters on separate cache lines.
#[repr(align(64))]
pub(crate) struct CachePadded<T>(pub T);

pub struct SpscQueue<T: Copy, const CAPACITY: usize> {
    head: CachePadded<AtomicUsize>,
    tail: CachePadded<AtomicUsize>,
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

// Safety: the single-producer/single-consumer discipline means a slot is only
// written between the head handshake and only read between the tail
// handshake; the indices provide the release/acquire edges.
unsafe impl<T: Copy, const CAPACITY: usize> Send for SpscQueue<T, CAPACITY> {}
unsafe impl<T: Copy, const CAPACITY: usize> Sync for SpscQueue<T, CAPACITY> {}

impl<T: Copy, const CAPACITY: usize> SpscQueue<T, CAPACITY> {
    pub fn new() -> Self {
        const { assert!(CAPACITY > 0 && CAPACITY & (CAPACITY - 1) == 0) };
        let slots = (0..CAPACITY)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect();
        Self {
            head: CachePadded(AtomicUsize::new(0)),
            tail: CachePadded(AtomicUsize::new(0)),
            slots,
        }
    }

    /// Returns false when the ring is full; the producer is expected to spin.
    pub fn push(&self, value: T) -> bool {
        let head = self.head.0.load(Ordering::Relaxed);
        let tail = self.tail.0.load(Ordering::Acquire);
        if head.wrapping_sub(tail) >= CAPACITY {
            return false;
        }
        unsafe { (*self.slots[head & (CAPACITY - 1)].get()).write(value) };
        self.head.0.store(head.wrapping_add(1), Ordering::Release);
        true
    }

    pub fn pop(&self) -> Option<T> {
        let tail = self.tail.0.load(Ordering::Relaxed);
        let head = self.head.0.load(Ordering::Acquire);
        if tail == head {
            return None;
        }
        let value = unsafe { (*self.slots[tail & (CAPACITY - 1)].get()).assume_init() };
        self.tail.0.store(tail.wrapping_add(1), Ordering::Release);
        Some(value)
    }

    pub fn is_empty(&self) -> bool {
        let tail = self.tail.0.load(Ordering::Relaxed);
        let head = self.head.0.load(Ordering::Acquire);
        tail == head
    }

    pub fn len(&self) -> usize {
        let tail = self.tail.0.load(Ordering::Relaxed);
        let head = self.head.0.load(Ordering::Acquire);
        head.wrapping_sub(tail)
    }

    pub const fn capacity(&self) -> usize {
        CAPACITY
    }
}

impl<T: Copy, const CAPACITY: usize> Default for SpscQueue<T, CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) type LogQueue = SpscQueue<*mut LogHead, LOG_QUEUE_CAPACITY>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn fills_to_capacity_and_drains_in_order() {
        let q: SpscQueue<usize, 8> = SpscQueue::new();
        for i in 0..8 {
            assert!(q.push(i));
        }
        assert!(!q.push(99));
        assert_eq!(q.len(), 8);
        for i in 0..8 {
            assert_eq!(q.pop(), Some(i));
        }
        assert_eq!(q.pop(), None);
        assert!(q.is_empty());
    }

    #[test]
    fn wraps_around() {
        let q: SpscQueue<u32, 4> = SpscQueue::new();
        for round in 0..100u32 {
            assert!(q.push(round));
            assert_eq!(q.pop(), Some(round));
        }
    }

    #[test]
    fn cross_thread_fifo_no_loss_no_dup() {
        const N: u64 = 200_000;
        let q: Arc<SpscQueue<u64, 256>> = Arc::new(SpscQueue::new());

        let producer = {
            let q = Arc::clone(&q);
            std::thread::spawn(move || {
                for i in 0..N {
                    while !q.push(i) {
                        std::hint::spin_loop();
                    }
                }
            })
        };

        let mut expected = 0u64;
        while expected < N {
            if let Some(v) = q.pop() {
                assert_eq!(v, expected);
                expected += 1;
            } else {
                std::hint::spin_loop();
            }
        }
        producer.join().unwrap();
        assert!(q.is_empty());
    }
}
