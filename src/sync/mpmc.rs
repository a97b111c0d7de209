//! Bounded multi-producer multi-consumer queue (Vyukov's ring buffer).
//!
//! Backs the global job queue. Capacity must be a power of two; each cell
//! carries its own sequence counter so producers and consumers never need
//! to coordinate through a single shared lock.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicUsize, Ordering};

struct Cell<T> {
    sequence: AtomicUsize,
    data: UnsafeCell<MaybeUninit<T>>,
}

pub struct MpmcQueue<T> {
    mask: usize,
    buffer: Box<[Cell<T>]>,
    enqueue_pos: AtomicUsize,
    dequeue_pos: AtomicUsize,
}

unsafe impl<T: Send> Send for MpmcQueue<T> {}
unsafe impl<T: Send> Sync for MpmcQueue<T> {}

#[derive(Debug, PartialEq, Eq)]
pub struct PushError<T>(pub T);

impl<T> MpmcQueue<T> {
    /// `capacity` is rounded up to the next power of two (minimum 2).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2).next_power_of_two();
        let buffer: Box<[Cell<T>]> = (0..capacity)
            .map(|i| Cell {
                sequence: AtomicUsize::new(i),
                data: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect();

        Self {
            mask: capacity - 1,
            buffer,
            enqueue_pos: AtomicUsize::new(0),
            dequeue_pos: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Attempts to enqueue `value`. Returns it back on failure (queue full).
    pub fn push(&self, value: T) -> Result<(), PushError<T>> {
        let mut pos = self.enqueue_pos.load(Ordering::Relaxed);
        loop {
            let cell = &self.buffer[pos & self.mask];
            let seq = cell.sequence.load(Ordering::Acquire);
            let diff = seq as isize - pos as isize;

            if diff == 0 {
                if self
                    .enqueue_pos
                    .compare_exchange_weak(pos, pos + 1, Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
                {
                    unsafe { (*cell.data.get()).write(value) };
                    cell.sequence.store(pos + 1, Ordering::Release);
                    return Ok(());
                }
                pos = self.enqueue_pos.load(Ordering::Relaxed);
            } else if diff < 0 {
                return Err(PushError(value));
            } else {
                pos = self.enqueue_pos.load(Ordering::Relaxed);
            }
        }
    }

    /// Attempts to dequeue a value. Returns `None` if the queue is empty.
    pub fn pop(&self) -> Option<T> {
        let mut pos = self.dequeue_pos.load(Ordering::Relaxed);
        loop {
            let cell = &self.buffer[pos & self.mask];
            let seq = cell.sequence.load(Ordering::Acquire);
            let diff = seq as isize - (pos as isize + 1);

            if diff == 0 {
                if self
                    .dequeue_pos
                    .compare_exchange_weak(pos, pos + 1, Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
                {
                    let value = unsafe { (*cell.data.get()).assume_init_read() };
                    cell.sequence.store(pos + self.mask + 1, Ordering::Release);
                    return Some(value);
                }
                pos = self.dequeue_pos.load(Ordering::Relaxed);
            } else if diff < 0 {
                return None;
            } else {
                pos = self.dequeue_pos.load(Ordering::Relaxed);
            }
        }
    }
}

impl<T> Drop for MpmcQueue<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::vec::Vec;

    #[test]
    fn rounds_capacity_to_power_of_two() {
        let q: MpmcQueue<u8> = MpmcQueue::new(5);
        assert_eq!(q.capacity(), 8);
    }

    #[test]
    fn push_pop_fifo_single_threaded() {
        let q = MpmcQueue::new(4);
        assert!(q.push(1).is_ok());
        assert!(q.push(2).is_ok());
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn rejects_push_when_full() {
        let q = MpmcQueue::new(2);
        assert!(q.push(1).is_ok());
        assert!(q.push(2).is_ok());
        assert_eq!(q.push(3), Err(PushError(3)));
    }

    #[test]
    fn concurrent_producers_and_consumers_preserve_total() {
        let q = Arc::new(MpmcQueue::new(1024));
        let producers = 4;
        let per_producer = 20_000;
        let total = producers * per_producer;

        let push_handles: Vec<_> = (0..producers)
            .map(|p| {
                let q = Arc::clone(&q);
                thread::spawn(move || {
                    for i in 0..per_producer {
                        let v = p * per_producer + i;
                        while q.push(v).is_err() {
                            std::thread::yield_now();
                        }
                    }
                })
            })
            .collect();

        let consumed = Arc::new(AtomicUsize::new(0));
        let remaining = Arc::new(AtomicUsize::new(total));
        let pop_handles: Vec<_> = (0..producers)
            .map(|_| {
                let q = Arc::clone(&q);
                let consumed = Arc::clone(&consumed);
                let remaining = Arc::clone(&remaining);
                thread::spawn(move || {
                    while remaining.load(Ordering::Relaxed) > 0 {
                        if q.pop().is_some() {
                            consumed.fetch_add(1, Ordering::Relaxed);
                            remaining.fetch_sub(1, Ordering::Relaxed);
                        } else {
                            std::thread::yield_now();
                        }
                    }
                })
            })
            .collect();

        for h in push_handles {
            h.join().unwrap();
        }
        for h in pop_handles {
            h.join().unwrap();
        }

        assert_eq!(consumed.load(Ordering::Relaxed), total);
        assert_eq!(q.pop(), None);
    }
}
