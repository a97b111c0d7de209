//! Bounded, buffered channel between fibers: a fixed-capacity queue guarded
//! by a spin lock, with FIFO wait lists on both the producer and consumer
//! side. `put`/`get` park the calling fiber by enqueuing it and calling
//! `SpinLock::yield_while_held` rather than releasing the lock before the
//! switch, matching the lock-handoff shape of the original engine's
//! `_channel_get`/`_channel_put` jobs.
//!
//! Grounded directly in `channel.c`: `try_get`/`try_put` are the
//! non-blocking fast paths, `close` wakes every parked waiter so it can
//! observe the channel is done and stop blocking. A host thread outside
//! the fiber runtime (no wait slot can resume a non-fiber stack) falls
//! back to a bounded retry-spin instead of parking, mirroring
//! `future::Future::wait`'s same fallback.

use crate::fiber::worker;
use crate::sync::SpinLock;
use std::cell::UnsafeCell;
use std::collections::VecDeque;

struct State<T> {
    queue: VecDeque<T>,
    capacity: usize,
    closed: bool,
    senders_waiting: VecDeque<*mut crate::fiber::pool::Fiber>,
    receivers_waiting: VecDeque<*mut crate::fiber::pool::Fiber>,
}

/// A bounded queue of values shared between producer and consumer fibers.
pub struct Channel<T> {
    lock: SpinLock,
    state: UnsafeCell<State<T>>,
}

unsafe impl<T: Send> Send for Channel<T> {}
unsafe impl<T: Send> Sync for Channel<T> {}

impl<T> Channel<T> {
    /// Creates a channel holding up to `capacity` values (minimum 1 — this
    /// is a buffered channel, not a zero-capacity rendezvous).
    pub fn new(capacity: usize) -> Self {
        Self {
            lock: SpinLock::new(),
            state: UnsafeCell::new(State {
                queue: VecDeque::with_capacity(capacity.max(1)),
                capacity: capacity.max(1),
                closed: false,
                senders_waiting: VecDeque::new(),
                receivers_waiting: VecDeque::new(),
            }),
        }
    }

    /// Blocks until `value` is accepted into the channel. Returns `false`
    /// if the channel was already closed (the value is dropped).
    pub fn put(&self, value: T) -> bool {
        let mut value = value;
        loop {
            self.lock.lock();
            let state = unsafe { &mut *self.state.get() };
            if state.closed {
                self.lock.unlock();
                return false;
            }
            if state.queue.len() < state.capacity {
                state.queue.push_back(value);
                if let Some(r) = state.receivers_waiting.pop_front() {
                    unsafe { worker::ready(r) };
                }
                self.lock.unlock();
                return true;
            }

            let current = worker::this();
            if current.is_null() {
                self.lock.unlock();
                std::thread::yield_now();
                continue;
            }
            state.senders_waiting.push_back(current);
            unsafe { self.lock.yield_while_held() };
            // Woken because a consumer freed a slot (or the channel
            // closed); loop back around to recheck under a fresh lock.
        }
    }

    /// Blocks until a value is available. Returns `None` once the channel
    /// is closed and drained.
    pub fn get(&self) -> Option<T> {
        loop {
            self.lock.lock();
            let state = unsafe { &mut *self.state.get() };
            if let Some(v) = state.queue.pop_front() {
                if let Some(s) = state.senders_waiting.pop_front() {
                    unsafe { worker::ready(s) };
                }
                self.lock.unlock();
                return Some(v);
            }
            if state.closed {
                self.lock.unlock();
                return None;
            }

            let current = worker::this();
            if current.is_null() {
                self.lock.unlock();
                std::thread::yield_now();
                continue;
            }
            state.receivers_waiting.push_back(current);
            unsafe { self.lock.yield_while_held() };
        }
    }

    /// Non-blocking put: fails if the channel is full or closed.
    pub fn try_put(&self, value: T) -> Result<(), T> {
        self.lock.lock();
        let state = unsafe { &mut *self.state.get() };
        if state.closed {
            self.lock.unlock();
            return Err(value);
        }
        if state.queue.len() < state.capacity {
            state.queue.push_back(value);
            if let Some(r) = state.receivers_waiting.pop_front() {
                unsafe { worker::ready(r) };
            }
            self.lock.unlock();
            Ok(())
        } else {
            self.lock.unlock();
            Err(value)
        }
    }

    /// Non-blocking get: returns `None` if the channel is empty.
    pub fn try_get(&self) -> Option<T> {
        self.lock.lock();
        let state = unsafe { &mut *self.state.get() };
        let value = state.queue.pop_front();
        if value.is_some() {
            if let Some(s) = state.senders_waiting.pop_front() {
                unsafe { worker::ready(s) };
            }
        }
        self.lock.unlock();
        value
    }

    /// Marks the channel closed and wakes every parked waiter so it can
    /// observe the closure. Already-queued values remain gettable until
    /// drained.
    pub fn close(&self) {
        self.lock.lock();
        let state = unsafe { &mut *self.state.get() };
        state.closed = true;
        for f in state.senders_waiting.drain(..) {
            unsafe { worker::ready(f) };
        }
        for f in state.receivers_waiting.drain(..) {
            unsafe { worker::ready(f) };
        }
        self.lock.unlock();
    }

    pub fn is_closed(&self) -> bool {
        self.lock.lock();
        let closed = unsafe { (*self.state.get()).closed };
        self.lock.unlock();
        closed
    }

    pub fn len(&self) -> usize {
        self.lock.lock();
        let len = unsafe { (*self.state.get()).queue.len() };
        self.lock.unlock();
        len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_put_get_round_trip() {
        let ch: Channel<i32> = Channel::new(2);
        assert!(ch.try_put(1).is_ok());
        assert!(ch.try_put(2).is_ok());
        assert_eq!(ch.try_put(3), Err(3));
        assert_eq!(ch.try_get(), Some(1));
        assert_eq!(ch.try_get(), Some(2));
        assert_eq!(ch.try_get(), None);
    }

    #[test]
    fn close_drains_then_reports_none() {
        let ch: Channel<i32> = Channel::new(4);
        ch.try_put(1).unwrap();
        ch.close();
        assert!(ch.is_closed());
        assert_eq!(ch.get(), Some(1));
        assert_eq!(ch.get(), None);
    }

    #[test]
    fn put_after_close_fails_and_drops_value() {
        let ch: Channel<i32> = Channel::new(1);
        ch.close();
        assert!(!ch.put(5));
    }

    #[test]
    fn blocking_put_and_get_from_host_threads() {
        crate::runtime::ensure_test_runtime();
        use std::sync::Arc;

        let ch: Arc<Channel<i32>> = Arc::new(Channel::new(1));
        let producer = {
            let ch = Arc::clone(&ch);
            std::thread::spawn(move || {
                for i in 0..50 {
                    assert!(ch.put(i));
                }
            })
        };
        let mut received = std::vec::Vec::new();
        for _ in 0..50 {
            received.push(ch.get().unwrap());
        }
        producer.join().unwrap();
        assert_eq!(received, (0..50).collect::<std::vec::Vec<_>>());
    }
}
