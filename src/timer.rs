//! One-shot and repeating timers, each backed by a future that counts down
//! once per fire. Grounded in `timer.c`'s `timer_start`/`timer_cb` shape,
//! with the original's per-event-loop `uv_timer_t` replaced by a single
//! background driver thread holding a deadline-ordered heap — the
//! event-loop simplification this crate makes everywhere libuv appeared
//! in the original engine. Firing itself (decrementing the future) is
//! cheap enough to do directly from the driver thread rather than
//! bouncing through a worker's scheduler loop.

use crate::alloc::capability::SystemAllocator;
use crate::alloc::slab_pool::SlabPool;
use crate::future::Future;
use crate::sync::SpinMutex;
use std::boxed::Box;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::ptr::NonNull;
use std::sync::{Condvar, Mutex, OnceLock};
use std::time::{Duration, Instant};
use std::vec::Vec;

struct TimerState {
    period: Duration,
    remaining: u32,
    future: *const Future,
}

unsafe impl Send for TimerState {}

static SYSTEM: SystemAllocator = SystemAllocator;
static TIMER_POOL: OnceLock<SpinMutex<SlabPool<'static, TimerState>>> = OnceLock::new();

fn pool() -> &'static SpinMutex<SlabPool<'static, TimerState>> {
    TIMER_POOL.get_or_init(|| SpinMutex::new(SlabPool::new(&SYSTEM)))
}

struct Pending {
    deadline: Instant,
    slot: NonNull<TimerState>,
}

unsafe impl Send for Pending {}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline
    }
}
impl Eq for Pending {}
impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Pending {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.deadline.cmp(&other.deadline)
    }
}

struct Driver {
    heap: Mutex<BinaryHeap<Reverse<Pending>>>,
    wakeup: Condvar,
}

static DRIVER: OnceLock<&'static Driver> = OnceLock::new();

fn driver() -> &'static Driver {
    DRIVER.get_or_init(|| {
        let driver: &'static Driver = Box::leak(Box::new(Driver {
            heap: Mutex::new(BinaryHeap::new()),
            wakeup: Condvar::new(),
        }));
        std::thread::Builder::new()
            .name("cordrt-timer".into())
            .spawn(move || driver_loop(driver))
            .expect("failed to spawn timer driver thread");
        driver
    })
}

fn driver_loop(driver: &'static Driver) {
    loop {
        let mut heap = driver.heap.lock().unwrap();
        let wait = match heap.peek() {
            None => None,
            Some(Reverse(p)) => {
                let now = Instant::now();
                if p.deadline <= now {
                    None
                } else {
                    Some(p.deadline - now)
                }
            }
        };

        let mut heap = match wait {
            None if heap.peek().is_none() => driver.wakeup.wait(heap).unwrap(),
            None => heap,
            Some(d) => driver.wakeup.wait_timeout(heap, d).unwrap().0,
        };

        let now = Instant::now();
        let mut due = Vec::new();
        while let Some(Reverse(p)) = heap.peek() {
            if p.deadline > now {
                break;
            }
            let Reverse(p) = heap.pop().unwrap();
            due.push(p);
        }
        drop(heap);

        for pending in due {
            fire(pending.slot, driver);
        }
    }
}

fn fire(slot: NonNull<TimerState>, driver: &'static Driver) {
    let state = unsafe { &mut *slot.as_ptr() };
    let future = unsafe { &*state.future };
    future.decrement();

    state.remaining -= 1;
    if state.remaining == 0 {
        unsafe { pool().lock().free(slot) };
        return;
    }

    let deadline = Instant::now() + state.period;
    driver
        .heap
        .lock()
        .unwrap()
        .push(Reverse(Pending { deadline, slot }));
}

/// Starts a timer that fires every `period`, `repeats` times, decrementing
/// the returned future once per fire. Returns `None` if `repeats == 0`
/// (the original engine's `timer_start` rejects the same case).
pub fn start(period: Duration, repeats: u32) -> Option<Box<Future>> {
    if repeats == 0 {
        return None;
    }

    let future = Future::create(repeats as usize, None, 2);
    let counter: *const Future = future.as_ref();

    let slot = pool().lock().alloc()?;
    unsafe {
        slot.as_ptr().write(TimerState {
            period,
            remaining: repeats,
            future: counter,
        });
    }

    let driver = driver();
    driver.heap.lock().unwrap().push(Reverse(Pending {
        deadline: Instant::now() + period,
        slot,
    }));
    driver.wakeup.notify_one();

    Some(future)
}

/// Starts a one-shot timer; equivalent to `start(period, 1)`.
pub fn after(period: Duration) -> Box<Future> {
    start(period, 1).expect("repeats=1 is always accepted")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime;

    #[test]
    fn rejects_zero_repeats() {
        assert!(start(Duration::from_millis(1), 0).is_none());
    }

    #[test]
    fn one_shot_timer_fires_once() {
        runtime::ensure_test_runtime();
        let future = after(Duration::from_millis(5));
        assert_eq!(future.wait(0), 0);
    }

    #[test]
    fn repeating_timer_fires_n_times() {
        runtime::ensure_test_runtime();
        let future = start(Duration::from_millis(2), 5).unwrap();
        assert_eq!(future.wait(0), 0);
    }
}
