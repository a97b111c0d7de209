//! The future-side I/O bridge: a small fixed pool of plain OS threads that
//! run blocking operations (disk, network, anything that can't be
//! expressed as a cooperative fiber job) off the cord workers, publishing
//! their result through the same future primitive everything else in this
//! crate waits on.
//!
//! There is no non-blocking I/O reactor here — outside the explicit
//! Non-goals this crate scopes out (rendering, asset pipelines, file
//! decoding, window/input), "how do you get bytes off a disk without
//! blocking a worker" still needs an answer, and a bounded blocking-op
//! pool is the smallest one that doesn't stall the scheduler.

use crate::future::{Future, Waitable};
use crate::sync::{MpmcQueue, PushError};
use std::boxed::Box;
use std::sync::OnceLock;

type Job = Box<dyn FnOnce() + Send>;

struct BlockingPool {
    queue: MpmcQueue<Job>,
}

fn pool() -> &'static BlockingPool {
    static POOL: OnceLock<&'static BlockingPool> = OnceLock::new();
    *POOL.get_or_init(|| {
        let pool: &'static BlockingPool = Box::leak(Box::new(BlockingPool {
            queue: MpmcQueue::new(256),
        }));
        for i in 0..4 {
            std::thread::Builder::new()
                .name(std::format!("cordrt-io-{i}"))
                .spawn(move || blocking_worker(pool))
                .expect("failed to spawn io blocking-pool thread");
        }
        pool
    })
}

fn blocking_worker(pool: &'static BlockingPool) {
    loop {
        match pool.queue.pop() {
            Some(job) => job(),
            None => std::thread::yield_now(),
        }
    }
}

/// Runs `f` on a blocking-op thread and returns a future that reaches
/// zero once it finishes; the future's waitable result carries `f`'s
/// return value.
pub fn spawn_blocking<F>(f: F) -> Box<Future>
where
    F: FnOnce() -> i64 + Send + 'static,
{
    let future = Future::create(1, Some(Waitable::new(core::ptr::null_mut(), None)), 2);
    let counter: *const Future = future.as_ref();
    let counter = counter as usize;

    let mut job: Job = Box::new(move || {
        let result = f();
        let future = unsafe { &*(counter as *const Future) };
        future.set_result(result);
        future.decrement();
    });

    loop {
        match pool().queue.push(job) {
            Ok(()) => break,
            Err(PushError(back)) => {
                job = back;
                std::thread::yield_now();
            }
        }
    }

    future
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_blocking_runs_and_reports_result() {
        crate::runtime::ensure_test_runtime();
        let future = spawn_blocking(|| 7 * 6);
        assert_eq!(future.wait(0), 42);
    }
}
