//! Runtime bring-up: the one fallible, `Result`-returning surface in this
//! crate. Everything below `Runtime::init` reports failure through return
//! values (`Option`/`bool`) on the hot path, per the error-handling model
//! described in the project's design notes — only process-lifetime setup
//! (can't get memory, can't pin a thread) is worth a typed error.

use crate::fiber::pool::{Fiber, FiberPool};
use crate::fiber::worker::Worker;
use crate::job::QueuedJob;
use crate::platform;
use crate::sync::{MpmcQueue, TaggedLifo};
use std::boxed::Box;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::vec::Vec;

#[derive(Debug)]
pub enum RuntimeError {
    /// The fiber pool's backing arena could not be mapped (out of address
    /// space, or the platform rejected the mapping outright).
    FiberArenaUnavailable,
    /// `worker_count` was zero.
    InvalidWorkerCount,
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeError::FiberArenaUnavailable => {
                write!(f, "failed to reserve virtual memory for the fiber pool")
            }
            RuntimeError::InvalidWorkerCount => write!(f, "invalid worker count"),
        }
    }
}

impl std::error::Error for RuntimeError {}

/// Tuning knobs for [`Runtime::init`]. Every field has a default matched
/// to a modest desktop/workstation machine; production embedders are
/// expected to override `worker_count` at minimum.
pub struct RuntimeConfig {
    pub worker_count: usize,
    pub fibers_per_worker: usize,
    pub fiber_stack_size: usize,
    pub job_queue_capacity: usize,
    pub event_queue_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            fibers_per_worker: 32,
            fiber_stack_size: crate::alloc::arena::MIN_SLAB_SIZE,
            job_queue_capacity: 4096,
            event_queue_capacity: 1024,
        }
    }
}

pub(crate) struct GlobalState {
    pub(crate) fiber_pool: FiberPool,
    pub(crate) ready: TaggedLifo<Fiber>,
    pub(crate) job_queue: MpmcQueue<QueuedJob>,
    pub(crate) event_queue: MpmcQueue<Box<dyn FnOnce() + Send>>,
    pub(crate) shutting_down: AtomicBool,
}

static GLOBAL: OnceLock<GlobalState> = OnceLock::new();

pub(crate) fn global() -> &'static GlobalState {
    GLOBAL
        .get()
        .expect("cordrt runtime used before Runtime::init")
}

pub(crate) fn is_shutting_down() -> bool {
    global().shutting_down.load(Ordering::Relaxed)
}

/// Enqueues a job onto the global job queue, retrying with a brief spin if
/// the queue is momentarily full.
pub(crate) fn submit_job(job: QueuedJob) {
    let mut job = job;
    loop {
        match global().job_queue.push(job) {
            Ok(()) => return,
            Err(crate::sync::PushError(back)) => {
                job = back;
                std::thread::yield_now();
            }
        }
    }
}

/// Owns the worker threads and the global scheduling state. Dropping the
/// last `Runtime` does not tear workers down implicitly — call
/// [`Runtime::shutdown`] explicitly, the way the original engine requires
/// an explicit `tc_shutdown`.
pub struct Runtime {
    workers: Vec<Worker>,
}

impl Runtime {
    pub fn init(config: RuntimeConfig) -> Result<Runtime, RuntimeError> {
        if config.worker_count == 0 {
            return Err(RuntimeError::InvalidWorkerCount);
        }

        let total_fibers = config.worker_count * config.fibers_per_worker;
        let fiber_pool = FiberPool::new(total_fibers, config.fiber_stack_size)
            .ok_or(RuntimeError::FiberArenaUnavailable)?;

        let state = GlobalState {
            fiber_pool,
            ready: TaggedLifo::new(),
            job_queue: MpmcQueue::new(config.job_queue_capacity),
            event_queue: MpmcQueue::new(config.event_queue_capacity),
            shutting_down: AtomicBool::new(false),
        };
        if GLOBAL.set(state).is_err() {
            log::warn!("Runtime::init called more than once; reusing existing runtime");
        }

        let mut workers = Vec::with_capacity(config.worker_count);
        for cpu in 0..config.worker_count {
            workers.push(Worker::spawn(cpu));
        }

        log::info!(
            "cordrt runtime started: {} workers, {} fibers/worker",
            config.worker_count,
            config.fibers_per_worker
        );

        Ok(Runtime { workers })
    }

    /// Signals every worker to drain its queue and exit, then joins them.
    pub fn shutdown(self) {
        global().shutting_down.store(true, Ordering::Release);
        for worker in self.workers {
            worker.join();
        }
    }
}

/// Pins the calling OS thread to `cpu`, best-effort. Used by
/// [`crate::fiber::worker::Worker::spawn`]; exposed here because both the
/// runtime and the worker module need it without creating a cycle.
pub(crate) fn pin_current_thread(cpu: usize) -> bool {
    platform::pin_to_cpu(cpu)
}

/// Brings up a small shared runtime the first time any test needs one and
/// reuses it for the rest of the process: `Runtime` is a process-wide
/// singleton (see [`GLOBAL`]), so unit tests across modules cannot each
/// init their own.
#[cfg(test)]
pub(crate) fn ensure_test_runtime() {
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        let config = RuntimeConfig {
            worker_count: 2,
            fibers_per_worker: 8,
            fiber_stack_size: crate::alloc::arena::MIN_SLAB_SIZE,
            job_queue_capacity: 256,
            event_queue_capacity: 256,
        };
        let rt = Runtime::init(config).expect("test runtime init");
        // Leaked intentionally: the workers must outlive every test in this
        // binary, and the process exits shortly after the test harness
        // finishes anyway.
        std::mem::forget(rt);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_picks_at_least_one_worker() {
        let config = RuntimeConfig::default();
        assert!(config.worker_count >= 1);
    }
}
