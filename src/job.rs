//! Job descriptors and batch submission onto the global work queue.

use crate::future::Future;
use crate::runtime;
use std::boxed::Box;
use std::vec::Vec;

/// A unit of work: a plain function pointer and an opaque data pointer,
/// the same shape the original engine passes across its job queue. `func`
/// returns a result code that `run_jobs` writes back into the caller's
/// results slice, if one was supplied.
#[derive(Clone, Copy)]
pub struct JobDescriptor {
    pub func: fn(*mut ()) -> i64,
    pub data: *mut (),
}

unsafe impl Send for JobDescriptor {}

/// A job together with the bookkeeping `run_jobs` needs once it completes:
/// which future to decrement, and where to publish its result.
pub struct QueuedJob {
    pub(crate) descriptor: JobDescriptor,
    pub(crate) counter: *const Future,
    pub(crate) result_slot: *mut i64,
}

unsafe impl Send for QueuedJob {}

/// Runs one job and publishes its outcome. Called exactly once per
/// [`QueuedJob`] by [`crate::fiber::worker::run_current_fiber_job`].
pub(crate) fn execute(job: QueuedJob) {
    let result = (job.descriptor.func)(job.descriptor.data);
    if !job.result_slot.is_null() {
        unsafe { *job.result_slot = result };
    }
    unsafe { (*job.counter).decrement() };
}

/// Submits `jobs` to the global queue and returns a future that reaches
/// zero once every one of them has run. `results`, if given, must have
/// exactly as many slots as `jobs` and receives each job's return value at
/// the matching index; the caller is responsible for keeping `results`
/// alive until the returned future is observed to complete.
pub fn run_jobs(jobs: &[JobDescriptor], results: Option<&mut [i64]>) -> Box<Future> {
    if let Some(r) = &results {
        assert_eq!(
            r.len(),
            jobs.len(),
            "run_jobs: results slice must match jobs slice"
        );
    }

    let future = Future::create(jobs.len(), None, 4);
    let counter: *const Future = future.as_ref();

    let result_slots: Vec<*mut i64> = match results {
        Some(r) => r.iter_mut().map(|slot| slot as *mut i64).collect(),
        None => std::vec![core::ptr::null_mut(); jobs.len()],
    };

    for (descriptor, result_slot) in jobs.iter().copied().zip(result_slots) {
        runtime::submit_job(QueuedJob {
            descriptor,
            counter,
            result_slot,
        });
    }

    future
}
