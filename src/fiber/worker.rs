//! The per-CPU scheduler loop ("cord"): drains the ready list, starts new
//! fibers on queued jobs, and ticks the shared event queue, all on a single
//! OS thread pinned to one CPU.
//!
//! The scheduler itself runs directly on the worker's native OS thread
//! stack rather than inside a dedicated scheduler fiber page — a
//! deliberate simplification relative to the original engine, which gives
//! every cord an explicit scheduler fiber. `SCHED_SP_SLOT` below holds the
//! address of a local variable inside [`resume`], which [`yield_fiber`]
//! dereferences to find its way back; this makes the native stack behave
//! like any other context as far as the swap primitive is concerned.

use crate::fiber::context;
use crate::fiber::pool::{Fiber, RunningJob};
use crate::runtime;
use crate::sync::SpinLock;
use std::cell::Cell;

thread_local! {
    static CURRENT_FIBER: Cell<*mut Fiber> = const { Cell::new(core::ptr::null_mut()) };
    static SCHED_SP_SLOT: Cell<*mut *mut u8> = const { Cell::new(core::ptr::null_mut()) };
    static PENDING_UNLOCK: Cell<*const SpinLock> = const { Cell::new(core::ptr::null()) };
    static PENDING_FUTURE_INSTALL: Cell<(*const (), usize)> =
        const { Cell::new((core::ptr::null(), 0)) };
}

/// Returns the fiber currently running on this OS thread, or null if
/// called from the scheduler loop itself (not inside a fiber).
pub fn this() -> *mut Fiber {
    CURRENT_FIBER.with(|c| c.get())
}

/// Pushes `fiber` onto the global ready list so some worker's scheduler
/// loop will resume it. Safe to call from any OS thread.
pub unsafe fn ready(fiber: *mut Fiber) {
    unsafe { runtime::global().ready.push(fiber) };
}

/// Resumes `fiber`, blocking the calling (scheduler) stack until the fiber
/// either finishes its current job or yields back. `arg` is delivered to
/// the fiber's entry point on a fiber's very first resume and ignored on
/// every subsequent one.
///
/// # Safety
/// `fiber` must not be concurrently resumed by another thread, and must
/// not be linked into any list (ready/wait/free) while resumed.
pub unsafe fn resume(fiber: *mut Fiber, arg: usize) -> usize {
    let previous = CURRENT_FIBER.with(|c| c.replace(fiber));
    let mut sched_sp: *mut u8 = core::ptr::null_mut();
    SCHED_SP_SLOT.with(|slot| slot.set(&mut sched_sp as *mut *mut u8));

    let to = unsafe { (*fiber).context.0 };
    let ret = unsafe { context::swap_into(&mut sched_sp, to, arg) };

    CURRENT_FIBER.with(|c| c.set(previous));

    // The fiber contract is "the scheduler releases the lock after the
    // switch completes": a fiber that yields while holding a lock (e.g.
    // handing a value to a channel peer) stores it here instead of
    // unlocking before the switch, so the unlock happens only once we know
    // the fiber's own stack state is safely parked.
    let pending = PENDING_UNLOCK.with(|p| p.replace(core::ptr::null()));
    if !pending.is_null() {
        unsafe { (*pending).unlock() };
    }

    // The fiber we just resumed may have called `yield_for_future` to park
    // itself on a counter. It is provably suspended now (we are past the
    // switch back), so it is finally safe to arm its wait slot.
    let pending_future = PENDING_FUTURE_INSTALL.with(|p| p.replace((core::ptr::null(), 0)));
    if !pending_future.0.is_null() {
        let future = unsafe { &*(pending_future.0 as *const crate::future::Future) };
        unsafe { future.finish_install(fiber, pending_future.1) };
    }

    ret
}

/// Suspends the currently running fiber, returning control to whichever
/// scheduler loop resumed it. `lock`, if given, is unlocked by that
/// scheduler immediately after the switch completes rather than before —
/// see the module doc and [`resume`].
///
/// # Safety
/// Must be called from inside a fiber (i.e. `this()` must be non-null).
pub unsafe fn yield_fiber(lock: Option<&SpinLock>) {
    let current = this();
    debug_assert!(!current.is_null(), "yield_fiber called outside a fiber");

    if let Some(l) = lock {
        PENDING_UNLOCK.with(|p| p.set(l as *const SpinLock));
    }

    let sched_slot = SCHED_SP_SLOT.with(|s| s.get());
    let to = unsafe { *sched_slot };
    let from_slot = unsafe { &mut (*current).context.0 };
    unsafe { context::swap_into(from_slot, to, 0) };
}

/// Suspends the currently running fiber to wait on a future, the way
/// [`yield_fiber`] suspends it for a plain reschedule. Unlike
/// `yield_fiber`, the wait slot is armed only after the switch completes
/// (see [`resume`] and `future::Future::finish_install`), so a concurrent
/// waker can never observe (and resume) this fiber before it has actually
/// suspended.
///
/// # Safety
/// Must be called from inside a fiber, with `future` pointing to a live
/// `future::Future` that outlives the switch.
pub unsafe fn yield_for_future(future: *const (), target: usize) {
    let current = this();
    debug_assert!(!current.is_null(), "yield_for_future called outside a fiber");

    PENDING_FUTURE_INSTALL.with(|p| p.set((future, target)));

    let sched_slot = SCHED_SP_SLOT.with(|s| s.get());
    let to = unsafe { *sched_slot };
    let from_slot = unsafe { &mut (*current).context.0 };
    unsafe { context::swap_into(from_slot, to, 0) };
}

/// The body every fiber page's stack is initialized to run: loops forever,
/// running one installed job per iteration and parking between jobs.
/// Fibers are long-lived and reused across many jobs, never re-initialized
/// per job.
pub fn run_current_fiber_job() -> ! {
    loop {
        let fiber = this();
        let RunningJob { descriptor } = unsafe { (*fiber).job.take() }
            .expect("fiber trampoline resumed without a job installed");

        crate::job::execute(descriptor);

        unsafe {
            (*fiber).scratch.reset();
            (*fiber).finished = true;
        }
        unsafe { yield_fiber(None) };
        unsafe { (*fiber).finished = false };
    }
}

/// One pinned OS thread driving the scheduler loop for a single CPU.
pub struct Worker {
    handle: Option<std::thread::JoinHandle<()>>,
}

impl Worker {
    pub(crate) fn spawn(cpu: usize) -> Worker {
        let handle = std::thread::Builder::new()
            .name(std::format!("cord-{cpu}"))
            .spawn(move || scheduler_loop(cpu))
            .expect("failed to spawn cord worker thread");
        Worker {
            handle: Some(handle),
        }
    }

    pub(crate) fn join(mut self) {
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

fn scheduler_loop(cpu: usize) {
    if !runtime::pin_current_thread(cpu) {
        log::warn!("cord-{cpu} failed to pin to its target cpu; continuing unpinned");
    }

    let state = runtime::global();
    loop {
        if let Some(fiber) = state.ready.pop() {
            unsafe { resume(fiber, 0) };
            if unsafe { (*fiber).finished } {
                unsafe { state.fiber_pool.release(fiber) };
            }
            // Otherwise the fiber parked itself waiting on a future or a
            // channel; whoever satisfies that wait calls `ready()` again
            // when it's actually runnable. Re-queuing it here ourselves
            // would let it be resumed twice at once.
            continue;
        }

        if let Some(job) = state.job_queue.pop() {
            match state.fiber_pool.acquire() {
                Some(fiber) => {
                    unsafe { (*fiber).job = Some(RunningJob { descriptor: job }) };
                    unsafe { resume(fiber, 0) };
                    if unsafe { (*fiber).finished } {
                        unsafe { state.fiber_pool.release(fiber) };
                    }
                }
                None => {
                    // No fiber free to run it on right now; put the job
                    // back and let another worker (or this one, later)
                    // pick it up once a fiber is released.
                    runtime::submit_job(job);
                    std::thread::yield_now();
                }
            }
            continue;
        }

        if let Some(event) = state.event_queue.pop() {
            event();
            continue;
        }

        if runtime::is_shutting_down() {
            return;
        }
        std::thread::yield_now();
    }
}
