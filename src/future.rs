//! Atomic-counter future: the primitive every other wait/wake path in the
//! runtime (jobs, channels, timers, I/O) is built on. A fiber waiting for
//! the counter to reach a target value always suspends itself first, then
//! arms a wait slot from the scheduler's post-switch hook — only once the
//! fiber is provably parked can a concurrent waker safely requeue it,
//! closing the install/suspend race a naive "install, recheck, maybe
//! yield" ordering would leave open.
//!
//! Ported from the original engine's `counter_wait`/`counter_wakeup` pair
//! (`future.c`), with that reordering as this implementation's one
//! deliberate departure from the source.

use crate::fiber::pool::Fiber;
use crate::fiber::worker;
use crate::sync::SpinLock;
use core::sync::atomic::{AtomicBool, AtomicI64, AtomicPtr, AtomicUsize, Ordering};

/// Sentinel written into a waitable's result while the operation it
/// represents has not completed yet.
pub const NOT_FINISHED: i64 = 0x_dfff_ffff;

/// An object a future owns and frees when the future itself is freed —
/// a timer control block, a pending I/O request, a job-request record.
pub struct Waitable {
    instance: *mut (),
    dtor: Option<unsafe fn(*mut ())>,
    result: AtomicI64,
}

unsafe impl Send for Waitable {}
unsafe impl Sync for Waitable {}

impl Waitable {
    pub fn new(instance: *mut (), dtor: Option<unsafe fn(*mut ())>) -> Self {
        Self {
            instance,
            dtor,
            result: AtomicI64::new(NOT_FINISHED),
        }
    }

    pub fn set_result(&self, value: i64) {
        self.result.store(value, Ordering::Release);
    }

    pub fn result(&self) -> i64 {
        self.result.load(Ordering::Acquire)
    }
}

struct Slot {
    fiber: AtomicPtr<Fiber>,
    /// `true` until the scheduler has confirmed the installing fiber is
    /// fully suspended; only then is the slot visible to [`Future::wake`].
    in_use: AtomicBool,
    target: AtomicUsize,
}

impl Slot {
    fn new() -> Self {
        Self {
            fiber: AtomicPtr::new(core::ptr::null_mut()),
            in_use: AtomicBool::new(true),
            target: AtomicUsize::new(0),
        }
    }
}

struct SlotArray {
    slots: Box<[Slot]>,
}

impl SlotArray {
    fn new(num_slots: u32) -> Self {
        let slots = (0..num_slots.max(1)).map(|_| Slot::new()).collect();
        Self { slots }
    }
}

/// The atomic-counter future/wait-slot primitive described at the top of
/// this module.
pub struct Future {
    value: AtomicUsize,
    slots: AtomicPtr<SlotArray>,
    grow_lock: SpinLock,
    waitable: Option<Waitable>,
}

impl Future {
    /// Allocates a new future with `num_slots` initial wait slots (slots
    /// grow lazily on exhaustion, see [`Future::finish_install`]).
    pub fn create(value: usize, waitable: Option<Waitable>, num_slots: u32) -> Box<Future> {
        let slots = Box::into_raw(Box::new(SlotArray::new(num_slots)));
        Box::new(Future {
            value: AtomicUsize::new(value),
            slots: AtomicPtr::new(slots),
            grow_lock: SpinLock::new(),
            waitable,
        })
    }

    pub fn value(&self) -> usize {
        self.value.load(Ordering::Relaxed)
    }

    pub fn increment(&self) -> usize {
        let val = self.value.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        self.wake(val);
        val
    }

    pub fn decrement(&self) -> usize {
        let val = self.value.fetch_sub(1, Ordering::Relaxed).wrapping_sub(1);
        self.wake(val);
        val
    }

    pub fn set_result(&self, result: i64) {
        if let Some(w) = &self.waitable {
            w.set_result(result);
        }
    }

    /// Scans the current slot array for waiters matching `value` and wakes
    /// them. Holds `grow_lock` for the whole scan, the same lock `grow`
    /// holds for the whole copy-and-swap: a slot array growing out from
    /// under a concurrent claim is exactly the double-resume hazard this
    /// type exists to avoid, so growth and claims are never allowed to
    /// interleave (see `grow`'s doc comment).
    fn wake(&self, value: usize) {
        self.grow_lock.lock();
        let array = unsafe { &*self.slots.load(Ordering::Acquire) };
        for slot in array.slots.iter() {
            let f = slot.fiber.load(Ordering::Acquire);
            if f.is_null() {
                continue;
            }
            if slot.in_use.load(Ordering::Acquire) {
                continue;
            }
            if slot.target.load(Ordering::Relaxed) != value {
                continue;
            }
            if slot
                .in_use
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                slot.fiber.store(core::ptr::null_mut(), Ordering::Release);
                unsafe { worker::ready(f) };
            }
        }
        self.grow_lock.unlock();
    }

    /// Waits for the counter to reach `value`. Called from inside a fiber,
    /// this parks it until woken; called from a plain host thread outside
    /// the fiber runtime (no wait slot can resume a non-fiber stack), it
    /// spins instead. Returns the waitable's result.
    pub fn wait(&self, value: usize) -> i64 {
        if self.value.load(Ordering::Acquire) != value {
            if worker::this().is_null() {
                while self.value.load(Ordering::Acquire) != value {
                    std::thread::yield_now();
                }
            } else {
                unsafe { worker::yield_for_future(self as *const Future as *const (), value) };
            }
        }
        self.waitable.as_ref().map(Waitable::result).unwrap_or(0)
    }

    pub fn wait_and_free(self: Box<Self>, value: usize) -> i64 {
        let result = self.wait(value);
        drop(self);
        result
    }

    /// Arms a wait slot for `fiber`/`target`, called by the scheduler
    /// immediately after confirming `fiber` has fully suspended. If the
    /// counter already reached `target` in the meantime, requeues `fiber`
    /// onto the ready list directly instead of arming a slot nobody would
    /// ever wake.
    ///
    /// # Safety
    /// `fiber` must be fully suspended (not concurrently running) and not
    /// linked into any other list.
    pub(crate) unsafe fn finish_install(&self, fiber: *mut Fiber, target: usize) {
        loop {
            if self.try_arm(fiber, target) {
                return;
            }
            self.grow();
        }
    }

    /// Installs `fiber` into the first vacant slot of the current array, or
    /// reports no vacancy (`false`) so `finish_install` can grow and retry.
    /// Holds `grow_lock` for the same reason `wake` does: installing into a
    /// slot of an array that `grow` is mid-copying could have the install
    /// silently vanish when the new array becomes current.
    fn try_arm(&self, fiber: *mut Fiber, target: usize) -> bool {
        self.grow_lock.lock();
        let array = unsafe { &*self.slots.load(Ordering::Acquire) };
        for slot in array.slots.iter() {
            if slot
                .fiber
                .compare_exchange(
                    core::ptr::null_mut(),
                    fiber,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                )
                .is_err()
            {
                continue;
            }
            slot.target.store(target, Ordering::Relaxed);
            if self.value.load(Ordering::Acquire) == target {
                slot.fiber.store(core::ptr::null_mut(), Ordering::Release);
                unsafe { worker::ready(fiber) };
            } else {
                slot.in_use.store(false, Ordering::Release);
            }
            self.grow_lock.unlock();
            return true;
        }
        self.grow_lock.unlock();
        false
    }

    /// Doubles the slot array. Holds `grow_lock` across the entire
    /// copy-and-swap, and `wake`/`try_arm` hold the same lock across their
    /// entire scan, so a slot is never concurrently claimed on the array
    /// being retired and migrated into the array replacing it — the source
    /// of a prior double-resume bug, where a waiter claimed via `wake` on
    /// the old array could still appear armed in the freshly copied new
    /// array and be claimed (and resumed) a second time.
    fn grow(&self) {
        self.grow_lock.lock();
        let old_ptr = self.slots.load(Ordering::Acquire);
        let old = unsafe { &*old_ptr };
        let mut slots: std::vec::Vec<Slot> = std::vec::Vec::with_capacity(old.slots.len() * 2);
        for s in old.slots.iter() {
            slots.push(Slot {
                fiber: AtomicPtr::new(s.fiber.load(Ordering::Relaxed)),
                in_use: AtomicBool::new(s.in_use.load(Ordering::Relaxed)),
                target: AtomicUsize::new(s.target.load(Ordering::Relaxed)),
            });
        }
        for _ in old.slots.len()..old.slots.len() * 2 {
            slots.push(Slot::new());
        }
        let new_array = Box::into_raw(Box::new(SlotArray {
            slots: slots.into_boxed_slice(),
        }));
        self.slots.store(new_array, Ordering::Release);
        // Safe to free now, not merely once this future drops: `wake` and
        // `try_arm` both take `grow_lock` before their first load of
        // `self.slots`, so nobody can be holding a reference to `old_ptr`
        // without also holding (and thus waiting behind) this same lock.
        unsafe { drop(Box::from_raw(old_ptr)) };
        self.grow_lock.unlock();
    }
}

impl Drop for Future {
    fn drop(&mut self) {
        if let Some(w) = &self.waitable {
            if let Some(dtor) = w.dtor {
                unsafe { dtor(w.instance) };
            }
        }
        unsafe {
            drop(Box::from_raw(self.slots.load(Ordering::Relaxed)));
        }
    }
}

unsafe impl Send for Future {}
unsafe impl Sync for Future {}

impl Future {
    /// Test-only introspection: is `fiber` currently armed in some slot
    /// waiting for `target`? Never dereferences `fiber`, so tests can use
    /// fabricated pointers as long as the counter never actually reaches
    /// their target (which would call `worker::ready` on them for real).
    #[cfg(test)]
    fn has_armed_waiter(&self, fiber: *mut Fiber, target: usize) -> bool {
        let array = unsafe { &*self.slots.load(Ordering::Acquire) };
        array.slots.iter().any(|s| {
            s.fiber.load(Ordering::Acquire) == fiber
                && !s.in_use.load(Ordering::Acquire)
                && s.target.load(Ordering::Relaxed) == target
        })
    }
}
