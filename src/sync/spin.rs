//! Test-and-test-and-set spinlock and a `SpinMutex<T>` wrapper around it.
//!
//! Used everywhere a lock must be held across a handful of instructions and
//! never across a blocking syscall — channel bookkeeping, future slot
//! installs, and the buddy cache's per-worker region lock all use this
//! instead of `std::sync::Mutex`. `SpinLock::yield_while_held` is the
//! reason: a fiber parking itself on a wait list needs the lock to still
//! read as held while its stack is mid-switch, so the scheduler (not a
//! guard's `Drop`) releases it once the switch is provably complete (see
//! `fiber::worker::yield_fiber`) — a handoff `std::sync::MutexGuard` has no
//! way to express. `SpinMutex<T>` stays a plain RAII wrapper for data that
//! is never held across a yield point.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

pub struct SpinLock {
    locked: AtomicBool,
}

impl Default for SpinLock {
    fn default() -> Self {
        Self::new()
    }
}

impl SpinLock {
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn lock(&self) {
        if self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            return;
        }
        self.lock_slow();
    }

    #[cold]
    fn lock_slow(&self) {
        loop {
            while self.locked.load(Ordering::Relaxed) {
                core::hint::spin_loop();
            }
            if self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
    }

    #[inline]
    pub fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    #[inline]
    pub fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    /// Parks the calling fiber (see [`crate::fiber::worker::yield_fiber`]),
    /// handing this lock to the scheduler to release once the context
    /// switch completes instead of releasing it here. This is what lets a
    /// fiber enqueue itself on a wait list and yield without ever exposing
    /// a window where the list is mutated but the lock reads unlocked:
    /// concurrent lockers still see `self` held right up until the
    /// yielding fiber is provably suspended on the scheduler's stack.
    ///
    /// # Safety
    /// Must be called from inside a fiber, with the lock currently held by
    /// the caller (typically via a just-taken, not-yet-dropped guard whose
    /// `Drop` this bypasses — callers hold the raw `SpinLock` directly for
    /// exactly this reason rather than going through `SpinMutexGuard`).
    pub unsafe fn yield_while_held(&self) {
        unsafe { crate::fiber::worker::yield_fiber(Some(self)) };
    }
}

unsafe impl Send for SpinLock {}
unsafe impl Sync for SpinLock {}

/// A mutex that spins instead of parking the OS thread. Does not allocate
/// and can be used in a `static`.
pub struct SpinMutex<T> {
    lock: SpinLock,
    data: UnsafeCell<T>,
}

impl<T> SpinMutex<T> {
    pub const fn new(val: T) -> Self {
        Self {
            lock: SpinLock::new(),
            data: UnsafeCell::new(val),
        }
    }

    #[inline]
    pub fn lock(&self) -> SpinMutexGuard<'_, T> {
        self.lock.lock();
        SpinMutexGuard { mutex: self }
    }

    #[inline]
    pub fn try_lock(&self) -> Option<SpinMutexGuard<'_, T>> {
        if self.lock.try_lock() {
            Some(SpinMutexGuard { mutex: self })
        } else {
            None
        }
    }
}

unsafe impl<T: Send> Send for SpinMutex<T> {}
unsafe impl<T: Send> Sync for SpinMutex<T> {}

pub struct SpinMutexGuard<'a, T> {
    mutex: &'a SpinMutex<T>,
}

impl<T> Deref for SpinMutexGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for SpinMutexGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for SpinMutexGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        self.mutex.lock.unlock();
    }
}
