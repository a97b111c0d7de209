//! Virtual-memory slab arena: a large, contiguous, slab-size-aligned
//! reservation handed out in fixed-size slabs via a bump cursor plus a
//! lock-free LIFO of freed slabs.

use crate::platform;
use crate::sync::lifo::LifoNode;
use crate::sync::TaggedLifo;
use core::sync::atomic::{AtomicUsize, Ordering};

/// Slabs must be at least 64 KiB so their addresses can carry an ABA tag
/// when linked into a `TaggedLifo` (see `sync::lifo`), and so they're large
/// enough to back a fiber page.
pub const MIN_SLAB_SIZE: usize = 64 * 1024;

#[repr(C, align(65536))]
struct FreeSlab {
    next: *mut FreeSlab,
}

unsafe impl LifoNode for FreeSlab {
    unsafe fn next(node: *mut Self) -> *mut Self {
        unsafe { (*node).next }
    }
    unsafe fn set_next(node: *mut Self, next: *mut Self) {
        unsafe { (*node).next = next };
    }
}

pub struct Arena {
    base: *mut u8,
    capacity: usize,
    slab_size: usize,
    used: AtomicUsize,
    free: TaggedLifo<FreeSlab>,
}

unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}

impl Arena {
    /// Reserves `total_size` bytes (rounded down to a multiple of
    /// `slab_size`) aligned to `slab_size`. `slab_size` is rounded up to a
    /// power of two no smaller than [`MIN_SLAB_SIZE`].
    pub fn new(total_size: usize, slab_size: usize) -> Option<Self> {
        let slab_size = slab_size.max(MIN_SLAB_SIZE).next_power_of_two();
        let capacity = (total_size / slab_size) * slab_size;
        if capacity == 0 {
            return None;
        }
        let base = unsafe { platform::map_aligned(capacity, slab_size) };
        if base.is_null() {
            return None;
        }
        Some(Self {
            base,
            capacity,
            slab_size,
            used: AtomicUsize::new(0),
            free: TaggedLifo::new(),
        })
    }

    pub fn slab_size(&self) -> usize {
        self.slab_size
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn used(&self) -> usize {
        self.used.load(Ordering::Relaxed)
    }

    /// Hands out one slab, or `None` if the arena is exhausted.
    pub fn alloc(&self) -> Option<*mut u8> {
        if let Some(slab) = self.free.pop() {
            return Some(slab as *mut u8);
        }
        let used = self.used.fetch_add(self.slab_size, Ordering::AcqRel) + self.slab_size;
        if used <= self.capacity {
            Some(unsafe { self.base.add(used - self.slab_size) })
        } else {
            self.used.fetch_sub(self.slab_size, Ordering::AcqRel);
            None
        }
    }

    /// Returns a slab previously obtained from [`Arena::alloc`].
    ///
    /// # Safety
    /// `ptr` must have come from this arena's `alloc` and not already be
    /// freed.
    pub unsafe fn free(&self, ptr: *mut u8) {
        debug_assert_eq!((ptr as usize) % self.slab_size.min(1 << 16), 0);
        unsafe { self.free.push(ptr as *mut FreeSlab) };
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        unsafe { platform::unmap(self.base, self.capacity) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_are_slab_aligned_and_bounded() {
        let arena = Arena::new(8 * MIN_SLAB_SIZE, MIN_SLAB_SIZE).unwrap();
        let mut slabs = std::vec::Vec::new();
        for _ in 0..8 {
            let s = arena.alloc().expect("slab");
            assert_eq!((s as usize) % MIN_SLAB_SIZE, 0);
            slabs.push(s);
        }
        assert!(arena.alloc().is_none());
        assert!(arena.used() <= 8 * MIN_SLAB_SIZE);

        for s in slabs.drain(..) {
            unsafe { arena.free(s) };
        }
        // Freed slabs are reused rather than growing `used` further.
        let used_before = arena.used();
        let s = arena.alloc().expect("reused slab");
        assert_eq!(arena.used(), used_before);
        unsafe { arena.free(s) };
    }

    #[test]
    fn rejects_zero_capacity() {
        assert!(Arena::new(0, MIN_SLAB_SIZE).is_none());
    }
}
