//! Fixed-size control-block allocator: a free list threaded through a
//! growing chain of slab pages, the way the engine allocates timers and
//! pending-I/O fences. Each slot's leading word doubles as a tagged
//! `next` pointer when the slot is free or links to the next slab; the
//! low two bits carry the tag, so every slot must be 4-byte aligned.

use crate::alloc::capability::RawAllocator;
use core::mem::size_of;
use core::ptr::NonNull;

const TAG_LIVE: usize = 0;
const TAG_FREE: usize = 1;
const TAG_SLAB_LINK: usize = 2;
const TAG_MASK: usize = 0b11;

const SLAB_BYTES: usize = 16 * 1024;

fn tag_of(word: usize) -> usize {
    word & TAG_MASK
}

fn untag(word: usize) -> usize {
    word & !TAG_MASK
}

/// A pool of fixed-size, 4-byte-aligned objects of type `T`.
pub struct SlabPool<'a, T> {
    parent: &'a dyn RawAllocator,
    object_size: usize,
    free_head: *mut u8,
    bump: *mut u8,
    bump_end: *mut u8,
    _marker: core::marker::PhantomData<T>,
}

unsafe impl<'a, T> Send for SlabPool<'a, T> {}
unsafe impl<'a, T> Sync for SlabPool<'a, T> {}

impl<'a, T> SlabPool<'a, T> {
    pub fn new(parent: &'a dyn RawAllocator) -> Self {
        let object_size = size_of::<T>().max(size_of::<usize>());
        debug_assert_eq!(object_size % 4, 0, "slab objects must be 4-byte aligned");
        Self {
            parent,
            object_size,
            free_head: core::ptr::null_mut(),
            bump: core::ptr::null_mut(),
            bump_end: core::ptr::null_mut(),
            _marker: core::marker::PhantomData,
        }
    }

    /// Returns an uninitialized, exclusively-owned slot. Caller must
    /// initialize it before treating it as a live `T`.
    pub fn alloc(&mut self) -> Option<NonNull<T>> {
        if !self.free_head.is_null() {
            let word = unsafe { *(self.free_head as *const usize) };
            debug_assert_eq!(tag_of(word), TAG_FREE);
            let slot = self.free_head;
            self.free_head = untag(word) as *mut u8;
            return NonNull::new(slot as *mut T);
        }

        loop {
            if self.bump < self.bump_end {
                let slot = self.bump;
                self.bump = unsafe { self.bump.add(self.object_size) };
                return NonNull::new(slot as *mut T);
            }
            self.grow()?;
        }
    }

    /// # Safety
    /// `slot` must have come from this pool's `alloc` and must not already
    /// be freed.
    pub unsafe fn free(&mut self, slot: NonNull<T>) {
        let ptr = slot.as_ptr() as *mut u8;
        unsafe {
            *(ptr as *mut usize) = (self.free_head as usize) | TAG_FREE;
        }
        self.free_head = ptr;
    }

    fn grow(&mut self) -> Option<()> {
        let slab = self.parent.alloc(SLAB_BYTES, 8)?;
        let slots_per_slab = SLAB_BYTES / self.object_size;
        debug_assert!(slots_per_slab >= 2, "object too large for slab size");

        let slab_start = slab.as_ptr();
        let usable_end = unsafe { slab_start.add((slots_per_slab - 1) * self.object_size) };

        // Last slot in the slab links to the current bump chain instead of
        // being handed out, threading slabs together without a separate
        // slab directory.
        unsafe {
            *(usable_end as *mut usize) = (self.bump as usize) | TAG_SLAB_LINK;
        }

        self.bump = slab_start;
        self.bump_end = usable_end;
        Some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::capability::SystemAllocator;

    #[repr(align(4))]
    struct Obj(u64);

    #[test]
    fn alloc_free_reuses_slots() {
        let mut pool: SlabPool<Obj> = SlabPool::new(&SystemAllocator);
        let a = pool.alloc().unwrap();
        unsafe {
            a.as_ptr().write(Obj(1));
            pool.free(a);
        }
        let b = pool.alloc().unwrap();
        assert_eq!(a, b);
        unsafe { b.as_ptr().write(Obj(2)) };
    }

    #[test]
    fn growth_spans_multiple_slabs() {
        let mut pool: SlabPool<Obj> = SlabPool::new(&SystemAllocator);
        let slots_per_slab = SLAB_BYTES / size_of::<Obj>().max(size_of::<usize>());
        let mut handles = std::vec::Vec::new();
        for i in 0..(slots_per_slab * 3) {
            let h = pool.alloc().expect("alloc");
            unsafe { h.as_ptr().write(Obj(i as u64)) };
            handles.push(h);
        }
        for h in handles {
            unsafe { pool.free(h) };
        }
    }
}
