//! Per-worker power-of-two buddy allocator.
//!
//! Each worker owns one [`BuddyCache`] backed by a single contiguous
//! region. Splits and merges are O(log levels); a parity bitmap records,
//! for each internal node of the buddy tree, whether exactly one of its
//! two children is allocated (in which case the other child is a merge
//! candidate once freed). Frees that originate from a different worker
//! than the one that owns the region go onto that worker's pending list
//! instead of touching the free lists directly, and are merged in later
//! by [`BuddyCache::collect_pending`] once enough has piled up.

use crate::alloc::capability::RawAllocator;
use crate::sync::SpinMutex;
use core::ptr::NonNull;

const MIN_BUDDY_SIZE: usize = 64;
const GC_THRESHOLD: usize = 4096;

#[repr(C)]
struct FreeBlock {
    prev: *mut FreeBlock,
    next: *mut FreeBlock,
}

/// An intrusive doubly-linked list of free blocks, embedded in the freed
/// memory itself.
struct FreeList {
    head: *mut FreeBlock,
}

impl FreeList {
    const fn new() -> Self {
        Self {
            head: core::ptr::null_mut(),
        }
    }

    fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    unsafe fn push(&mut self, block: *mut u8) {
        let node = block as *mut FreeBlock;
        unsafe {
            (*node).prev = core::ptr::null_mut();
            (*node).next = self.head;
            if !self.head.is_null() {
                (*self.head).prev = node;
            }
        }
        self.head = node;
    }

    unsafe fn pop(&mut self) -> Option<*mut u8> {
        if self.head.is_null() {
            return None;
        }
        let node = self.head;
        unsafe {
            self.head = (*node).next;
            if !self.head.is_null() {
                (*self.head).prev = core::ptr::null_mut();
            }
        }
        Some(node as *mut u8)
    }

    /// Removes a specific, currently-linked block from the list.
    unsafe fn remove(&mut self, block: *mut u8) {
        let node = block as *mut FreeBlock;
        unsafe {
            let prev = (*node).prev;
            let next = (*node).next;
            if !prev.is_null() {
                (*prev).next = next;
            } else {
                self.head = next;
            }
            if !next.is_null() {
                (*next).prev = prev;
            }
        }
    }
}

struct Inner {
    data: NonNull<u8>,
    cap: usize,
    min_size: usize,
    nr_levels: u32,
    free_lists: std::vec::Vec<FreeList>,
    /// One bit per internal buddy-tree node; set iff exactly one child is
    /// allocated.
    merge_bits: std::vec::Vec<bool>,
}

impl Inner {
    fn size_at_level(&self, level: u32) -> usize {
        self.cap >> level
    }

    fn block_index(&self, offset: usize, level: u32) -> usize {
        (1usize << level) + offset / self.size_at_level(level) - 1
    }

    fn level_at_size(&self, size: usize) -> u32 {
        if size < self.min_size {
            return self.nr_levels - 1;
        }
        let blocks = (size.next_power_of_two() / self.min_size).max(1);
        self.nr_levels - 1 - blocks.trailing_zeros()
    }

    fn buddy_offset(&self, offset: usize, level: u32) -> usize {
        let size = self.size_at_level(level);
        if self.block_index(offset, level) & 1 == 1 {
            (offset & !(size - 1)) + size
        } else {
            (offset & !(size - 1)).wrapping_sub(size)
        }
    }

    fn alloc_block(&mut self, level: u32) -> Option<usize> {
        if level == 0 {
            return if !self.free_lists[0].is_empty() {
                let p = unsafe { self.free_lists[0].pop() }?;
                Some(self.offset_of(p))
            } else {
                None
            };
        }
        let offset = if !self.free_lists[level as usize].is_empty() {
            let p = unsafe { self.free_lists[level as usize].pop() }?;
            self.offset_of(p)
        } else {
            let parent_offset = self.alloc_block(level - 1)?;
            let buddy = parent_offset + self.size_at_level(level);
            debug_assert!(buddy < self.cap);
            let buddy_ptr = self.ptr_at(buddy);
            unsafe {
                self.free_lists[level as usize].push(buddy_ptr);
            }
            parent_offset
        };
        let index = self.block_index(offset, level - 1);
        self.merge_bits[index] = !self.merge_bits[index];
        Some(offset)
    }

    fn free_block(&mut self, offset: usize, level: u32) {
        if level == 0 {
            return;
        }
        let index = self.block_index(offset, level - 1);
        if self.merge_bits[index] {
            let buddy_offset = self.buddy_offset(offset, level);
            let buddy_ptr = self.ptr_at(buddy_offset);
            unsafe {
                self.free_lists[level as usize].remove(buddy_ptr);
            }
            self.merge_bits[index] = !self.merge_bits[index];
            self.free_block(offset.min(buddy_offset), level - 1);
        } else {
            let ptr = self.ptr_at(offset);
            unsafe {
                self.free_lists[level as usize].push(ptr);
            }
            self.merge_bits[index] = !self.merge_bits[index];
        }
    }

    fn offset_of(&self, ptr: *mut u8) -> usize {
        (ptr as usize) - (self.data.as_ptr() as usize)
    }

    fn ptr_at(&self, offset: usize) -> *mut u8 {
        unsafe { self.data.as_ptr().add(offset) }
    }
}

/// One worker's buddy-allocated region plus the pending list used to
/// absorb frees issued by other workers.
pub struct BuddyCache {
    inner: SpinMutex<Inner>,
    pending: SpinMutex<std::vec::Vec<(usize, u32)>>,
    pending_bytes: core::sync::atomic::AtomicUsize,
}

unsafe impl Send for BuddyCache {}
unsafe impl Sync for BuddyCache {}

impl BuddyCache {
    /// `size` is the total backing region size; `min_size` is the smallest
    /// block the cache will ever hand out (rounded up to a power of two,
    /// minimum 64 bytes).
    pub fn new(parent: &dyn RawAllocator, size: usize, min_size: usize) -> Option<Self> {
        let min_size = min_size.max(MIN_BUDDY_SIZE).next_power_of_two();
        let size = size.next_power_of_two();
        let nr_levels = (size / min_size).ilog2() + 1;
        let num_internal_nodes = 1usize << (nr_levels.saturating_sub(1));

        let data = parent.alloc(size, min_size)?;

        let mut free_lists = std::vec::Vec::with_capacity(nr_levels as usize);
        for _ in 0..nr_levels {
            free_lists.push(FreeList::new());
        }
        let merge_bits = std::vec![false; num_internal_nodes];

        let mut inner = Inner {
            data,
            cap: size,
            min_size,
            nr_levels,
            free_lists,
            merge_bits,
        };

        // Seed level-1 free lists the way the whole region decomposes: the
        // entire region starts as one free block at level 0.
        unsafe {
            inner.free_lists[0].push(inner.data.as_ptr());
        }

        Some(Self {
            inner: SpinMutex::new(inner),
            pending: SpinMutex::new(std::vec::Vec::new()),
            pending_bytes: core::sync::atomic::AtomicUsize::new(0),
        })
    }

    pub fn alloc(&self, size: usize) -> Option<NonNull<u8>> {
        self.collect_pending_if_due();
        let mut inner = self.inner.lock();
        let level = inner.level_at_size(size);
        let offset = inner.alloc_block(level)?;
        NonNull::new(inner.ptr_at(offset))
    }

    /// Frees a block allocated by this same cache.
    ///
    /// # Safety
    /// `ptr`/`size` must have come from a prior `alloc` on this cache.
    pub unsafe fn free(&self, ptr: NonNull<u8>, size: usize) {
        let mut inner = self.inner.lock();
        let level = inner.level_at_size(size);
        let offset = inner.offset_of(ptr.as_ptr());
        inner.free_block(offset, level);
    }

    /// Queues a free for a block that belongs to this cache's region but
    /// is being released from a different worker. Safe to call
    /// concurrently with `alloc`/`free` on the owning worker.
    ///
    /// # Safety
    /// `ptr`/`size` must have come from a prior `alloc` on this cache.
    pub unsafe fn free_cross_thread(&self, ptr: NonNull<u8>, size: usize) {
        let offset = {
            let inner = self.inner.lock();
            inner.offset_of(ptr.as_ptr())
        };
        self.pending.lock().push((offset, size as u32));
        self.pending_bytes
            .fetch_add(size, core::sync::atomic::Ordering::Relaxed);
    }

    fn collect_pending_if_due(&self) {
        if self.pending_bytes.load(core::sync::atomic::Ordering::Relaxed) >= GC_THRESHOLD {
            self.collect_pending();
        }
    }

    /// Merges every queued cross-thread free into the real free lists.
    pub fn collect_pending(&self) {
        let drained: std::vec::Vec<(usize, u32)> = {
            let mut pending = self.pending.lock();
            pending.drain(..).collect()
        };
        if drained.is_empty() {
            return;
        }
        let mut inner = self.inner.lock();
        for (offset, size) in drained {
            let level = inner.level_at_size(size as usize);
            inner.free_block(offset, level);
        }
        self.pending_bytes
            .store(0, core::sync::atomic::Ordering::Relaxed);
    }

    pub fn region_ptr(&self) -> *mut u8 {
        self.inner.lock().data.as_ptr()
    }

    pub fn region_len(&self) -> usize {
        self.inner.lock().cap
    }

    pub fn contains(&self, ptr: *const u8) -> bool {
        let inner = self.inner.lock();
        let base = inner.data.as_ptr() as usize;
        let addr = ptr as usize;
        addr >= base && addr < base + inner.cap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::capability::SystemAllocator;

    #[test]
    fn alloc_respects_level_alignment() {
        let cache = BuddyCache::new(&SystemAllocator, 1 << 20, 64).unwrap();
        let a = cache.alloc(100).unwrap();
        let b = cache.alloc(100).unwrap();
        assert_ne!(a, b);
        unsafe {
            cache.free(a, 100);
            cache.free(b, 100);
        }
    }

    #[test]
    fn repeated_alloc_free_does_not_grow_region() {
        let cache = BuddyCache::new(&SystemAllocator, 1 << 16, 64).unwrap();
        let region_len = cache.region_len();
        for _ in 0..200 {
            let p = cache.alloc(128).unwrap();
            assert!(cache.contains(p.as_ptr()));
            unsafe { cache.free(p, 128) };
        }
        assert_eq!(cache.region_len(), region_len);
    }

    #[test]
    fn cross_thread_free_is_eventually_merged() {
        let cache = BuddyCache::new(&SystemAllocator, 1 << 16, 64).unwrap();
        let p = cache.alloc(64).unwrap();
        unsafe { cache.free_cross_thread(p, 64) };
        cache.collect_pending();
        // Region should be reusable for the same size again without growth.
        let p2 = cache.alloc(64).unwrap();
        assert!(cache.contains(p2.as_ptr()));
        unsafe { cache.free(p2, 64) };
    }
}
