//! The allocator capability contract: every allocator in this crate is a
//! `&dyn RawAllocator`, never an owned type behind a generic. Components
//! that receive one never own it and never learn anything about it beyond
//! this trait, mirroring the engine's `(instance, realloc fn)` pair.

use core::ptr::NonNull;

/// A single unified allocation entry point, matching the original engine's
/// `realloc`-shaped contract: `ptr == null` allocates, `new_size == 0`
/// frees, and both set means grow/shrink in place or relocate.
pub trait RawAllocator {
    /// # Safety
    /// If `ptr` is `Some`, it must have been returned by a previous call to
    /// this same allocator with size `old_size`.
    unsafe fn realloc(
        &self,
        ptr: Option<NonNull<u8>>,
        old_size: usize,
        new_size: usize,
        align: usize,
    ) -> Option<NonNull<u8>>;

    fn alloc(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
        unsafe { self.realloc(None, 0, size, align) }
    }

    /// # Safety
    /// `ptr` must have been returned by `alloc`/`realloc` on this allocator
    /// with the given `size`/`align`.
    unsafe fn free(&self, ptr: NonNull<u8>, size: usize, align: usize) {
        unsafe {
            self.realloc(Some(ptr), size, 0, align);
        }
    }
}

/// Thin wrapper over the process heap, used as the top-level parent
/// allocator that everything else (arenas, buddy caches) bootstraps from.
pub struct SystemAllocator;

impl RawAllocator for SystemAllocator {
    unsafe fn realloc(
        &self,
        ptr: Option<NonNull<u8>>,
        old_size: usize,
        new_size: usize,
        align: usize,
    ) -> Option<NonNull<u8>> {
        use std::alloc::{alloc, dealloc, realloc, Layout};

        match (ptr, new_size) {
            (None, 0) => None,
            (None, _) => {
                let layout = Layout::from_size_align(new_size, align).ok()?;
                NonNull::new(unsafe { alloc(layout) })
            }
            (Some(p), 0) => {
                let layout = Layout::from_size_align(old_size, align).ok()?;
                unsafe { dealloc(p.as_ptr(), layout) };
                None
            }
            (Some(p), _) => {
                let old_layout = Layout::from_size_align(old_size, align).ok()?;
                NonNull::new(unsafe { realloc(p.as_ptr(), old_layout, new_size) })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_allocator_round_trips() {
        let a = SystemAllocator;
        let p = a.alloc(64, 8).expect("alloc");
        unsafe {
            core::ptr::write_bytes(p.as_ptr(), 0xab, 64);
            a.free(p, 64, 8);
        }
    }
}
