//! Fiber-local bump/region allocator. Scratch memory handed out here is
//! never freed individually; it is all released at once when the owning
//! fiber finishes its job (`Region::reset`).

use crate::alloc::capability::RawAllocator;
use core::ptr::NonNull;

const INLINE_CAPACITY: usize = 1024;

struct Page {
    data: NonNull<u8>,
    capacity: usize,
    cursor: usize,
    next: Option<Box<Page>>,
}

impl Page {
    fn bump(&mut self, size: usize, align: usize) -> Option<NonNull<u8>> {
        let base = self.data.as_ptr() as usize;
        let aligned = (base + self.cursor + align - 1) & !(align - 1);
        let end = aligned - base + size;
        if end > self.capacity {
            return None;
        }
        self.cursor = end;
        NonNull::new(aligned as *mut u8)
    }
}

/// A scratch allocator with a small inline buffer and an overflow chain of
/// pages taken from a parent allocator.
pub struct Region<'a> {
    parent: &'a dyn RawAllocator,
    inline: [u8; INLINE_CAPACITY],
    inline_cursor: usize,
    overflow: Option<Box<Page>>,
}

impl<'a> Region<'a> {
    pub fn new(parent: &'a dyn RawAllocator) -> Self {
        Self {
            parent,
            inline: [0u8; INLINE_CAPACITY],
            inline_cursor: 0,
            overflow: None,
        }
    }

    pub fn alloc(&mut self, size: usize, align: usize) -> Option<NonNull<u8>> {
        let base = self.inline.as_mut_ptr() as usize;
        let aligned = (base + self.inline_cursor + align - 1) & !(align - 1);
        let end = aligned - base + size;
        if end <= INLINE_CAPACITY {
            self.inline_cursor = end;
            return NonNull::new(aligned as *mut u8);
        }

        if let Some(page) = &mut self.overflow {
            if let Some(p) = page.bump(size, align) {
                return Some(p);
            }
        }

        let page_size = (size + align).next_power_of_two().max(4096);
        let data = self.parent.alloc(page_size, align)?;
        let mut page = Box::new(Page {
            data,
            capacity: page_size,
            cursor: 0,
            next: self.overflow.take(),
        });
        let result = page.bump(size, align);
        self.overflow = Some(page);
        result
    }

    /// Releases every overflow page and rewinds the inline buffer. Callers
    /// must not dereference any pointer previously returned by `alloc`
    /// after calling this.
    pub fn reset(&mut self) {
        self.inline_cursor = 0;
        let mut page = self.overflow.take();
        while let Some(mut p) = page {
            let next = p.next.take();
            unsafe {
                self.parent.free(p.data, p.capacity, 1);
            }
            page = next;
        }
    }
}

impl Drop for Region<'_> {
    fn drop(&mut self) {
        self.reset();
    }
}
