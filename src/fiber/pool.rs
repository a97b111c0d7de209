//! Fixed-size fiber pages: stack + guard pages + the fiber's own
//! bookkeeping, carved out of the slab arena so every fiber page is 64 KiB
//! aligned and can be linked into a [`TaggedLifo`].

use crate::alloc::arena::Arena;
use crate::alloc::capability::SystemAllocator;
use crate::alloc::region::Region;
use crate::fiber::context::Context;
use crate::job::QueuedJob;
use crate::platform;
use crate::sync::lifo::LifoNode;
use crate::sync::TaggedLifo;

/// State of a single job currently bound to a fiber.
pub struct RunningJob {
    pub descriptor: QueuedJob,
}

#[repr(C, align(65536))]
pub struct Fiber {
    /// Intrusive link; owned exclusively by whichever of the ready list,
    /// free list, or wait list currently holds this fiber.
    lifo_next: *mut Fiber,
    pub(crate) context: Context,
    stack_base: *mut u8,
    stack_size: usize,
    pub(crate) job: Option<RunningJob>,
    pub(crate) scratch: Region<'static>,
    pub(crate) finished: bool,
    pub name: &'static str,
}

unsafe impl LifoNode for Fiber {
    unsafe fn next(node: *mut Self) -> *mut Self {
        unsafe { (*node).lifo_next }
    }
    unsafe fn set_next(node: *mut Self, next: *mut Self) {
        unsafe { (*node).lifo_next = next };
    }
}

unsafe impl Send for Fiber {}

static SYSTEM: SystemAllocator = SystemAllocator;

extern "C" fn fiber_trampoline(_arg: usize) -> ! {
    crate::fiber::worker::run_current_fiber_job();
}

impl Fiber {
    /// `page` is `page_size` bytes, laid out as: the `Fiber` struct itself,
    /// a leading guard page (catches stack overflow growing down past the
    /// usable region), the usable stack, and a trailing guard page at the
    /// very end of the page.
    unsafe fn init_in_place(
        page: *mut u8,
        page_size: usize,
        guard_size: usize,
        name: &'static str,
    ) -> *mut Fiber {
        let fiber_ptr = page as *mut Fiber;
        let meta_end = (core::mem::size_of::<Fiber>() + guard_size - 1) & !(guard_size - 1);
        let stack_base = unsafe { page.add(meta_end + guard_size) };
        let stack_top = unsafe { page.add(page_size - guard_size) };
        let stack_size = page_size - meta_end - 2 * guard_size;

        unsafe extern "C" fn entry(arg: usize) -> ! {
            fiber_trampoline(arg)
        }

        let context = unsafe { crate::fiber::context::make_initial_context(stack_top, entry) };

        unsafe {
            fiber_ptr.write(Fiber {
                lifo_next: core::ptr::null_mut(),
                context,
                stack_base,
                stack_size,
                job: None,
                scratch: Region::new(&SYSTEM),
                finished: false,
                name,
            });
        }
        fiber_ptr
    }
}

/// Owns the arena-backed pages for every fiber plus the free list of
/// fibers not currently running.
pub struct FiberPool {
    arena: Arena,
    free: TaggedLifo<Fiber>,
}

impl FiberPool {
    pub fn new(num_fibers: usize, stack_size: usize) -> Option<Self> {
        let page_size = stack_size.max(crate::alloc::arena::MIN_SLAB_SIZE);
        let arena = Arena::new(num_fibers * page_size, page_size)?;
        let pool = Self {
            arena,
            free: TaggedLifo::new(),
        };
        const GUARD_SIZE: usize = 4096;
        let page_size = pool.arena.slab_size();
        let meta_end = (core::mem::size_of::<Fiber>() + GUARD_SIZE - 1) & !(GUARD_SIZE - 1);
        for _ in 0..num_fibers {
            let page = pool.arena.alloc()?;
            guard_page_boundaries(page, page_size, meta_end, GUARD_SIZE);
            let fiber = unsafe { Fiber::init_in_place(page, page_size, GUARD_SIZE, "fiber") };
            unsafe { pool.free.push(fiber) };
        }
        Some(pool)
    }

    pub fn acquire(&self) -> Option<*mut Fiber> {
        self.free.pop()
    }

    /// # Safety
    /// `fiber` must not currently be referenced from any ready/wait list.
    pub unsafe fn release(&self, fiber: *mut Fiber) {
        unsafe {
            (*fiber).job = None;
            (*fiber).scratch.reset();
            self.free.push(fiber);
        }
    }
}

/// Installs guard pages on both sides of the usable stack region within
/// `page`, best-effort: failure to protect is logged but not fatal, since
/// an unguarded stack only loses the overflow diagnostic, not correctness.
pub(crate) fn guard_page_boundaries(page: *mut u8, page_size: usize, meta_end: usize, guard_size: usize) {
    unsafe {
        let leading = page.add(meta_end);
        if !platform::guard(leading, guard_size) {
            log::warn!("failed to install leading fiber guard page");
        }
        let trailing = page.add(page_size - guard_size);
        if !platform::guard(trailing, guard_size) {
            log::warn!("failed to install trailing fiber guard page");
        }
    }
}
