//! Memory infrastructure: the virtual-memory slab arena, the per-worker
//! buddy cache built on top of it, the offset/free-list heap for
//! variable-size logical ranges, the fiber-local region allocator, the
//! fixed-size slab-object pool, and the generational handle slab.

pub mod arena;
pub mod buddy;
pub mod capability;
pub mod handle;
pub mod offset_heap;
pub mod region;
pub mod slab_pool;

pub use arena::Arena;
pub use buddy::BuddyCache;
pub use capability::{RawAllocator, SystemAllocator};
pub use handle::{Handle, HandleSlab};
pub use offset_heap::OffsetHeap;
pub use region::Region;
pub use slab_pool::SlabPool;
