//! Userspace work-stealing job system on cooperative fibers, and the
//! memory infrastructure it stands on: a virtual-memory slab arena, a
//! per-worker buddy cache, an offset/free-list heap for variable-size
//! logical ranges, a fiber-local region allocator, a fixed-size
//! slab-object pool, and a generational resource-handle slab.
//!
//! Out of scope: rendering, asset pipelines, file-format decoding,
//! window/input, graphics-API bindings, garbage collection, preemption,
//! and cross-machine/cross-process coordination. This crate schedules
//! work on the local machine and gets out of the way.

pub mod alloc;
pub mod channel;
pub mod fiber;
pub mod future;
pub mod io;
pub mod job;
pub mod platform;
pub mod runtime;
pub mod sync;
pub mod timer;

pub use channel::Channel;
pub use future::Future;
pub use job::{run_jobs, JobDescriptor};
pub use runtime::{Runtime, RuntimeConfig, RuntimeError};
