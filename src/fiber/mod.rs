//! Cooperative fibers and the per-CPU scheduler loop that runs them.

pub mod context;
pub mod pool;
pub mod worker;

pub use context::Context;
pub use pool::{Fiber, FiberPool};
pub use worker::Worker;
