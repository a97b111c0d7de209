//! Lock-free and spin-based synchronization primitives used throughout the
//! runtime. None of these allocate, and all are safe to use in a `static`.

pub(crate) mod lifo;
mod mpmc;
mod spin;

pub use lifo::TaggedLifo;
pub use mpmc::{MpmcQueue, PushError};
pub use spin::{SpinLock, SpinMutex, SpinMutexGuard};
