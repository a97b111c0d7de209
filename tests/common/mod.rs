//! Shared runtime bring-up for integration tests. Each test binary is its
//! own process, so unlike the in-tree unit tests this doesn't need to be
//! reachable from other test files — it just needs to be idempotent
//! within whichever file pulls it in, since `cordrt::Runtime` is a
//! process-wide singleton that can only be initialized once.

use std::sync::OnceLock;

pub fn init_runtime() {
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        let config = cordrt::RuntimeConfig {
            worker_count: 4,
            fibers_per_worker: 16,
            fiber_stack_size: 64 * 1024,
            job_queue_capacity: 1024,
            event_queue_capacity: 256,
        };
        let rt = cordrt::Runtime::init(config).expect("runtime init");
        std::mem::forget(rt);
    });
}
