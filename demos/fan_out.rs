//! Submits a batch of jobs across every worker and waits for the whole
//! batch to finish, the smallest end-to-end demonstration of the job
//! system: `Runtime::init`, `run_jobs`, `Future::wait`, `Runtime::shutdown`.

use cordrt::{run_jobs, JobDescriptor, Runtime, RuntimeConfig};
use std::sync::atomic::{AtomicI64, Ordering};

fn square(data: *mut ()) -> i64 {
    let n = data as usize as i64;
    n * n
}

fn main() {
    env_logger::init();

    let runtime = Runtime::init(RuntimeConfig::default()).expect("failed to start cordrt");

    let total = AtomicI64::new(0);
    let inputs: Vec<i64> = (1..=64).collect();
    let jobs: Vec<JobDescriptor> = inputs
        .iter()
        .map(|&n| JobDescriptor {
            func: square,
            data: n as usize as *mut (),
        })
        .collect();
    let mut results = vec![0i64; jobs.len()];

    let future = run_jobs(&jobs, Some(&mut results));
    future.wait(0);

    for r in &results {
        total.fetch_add(*r, Ordering::Relaxed);
    }
    println!(
        "sum of squares 1..=64 computed across {} jobs: {}",
        jobs.len(),
        total.load(Ordering::Relaxed)
    );

    runtime.shutdown();
}
