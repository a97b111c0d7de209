//! Scheduler-path benchmarks: job submission/completion throughput, and
//! channel put/get throughput between fibers, mirroring the memory-layer
//! benchmarks' single/batch/churn shapes applied to the concurrency side
//! of this crate instead.

use cordrt::{run_jobs, Channel, JobDescriptor, Runtime, RuntimeConfig};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::OnceLock;

fn ensure_runtime() {
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        let config = RuntimeConfig {
            worker_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            ..RuntimeConfig::default()
        };
        let rt = Runtime::init(config).expect("runtime init");
        std::mem::forget(rt);
    });
}

fn noop_job(data: *mut ()) -> i64 {
    let counter = data as *const AtomicI64;
    unsafe { (*counter).fetch_add(1, Ordering::Relaxed) }
}

fn bench_job_batch_throughput(c: &mut Criterion) {
    ensure_runtime();
    let batch_sizes: &[usize] = &[16, 256, 4096];
    let mut group = c.benchmark_group("run_jobs_batch");

    for &n in batch_sizes {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("jobs", n), &n, |b, &n| {
            let counter = AtomicI64::new(0);
            let jobs: Vec<JobDescriptor> = (0..n)
                .map(|_| JobDescriptor {
                    func: noop_job,
                    data: &counter as *const AtomicI64 as *mut (),
                })
                .collect();
            b.iter(|| {
                let future = run_jobs(black_box(&jobs), None);
                future.wait(0);
            })
        });
    }
    group.finish();
}

fn bench_channel_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("channel_try_put_get");
    let n = 10_000u64;
    group.throughput(Throughput::Elements(n));

    group.bench_function("capacity_1", |b| {
        let ch: Channel<u64> = Channel::new(1);
        b.iter(|| {
            for i in 0..n {
                ch.try_put(i).unwrap();
                black_box(ch.try_get().unwrap());
            }
        })
    });

    group.bench_function("capacity_64", |b| {
        let ch: Channel<u64> = Channel::new(64);
        b.iter(|| {
            for i in 0..n {
                ch.try_put(i).unwrap();
                black_box(ch.try_get().unwrap());
            }
        })
    });

    group.finish();
}

fn bench_blocking_channel_handoff(c: &mut Criterion) {
    use std::sync::Arc;

    let mut group = c.benchmark_group("blocking_channel_handoff_between_host_threads");
    let n = 2000u64;
    group.throughput(Throughput::Elements(n));

    group.bench_function("capacity_1", |b| {
        b.iter(|| {
            let ch: Arc<Channel<u64>> = Arc::new(Channel::new(1));
            let producer = {
                let ch = Arc::clone(&ch);
                std::thread::spawn(move || {
                    for i in 0..n {
                        ch.put(i);
                    }
                })
            };
            for _ in 0..n {
                black_box(ch.get().unwrap());
            }
            producer.join().unwrap();
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_job_batch_throughput,
    bench_channel_throughput,
    bench_blocking_channel_handoff,
);
criterion_main!(benches);
