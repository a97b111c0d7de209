//! A producer and a consumer fiber handed off over a bounded channel,
//! the smallest end-to-end demonstration of `Channel` plus the job system.

use cordrt::{run_jobs, Channel, JobDescriptor, Runtime, RuntimeConfig};

struct Args<'a> {
    channel: &'a Channel<i32>,
    count: i32,
}

fn produce(data: *mut ()) -> i64 {
    let args = unsafe { &*(data as *const Args) };
    for i in 0..args.count {
        args.channel.put(i);
    }
    args.count as i64
}

fn consume(data: *mut ()) -> i64 {
    let args = unsafe { &*(data as *const Args) };
    let mut sum = 0i64;
    for _ in 0..args.count {
        sum += args.channel.get().expect("producer closed early") as i64;
    }
    sum
}

fn main() {
    env_logger::init();

    let runtime = Runtime::init(RuntimeConfig::default()).expect("failed to start cordrt");

    let channel = Channel::new(8);
    let count = 1000;
    let producer_args = Args {
        channel: &channel,
        count,
    };
    let consumer_args = Args {
        channel: &channel,
        count,
    };

    let jobs = [
        JobDescriptor {
            func: produce,
            data: &producer_args as *const Args as *mut (),
        },
        JobDescriptor {
            func: consume,
            data: &consumer_args as *const Args as *mut (),
        },
    ];
    let mut results = [0i64; 2];
    let future = run_jobs(&jobs, Some(&mut results));
    future.wait(0);

    println!(
        "consumer summed {} values produced, total = {}",
        results[0], results[1]
    );

    runtime.shutdown();
}
