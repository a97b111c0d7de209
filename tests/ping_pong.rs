//! Two fibers handing a token back and forth over a pair of channels —
//! the classic scheduler liveness check: every yield must eventually be
//! answered by a resume from the peer side, not from the scheduler
//! auto-requeuing either fiber.

mod common;

use cordrt::{run_jobs, Channel, JobDescriptor};

struct Link {
    to_pong: Channel<i32>,
    to_ping: Channel<i32>,
}

struct Side<'a> {
    link: &'a Link,
    rounds: i32,
}

fn ping(data: *mut ()) -> i64 {
    let side = unsafe { &*(data as *const Side) };
    let mut value = 0;
    for _ in 0..side.rounds {
        side.link.to_pong.put(value);
        value = side.link.to_ping.get().expect("pong closed early");
    }
    value as i64
}

fn pong(data: *mut ()) -> i64 {
    let side = unsafe { &*(data as *const Side) };
    let mut value = 0;
    for _ in 0..side.rounds {
        value = side.link.to_pong.get().expect("ping closed early");
        side.link.to_ping.put(value + 1);
    }
    value as i64
}

#[test]
fn token_advances_by_exactly_one_per_round() {
    common::init_runtime();

    let link = Link {
        to_pong: Channel::new(1),
        to_ping: Channel::new(1),
    };
    let rounds = 200;
    let ping_side = Side {
        link: &link,
        rounds,
    };
    let pong_side = Side {
        link: &link,
        rounds,
    };

    let jobs = [
        JobDescriptor {
            func: ping,
            data: &ping_side as *const Side as *mut (),
        },
        JobDescriptor {
            func: pong,
            data: &pong_side as *const Side as *mut (),
        },
    ];
    let mut results = [0i64; 2];
    let future = run_jobs(&jobs, Some(&mut results));
    future.wait(0);

    assert_eq!(results[0], rounds as i64);
    assert_eq!(results[1], rounds as i64 - 1);
}
