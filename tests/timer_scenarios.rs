//! Timer ordering and repeat-count scenarios, run against the real
//! background driver thread rather than the per-module unit tests' single
//! short-lived timers.

mod common;

use cordrt::timer;
use std::time::{Duration, Instant};

#[test]
fn a_shorter_one_shot_fires_before_a_longer_one() {
    common::init_runtime();

    let start = Instant::now();
    let short = timer::after(Duration::from_millis(5));
    let long = timer::after(Duration::from_millis(50));

    short.wait(0);
    let short_elapsed = start.elapsed();
    long.wait(0);
    let long_elapsed = start.elapsed();

    assert!(short_elapsed < long_elapsed);
    assert!(long_elapsed >= Duration::from_millis(45));
}

#[test]
fn repeating_timer_counts_down_to_zero_after_n_fires() {
    common::init_runtime();

    let repeats = 8;
    let future = timer::start(Duration::from_millis(3), repeats).unwrap();
    assert_eq!(future.wait(0), 0);
}
