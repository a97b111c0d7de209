//! Multiple producers racing multiple consumers against a small, frequently
//! full-and-empty `MpmcQueue`, checking the testable property directly:
//! for `P` producers and `C` consumers with `P >= C` each producing the
//! same count, every item is dequeued exactly once and each producer's
//! own items come out in its own order.

use cordrt::sync::MpmcQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

#[test]
fn every_produced_item_is_consumed_exactly_once_in_per_producer_order() {
    const PRODUCERS: usize = 6;
    const PER_PRODUCER: usize = 2000;
    const CONSUMERS: usize = 4;

    // Each item is tagged (producer_id, sequence_within_producer) packed
    // into a single usize so the queue doesn't need a custom element type.
    let queue: Arc<MpmcQueue<(usize, usize)>> = Arc::new(MpmcQueue::new(64));
    let produced = Arc::new(AtomicUsize::new(0));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|id| {
            let queue = Arc::clone(&queue);
            let produced = Arc::clone(&produced);
            thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    let mut item = (id, seq);
                    loop {
                        match queue.push(item) {
                            Ok(()) => break,
                            Err(cordrt::sync::PushError(back)) => {
                                item = back;
                                thread::yield_now();
                            }
                        }
                    }
                }
                produced.fetch_add(PER_PRODUCER, Ordering::Relaxed);
            })
        })
        .collect();

    let total = PRODUCERS * PER_PRODUCER;
    let consumed = Arc::new(AtomicUsize::new(0));
    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let consumed = Arc::clone(&consumed);
            thread::spawn(move || {
                let mut mine: Vec<(usize, usize)> = Vec::new();
                loop {
                    match queue.pop() {
                        Some(item) => {
                            mine.push(item);
                            if consumed.fetch_add(1, Ordering::Relaxed) + 1 >= total {
                                return mine;
                            }
                        }
                        None => {
                            if consumed.load(Ordering::Relaxed) >= total {
                                return mine;
                            }
                            thread::yield_now();
                        }
                    }
                }
            })
        })
        .collect();

    for p in producers {
        p.join().unwrap();
    }
    let mut per_producer_seen: Vec<Vec<usize>> = vec![Vec::new(); PRODUCERS];
    for c in consumers {
        for (id, seq) in c.join().unwrap() {
            per_producer_seen[id].push(seq);
        }
    }

    let total_seen: usize = per_producer_seen.iter().map(Vec::len).sum();
    assert_eq!(total_seen, total);

    for seen in per_producer_seen {
        assert!(
            seen.windows(2).all(|w| w[0] < w[1]),
            "a single producer's items arrived out of order: {seen:?}"
        );
        assert_eq!(seen.len(), PER_PRODUCER);
    }
}
