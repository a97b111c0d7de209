//! Buddy-cache stress scenarios: 10,000 random-sized allocations churned
//! against a single region, asserting every free eventually recombines
//! back into one free block, plus the cross-thread free/collect path
//! (`free_cross_thread`/`collect_pending`) under concurrent load.

use cordrt::alloc::{BuddyCache, SystemAllocator};
use std::sync::Arc;
use std::thread;

/// A tiny deterministic xorshift so this test doesn't pull in a `rand`
/// dependency for one churn loop.
struct Xorshift(u64);

impl Xorshift {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
}

/// 10,000 random sizes in `[16, 4096]`, alternately allocated and freed
/// against a single-threaded cache; every block still outstanding at the
/// end is freed, and the region must then hand out one allocation spanning
/// its whole capacity, proving every split fully recombined.
#[test]
fn ten_thousand_random_sized_allocations_all_recombine_into_one_free_block() {
    let capacity = 1 << 20;
    let cache = BuddyCache::new(&SystemAllocator, capacity, 16).unwrap();
    let region_len = cache.region_len();
    let mut rng = Xorshift(0x9E3779B97F4A7C15);
    let mut live: std::vec::Vec<(core::ptr::NonNull<u8>, usize)> = std::vec::Vec::new();

    for _ in 0..10_000 {
        let do_alloc = live.is_empty() || rng.next() % 2 == 0;
        if do_alloc {
            let size = 16 + (rng.next() % (4096 - 16 + 1)) as usize;
            if let Some(ptr) = cache.alloc(size) {
                assert!(cache.contains(ptr.as_ptr()));
                live.push((ptr, size));
            }
        } else {
            let idx = (rng.next() as usize) % live.len();
            let (ptr, size) = live.swap_remove(idx);
            unsafe { cache.free(ptr, size) };
        }
    }

    for (ptr, size) in live {
        unsafe { cache.free(ptr, size) };
    }

    assert_eq!(cache.region_len(), region_len);
    let whole = cache
        .alloc(region_len)
        .expect("every split should have recombined into one free block spanning the region");
    assert!(cache.contains(whole.as_ptr()));
    unsafe { cache.free(whole, region_len) };
}

#[test]
fn cross_thread_churn_never_grows_the_region() {
    let cache = Arc::new(BuddyCache::new(&SystemAllocator, 1 << 20, 64).unwrap());
    let region_len = cache.region_len();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for _ in 0..500 {
                    let p = cache.alloc(128).expect("region exhausted under churn");
                    unsafe { cache.free_cross_thread(p, 128) };
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
    cache.collect_pending();

    assert_eq!(cache.region_len(), region_len);

    // The region must still be fully reusable after absorbing every
    // cross-thread free.
    let p = cache.alloc(1 << 19).expect("region not fully reclaimed");
    assert!(cache.contains(p.as_ptr()));
}
