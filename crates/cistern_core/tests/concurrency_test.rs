//! Integration tests for the concurrent pools and the observable collection.

use cistern_core::{
    ArrayPoolConfig, BoundedSharedCache, CollectionChange, ConcurrentArrayPool,
    ConcurrentObjectPool, ExecutionContext, NotifySink, ObservableCollection, QueueDispatcher,
    ReleaseOutcome,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const THREADS: usize = 8;
const PER_THREAD: usize = 500;

#[test]
fn test_concurrent_pushes_are_linearizable() {
    let items = Arc::new(ObservableCollection::new());
    let announced = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&announced);
    items.subscribe_with(NotifySink::Inline, move |change: &CollectionChange<usize>| {
        if let CollectionChange::Added { items, .. } = change {
            counter.fetch_add(items.len(), Ordering::Relaxed);
        }
    });

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let items = Arc::clone(&items);
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    items.push(t * PER_THREAD + i);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let snapshot = items.to_vec();
    assert_eq!(snapshot.len(), THREADS * PER_THREAD);
    assert_eq!(announced.load(Ordering::Relaxed), THREADS * PER_THREAD);

    let unique: HashSet<_> = snapshot.iter().copied().collect();
    assert_eq!(unique.len(), THREADS * PER_THREAD);

    // Each producer's items keep their relative order.
    for t in 0..THREADS {
        let mine: Vec<_> = snapshot
            .iter()
            .copied()
            .filter(|v| v / PER_THREAD == t)
            .collect();
        assert!(mine.windows(2).all(|pair| pair[0] < pair[1]));
    }
}

#[test]
fn test_added_indices_match_final_positions() {
    let items = Arc::new(ObservableCollection::new());
    let positions = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let log = Arc::clone(&positions);
    items.subscribe_with(NotifySink::Inline, move |change: &CollectionChange<usize>| {
        if let CollectionChange::Added { index, items } = change {
            log.lock().push((*index, items[0]));
        }
    });

    thread::scope(|scope| {
        for t in 0..4 {
            let items = &items;
            scope.spawn(move || {
                for i in 0..100 {
                    items.push(t * 100 + i);
                }
            });
        }
    });

    let snapshot = items.to_vec();
    for (index, value) in positions.lock().iter() {
        assert_eq!(snapshot[*index], *value);
    }
}

#[test]
fn test_producer_consumer_drains_everything() {
    let queue = Arc::new(ObservableCollection::new());
    let total = THREADS * PER_THREAD;

    let consumer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            let mut taken = Vec::with_capacity(total);
            while taken.len() < total {
                match queue.try_take() {
                    Some(value) => taken.push(value),
                    None => thread::yield_now(),
                }
            }
            taken
        })
    };

    thread::scope(|scope| {
        for t in 0..THREADS {
            let queue = &queue;
            scope.spawn(move || {
                for i in 0..PER_THREAD {
                    assert!(queue.try_add(t * PER_THREAD + i));
                }
            });
        }
    });

    let taken = consumer.join().unwrap();
    assert_eq!(taken.len(), total);
    assert_eq!(taken.iter().copied().collect::<HashSet<_>>().len(), total);
    assert!(queue.is_empty());
}

#[test]
fn test_readers_run_alongside_writers() {
    let items = Arc::new(ObservableCollection::from_vec(vec![0_u64; 16]));

    thread::scope(|scope| {
        scope.spawn(|| {
            for i in 0..1_000 {
                items.set(i % 16, i as u64).unwrap();
            }
        });
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..1_000 {
                    assert_eq!(items.len(), 16);
                    let _ = items.get(3);
                }
            });
        }
    });
}

#[test]
fn test_owner_thread_runs_posted_notifications() {
    let items = Arc::new(ObservableCollection::new());
    let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
    let seen = Arc::new(AtomicUsize::new(0));

    let owner = {
        let items = Arc::clone(&items);
        let seen = Arc::clone(&seen);
        thread::spawn(move || {
            let queue = QueueDispatcher::new();
            let counter = Arc::clone(&seen);
            items.subscribe_with(
                NotifySink::Post(queue.handle()),
                move |_change: &CollectionChange<u32>| {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
            );
            ready_tx.send(()).unwrap();

            let mut ran = 0;
            while ran < 3 {
                if queue.run_next(Duration::from_secs(5)) {
                    ran += 1;
                } else {
                    break;
                }
            }
            ran
        })
    };

    ready_rx.recv().unwrap();
    items.push(1);
    items.push(2);
    items.clear();

    assert_eq!(owner.join().unwrap(), 3);
    assert_eq!(seen.load(Ordering::SeqCst), 3);
}

#[test]
fn test_ambient_context_is_per_thread() {
    let items = Arc::new(ObservableCollection::new());
    let queue = QueueDispatcher::new();
    let inline_hits = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&inline_hits);
    items.subscribe(move |_change: &CollectionChange<u8>| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let _context = ExecutionContext::enter(queue.handle());
    items.push(1);

    // No context on this thread: runs inline.
    let other = Arc::clone(&items);
    thread::spawn(move || other.push(2)).join().unwrap();

    assert_eq!(inline_hits.load(Ordering::SeqCst), 1);
    assert_eq!(queue.run_pending(), 1);
    assert_eq!(inline_hits.load(Ordering::SeqCst), 2);
}

#[test]
fn test_concurrent_object_pool_shared_by_threads() {
    let pool = ConcurrentObjectPool::builder(|| Vec::<u32>::with_capacity(64))
        .reset(Vec::clear)
        .max_idle(THREADS)
        .build();

    thread::scope(|scope| {
        for t in 0..THREADS {
            let pool = pool.clone();
            scope.spawn(move || {
                for i in 0..100 {
                    let mut scratch = pool.get();
                    assert!(scratch.get().is_empty());
                    scratch.get_mut().push(t as u32 * 1_000 + i);
                }
            });
        }
    });

    let stats = pool.stats();
    assert_eq!(stats.created + stats.reused, (THREADS * 100) as u64);
    assert!(stats.created <= THREADS as u64);
    assert!(pool.idle_count() <= THREADS);
}

#[test]
fn test_wrapper_sent_to_another_thread_returns_home() {
    let pool = ConcurrentObjectPool::new(String::new);
    let mut wrapper = pool.get();
    wrapper.get_mut().push_str("payload");

    thread::spawn(move || drop(wrapper)).join().unwrap();
    assert_eq!(pool.idle_count(), 1);
}

#[test]
fn test_concurrent_array_pool_reuse_across_threads() {
    let config = ArrayPoolConfig {
        max_per_bucket: THREADS,
        ..ArrayPoolConfig::default()
    };
    let pool = Arc::new(ConcurrentArrayPool::<u8>::with_config(&config).unwrap());

    thread::scope(|scope| {
        for _ in 0..THREADS {
            let pool = Arc::clone(&pool);
            scope.spawn(move || {
                for len in [10, 100, 1_000] {
                    let mut slice = pool.rent_slice(len).unwrap();
                    slice.as_mut_slice().fill(1);
                    assert_eq!(slice.len(), len);
                }
            });
        }
    });

    for capacity in [16, 128, 1024] {
        assert!(pool.idle_count(capacity) >= 1);
        assert!(pool.idle_count(capacity) <= THREADS);
    }
    let stats = pool.stats();
    assert_eq!(stats.rents, (THREADS * 3) as u64);
}

#[test]
fn test_pools_share_an_overflow_tier() {
    let shared = Arc::new(BoundedSharedCache::<u16>::new(4));
    let config = ArrayPoolConfig {
        max_per_bucket: 1,
        ..ArrayPoolConfig::default()
    };
    let first = ConcurrentArrayPool::<u16>::with_shared_cache(&config, shared.clone()).unwrap();
    let second = ConcurrentArrayPool::<u16>::with_shared_cache(&config, shared.clone()).unwrap();

    let a = first.rent(64).unwrap();
    let b = first.rent(64).unwrap();
    assert_eq!(first.release_default(a), ReleaseOutcome::Retained);
    assert_eq!(first.release_default(b), ReleaseOutcome::Overflowed);
    assert_eq!(shared.idle_count(64), 1);

    // The second pool has nothing of its own and is served by the shared tier.
    let served = second.rent(64).unwrap();
    assert_eq!(served.len(), 64);
    assert_eq!(shared.idle_count(64), 0);
    assert_eq!(second.stats().shared_hits, 1);
}
