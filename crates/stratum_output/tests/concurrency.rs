//! Concurrent settlement tests for `stratum_output`.
//!
//! These tests verify that settlement is an at-most-once transition even
//! when many threads race to resolve or fail the same cell, and that every
//! continuation observes exactly one outcome.

use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use stratum_output::{CellError, CellRegistry, OutputCell};

/// Exactly one of many racing resolvers wins.
#[test]
fn racing_resolvers_settle_once() {
    for _ in 0..50 {
        let (cell, resolver) = OutputCell::<usize>::pending();
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let resolver = resolver.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    if i % 2 == 0 {
                        resolver.resolve(i).is_ok()
                    } else {
                        resolver.fail(CellError::provider_message("lost")).is_ok()
                    }
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().expect("Thread panicked"))
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
        assert!(!cell.state().is_pending());
    }
}

/// Subscribers registered from other threads each run exactly once.
#[test]
fn concurrent_subscribers_run_once() {
    let (cell, resolver) = OutputCell::<u32>::pending();
    let hits = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(5));

    let subscribers: Vec<_> = (0..4)
        .map(|_| {
            let cell = cell.clone();
            let hits = Arc::clone(&hits);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..100 {
                    let hits = Arc::clone(&hits);
                    cell.subscribe(move |outcome| {
                        assert_eq!(outcome.as_ref().ok(), Some(&9));
                        hits.fetch_add(1, Ordering::SeqCst);
                    });
                }
            })
        })
        .collect();

    barrier.wait();
    resolver.resolve(9).expect("first settlement");

    for handle in subscribers {
        handle.join().expect("Thread panicked");
    }
    assert_eq!(hits.load(Ordering::SeqCst), 400);
}

/// Derived cells settle correctly when inputs resolve on different threads.
#[test]
fn combine_across_threads() {
    for _ in 0..50 {
        let (a, ra) = OutputCell::<u64>::pending();
        let (b, rb) = OutputCell::<u64>::pending();
        let sum = a.combine(&b, |x, y| x + y);

        let ta = thread::spawn(move || ra.resolve(40).expect("resolve a"));
        let tb = thread::spawn(move || rb.resolve(2).expect("resolve b"));
        ta.join().expect("Thread panicked");
        tb.join().expect("Thread panicked");

        assert_eq!(sum.state().value(), Some(&42));
    }
}

/// Aborting while another thread resolves never leaves a cell pending.
#[test]
fn abort_races_with_resolution() {
    for _ in 0..50 {
        let registry = CellRegistry::new();
        let cells: Vec<_> = (0..16)
            .map(|_| {
                let (cell, resolver) = OutputCell::<u8>::pending();
                registry.register(&resolver);
                (cell, resolver)
            })
            .collect();

        let resolvers: Vec<_> = cells.iter().map(|(_, r)| r.clone()).collect();
        let worker = thread::spawn(move || {
            for resolver in resolvers {
                let _ = resolver.resolve(1);
            }
        });
        registry.abort("engine stopped");
        worker.join().expect("Thread panicked");

        assert!(cells.iter().all(|(cell, _)| !cell.state().is_pending()));
        assert_eq!(registry.pending(), 0);
    }
}
