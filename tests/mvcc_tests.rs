//! ConcurrencyController Tests
//!
//! Tests verify:
//! - Expected-version validation on write
//! - Conflicts leave state unchanged
//! - Delete semantics and the per-key state machine
//! - No lost updates under contention, for both lock strategies

use std::collections::HashSet;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use optikv::mvcc::ConcurrencyController;
use optikv::store::KeyedVersionStore;
use optikv::{KvError, LockStrategy, VersionedRecord};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_controller(strategy: LockStrategy) -> ConcurrencyController<String, String> {
    ConcurrencyController::new(Arc::new(KeyedVersionStore::new()), strategy)
}

fn k(s: &str) -> String {
    s.to_string()
}

// =============================================================================
// Write Validation Tests
// =============================================================================

#[test]
fn test_write_new_key_expects_zero() {
    let controller = setup_controller(LockStrategy::PerKey);

    let record = controller.write(k("a"), k("v1"), 0).unwrap();

    assert_eq!(record, VersionedRecord::new(1, k("v1")));
    assert_eq!(controller.read(&k("a")), Some(VersionedRecord::new(1, k("v1"))));
}

#[test]
fn test_write_new_key_with_nonzero_expectation_conflicts() {
    let controller = setup_controller(LockStrategy::PerKey);

    let err = controller.write(k("a"), k("v1"), 3).unwrap_err();

    assert!(matches!(
        err,
        KvError::VersionConflict {
            expected: 3,
            actual: 0,
            ..
        }
    ));
    assert_eq!(controller.read(&k("a")), None);
}

#[test]
fn test_chained_writes_increment_version() {
    let controller = setup_controller(LockStrategy::PerKey);

    for expected in 0..20 {
        let record = controller
            .write(k("a"), format!("value{}", expected + 1), expected)
            .unwrap();
        assert_eq!(record.version(), expected + 1);
    }

    let store = controller.store();
    assert_eq!(store.latest_version(&k("a")), 20);
    for i in 1..=20 {
        assert_eq!(
            store.get_at(&k("a"), i).unwrap().unwrap().value(),
            &format!("value{}", i)
        );
    }
}

#[test]
fn test_stale_write_conflicts_and_changes_nothing() {
    let controller = setup_controller(LockStrategy::PerKey);
    controller.write(k("a"), k("first"), 0).unwrap();
    controller.write(k("a"), k("second"), 1).unwrap();

    let err = controller.write(k("a"), k("stale"), 1).unwrap_err();

    match err {
        KvError::VersionConflict {
            key,
            expected,
            actual,
        } => {
            assert!(key.contains('a'));
            assert_eq!(expected, 1);
            assert_eq!(actual, 2);
        }
        other => panic!("expected VersionConflict, got {:?}", other),
    }
    assert_eq!(controller.read(&k("a")), Some(VersionedRecord::new(2, k("second"))));
    assert_eq!(controller.store().history(&k("a")).len(), 2);
}

#[test]
fn test_write_expecting_future_version_conflicts() {
    let controller = setup_controller(LockStrategy::PerKey);
    controller.write(k("a"), k("first"), 0).unwrap();

    let err = controller.write(k("a"), k("x"), 5).unwrap_err();
    assert!(err.is_conflict());
}

// =============================================================================
// Delete Tests
// =============================================================================

#[test]
fn test_delete_then_read_is_absent() {
    let controller = setup_controller(LockStrategy::PerKey);
    controller.write(k("a"), k("v"), 0).unwrap();

    assert!(controller.delete(&k("a")));
    assert_eq!(controller.read(&k("a")), None);
}

#[test]
fn test_delete_absent_key_is_noop() {
    let controller = setup_controller(LockStrategy::PerKey);

    assert!(!controller.delete(&k("ghost")));
    assert!(!controller.delete(&k("ghost")));
}

#[test]
fn test_key_cycles_between_states() {
    let controller = setup_controller(LockStrategy::PerKey);

    for _ in 0..3 {
        // No-History: only expected = 0 is accepted
        assert!(controller.write(k("a"), k("x"), 1).is_err());
        assert_eq!(controller.write(k("a"), k("x"), 0).unwrap().version(), 1);
        assert_eq!(controller.write(k("a"), k("y"), 1).unwrap().version(), 2);

        controller.delete(&k("a"));
        assert_eq!(controller.read(&k("a")), None);
    }
}

#[test]
fn test_regions_are_created_per_key() {
    let controller = setup_controller(LockStrategy::PerKey);
    controller.write(k("a"), k("v"), 0).unwrap();
    controller.write(k("b"), k("v"), 0).unwrap();
    controller.write(k("a"), k("v"), 1).unwrap();
    controller.delete(&k("c"));

    // Regions are never removed, even for deleted or absent keys
    assert_eq!(controller.region_count(), 3);
}

// =============================================================================
// Contention Tests
// =============================================================================

/// M writers each land exactly one write on one key, re-reading and retrying
/// on conflict. Every accepted write must own a distinct expected version.
fn run_contended_writers(strategy: LockStrategy, writers: usize) {
    let controller = Arc::new(setup_controller(strategy));
    let accepted = Arc::new(Mutex::new(Vec::new()));
    let barrier = Arc::new(Barrier::new(writers));

    let mut handles = vec![];
    for t in 0..writers {
        let controller = Arc::clone(&controller);
        let accepted = Arc::clone(&accepted);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            loop {
                let observed = controller.read(&k("counter")).map(|r| r.version()).unwrap_or(0);
                match controller.write(k("counter"), format!("writer{}", t), observed) {
                    Ok(record) => {
                        assert_eq!(record.version(), observed + 1);
                        accepted.lock().unwrap().push(observed);
                        return;
                    }
                    Err(e) => {
                        assert!(e.is_conflict(), "unexpected error: {}", e);
                        thread::yield_now();
                    }
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let accepted = accepted.lock().unwrap();
    let distinct: HashSet<u64> = accepted.iter().copied().collect();
    assert_eq!(accepted.len(), writers);
    assert_eq!(distinct.len(), writers, "two writers committed on the same version");

    let history = controller.store().history(&k("counter"));
    assert_eq!(history.len(), writers);
    let authors: HashSet<&String> = history.iter().map(|r| r.value()).collect();
    assert_eq!(authors.len(), writers, "an update was lost");
}

#[test]
fn test_no_lost_updates_per_key_regions() {
    run_contended_writers(LockStrategy::PerKey, 16);
}

#[test]
fn test_no_lost_updates_sharded_regions() {
    run_contended_writers(LockStrategy::Sharded { shards: 4 }, 16);
}

#[test]
fn test_distinct_keys_write_in_parallel() {
    let controller = Arc::new(setup_controller(LockStrategy::PerKey));

    let mut handles = vec![];
    for t in 0..4 {
        let controller = Arc::clone(&controller);
        handles.push(thread::spawn(move || {
            let key = format!("thread{}", t);
            for expected in 0..50 {
                controller.write(key.clone(), k("v"), expected).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    for t in 0..4 {
        assert_eq!(controller.store().latest_version(&format!("thread{}", t)), 50);
    }
}
