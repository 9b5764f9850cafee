//! Commit Tests
//!
//! Tests verify:
//! - Batches contain only changes since the last successful commit
//! - Deleted keys are handed over as removals
//! - Sink failure leaves store and watermark untouched
//! - Commit log framing, read-back, corruption and torn-tail handling

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use optikv::commit::{
    CommitBatch, CommitCoordinator, CommitLogReader, CommitLogSink, DurabilitySink, MemorySink,
    FRAME_HEADER_SIZE,
};
use optikv::store::KeyedVersionStore;
use optikv::{KvError, LogSyncStrategy, VersionedRecord};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

type Store = KeyedVersionStore<String, String>;

fn k(s: &str) -> String {
    s.to_string()
}

fn setup_memory() -> (
    Arc<Store>,
    Arc<MemorySink<String, String>>,
    CommitCoordinator<String, String>,
) {
    let store = Arc::new(Store::new());
    let sink = Arc::new(MemorySink::new());
    let coordinator = CommitCoordinator::new(
        Arc::clone(&store),
        Arc::clone(&sink) as Arc<dyn DurabilitySink<String, String>>,
    );
    (store, sink, coordinator)
}

/// Sink that fails while `failing` is set
struct FlakySink {
    failing: AtomicBool,
    inner: MemorySink<String, String>,
}

impl DurabilitySink<String, String> for FlakySink {
    fn persist(&self, batch: &CommitBatch<String, String>) -> optikv::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(KvError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk unavailable",
            )));
        }
        self.inner.persist(batch)
    }
}

fn batch(commit_id: u64, written: &[(&str, u64, &str)], removed: &[&str]) -> CommitBatch<Vec<u8>, Vec<u8>> {
    CommitBatch {
        commit_id,
        written: written
            .iter()
            .map(|(key, version, value)| {
                (
                    key.as_bytes().to_vec(),
                    VersionedRecord::new(*version, value.as_bytes().to_vec()),
                )
            })
            .collect(),
        removed: removed.iter().map(|key| key.as_bytes().to_vec()).collect(),
    }
}

// =============================================================================
// Coordinator Tests
// =============================================================================

#[test]
fn test_commit_with_nothing_pending_skips_sink() {
    let (_store, sink, coordinator) = setup_memory();

    let report = coordinator.commit().unwrap();

    assert!(report.is_empty());
    assert_eq!(report.commit_id, None);
    assert_eq!(sink.batch_count(), 0);
    assert_eq!(coordinator.last_commit_id(), 0);
}

#[test]
fn test_first_commit_hands_over_latest_records() {
    let (store, sink, coordinator) = setup_memory();
    store.append(k("a"), k("a1"));
    store.append(k("a"), k("a2"));
    store.append(k("b"), k("b1"));

    let report = coordinator.commit().unwrap();

    assert_eq!(report.commit_id, Some(1));
    assert_eq!(report.written, 2);
    assert_eq!(report.removed, 0);

    let batches = sink.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].commit_id, 1);
    assert_eq!(batches[0].written.get(&k("a")), Some(&VersionedRecord::new(2, k("a2"))));
    assert_eq!(batches[0].written.get(&k("b")), Some(&VersionedRecord::new(1, k("b1"))));
}

#[test]
fn test_second_commit_only_contains_new_writes() {
    let (store, sink, coordinator) = setup_memory();
    store.append(k("a"), k("a1"));
    store.append(k("b"), k("b1"));
    coordinator.commit().unwrap();

    store.append(k("b"), k("b2"));
    store.append(k("c"), k("c1"));
    let report = coordinator.commit().unwrap();

    assert_eq!(report.commit_id, Some(2));
    assert_eq!(report.written, 2);
    let second = &sink.batches()[1];
    assert!(!second.written.contains_key(&k("a")));
    assert_eq!(second.written.get(&k("b")).map(|r| r.version()), Some(2));
    assert_eq!(second.written.get(&k("c")).map(|r| r.version()), Some(1));
}

#[test]
fn test_deleted_key_is_committed_as_removal() {
    let (store, sink, coordinator) = setup_memory();
    store.append(k("a"), k("a1"));
    store.append(k("b"), k("b1"));
    coordinator.commit().unwrap();

    store.remove(&k("a"));
    let report = coordinator.commit().unwrap();

    assert_eq!(report.removed, 1);
    assert_eq!(report.written, 0);
    assert_eq!(sink.batches()[1].removed, vec![k("a")]);

    let durable = sink.durable_state();
    assert!(!durable.contains_key(&k("a")));
    assert!(durable.contains_key(&k("b")));
}

#[test]
fn test_uncommitted_key_deleted_before_commit_is_not_sent() {
    let (store, sink, coordinator) = setup_memory();
    store.append(k("temp"), k("x"));
    store.remove(&k("temp"));

    let report = coordinator.commit().unwrap();

    assert!(report.is_empty());
    assert_eq!(sink.batch_count(), 0);
}

#[test]
fn test_recreated_key_at_same_version_is_pending() {
    let (store, sink, coordinator) = setup_memory();
    store.append(k("a"), k("old"));
    coordinator.commit().unwrap();

    // Back at version 1, but a different life of the key
    store.remove(&k("a"));
    store.append(k("a"), k("new"));
    assert_eq!(coordinator.pending_count(), 1);

    coordinator.commit().unwrap();
    assert_eq!(
        sink.durable_state().get(&k("a")),
        Some(&VersionedRecord::new(1, k("new")))
    );
}

#[test]
fn test_sink_failure_keeps_changes_pending() {
    let store = Arc::new(Store::new());
    let sink = Arc::new(FlakySink {
        failing: AtomicBool::new(true),
        inner: MemorySink::new(),
    });
    let coordinator = CommitCoordinator::new(
        Arc::clone(&store),
        Arc::clone(&sink) as Arc<dyn DurabilitySink<String, String>>,
    );
    store.append(k("a"), k("a1"));
    store.append(k("b"), k("b1"));

    let err = coordinator.commit().unwrap_err();

    assert!(matches!(err, KvError::CommitFailure { commit_id: 1, .. }));
    assert_eq!(store.get(&k("a")), Some(VersionedRecord::new(1, k("a1"))));
    assert_eq!(store.len(), 2);
    assert_eq!(coordinator.pending_count(), 2);
    assert_eq!(coordinator.last_commit_id(), 0);

    // Caller retries once the sink recovers; same id, same contents
    sink.failing.store(false, Ordering::SeqCst);
    let report = coordinator.commit().unwrap();
    assert_eq!(report.commit_id, Some(1));
    assert_eq!(report.written, 2);
    assert_eq!(coordinator.pending_count(), 0);
}

#[test]
fn test_commit_ids_can_start_later() {
    let store = Arc::new(Store::new());
    let sink = Arc::new(MemorySink::new());
    let coordinator = CommitCoordinator::starting_at(
        Arc::clone(&store),
        Arc::clone(&sink) as Arc<dyn DurabilitySink<String, String>>,
        42,
    );
    store.append(k("a"), k("x"));

    assert_eq!(coordinator.commit().unwrap().commit_id, Some(42));
    assert_eq!(coordinator.last_commit_id(), 42);
}

// =============================================================================
// Commit Log Tests
// =============================================================================

#[test]
fn test_log_sink_round_trips_batches() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("commits.log");

    {
        let sink = CommitLogSink::open(&path, LogSyncStrategy::EveryCommit).unwrap();
        sink.persist(&batch(1, &[("a", 1, "x"), ("b", 3, "y")], &[])).unwrap();
        sink.persist(&batch(2, &[], &["a"])).unwrap();
    }

    let batches = CommitLogReader::read_all::<Vec<u8>, Vec<u8>>(&path).unwrap();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0], batch(1, &[("a", 1, "x"), ("b", 3, "y")], &[]));
    assert_eq!(batches[1], batch(2, &[], &["a"]));
}

#[test]
fn test_log_sink_reopen_reports_last_commit() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("commits.log");

    {
        let sink = CommitLogSink::open(&path, LogSyncStrategy::OnClose).unwrap();
        assert_eq!(sink.last_commit_id(), 0);
        sink.persist(&batch(1, &[("a", 1, "x")], &[])).unwrap();
        sink.persist(&batch(2, &[("a", 2, "y")], &[])).unwrap();
    }

    let sink = CommitLogSink::open(&path, LogSyncStrategy::OnClose).unwrap();
    assert_eq!(sink.last_commit_id(), 2);
}

#[test]
fn test_log_torn_tail_is_truncated_on_open() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("commits.log");

    {
        let sink = CommitLogSink::open(&path, LogSyncStrategy::EveryCommit).unwrap();
        sink.persist(&batch(1, &[("a", 1, "x")], &[])).unwrap();
    }
    let good_len = fs::metadata(&path).unwrap().len();

    // Simulate a crash in the middle of the next frame
    {
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&2u64.to_le_bytes()).unwrap();
        file.write_all(&[0xAB; 5]).unwrap();
    }

    let mut reader = CommitLogReader::open(&path).unwrap();
    assert!(reader.next_frame().unwrap().is_some());
    assert!(reader.next_frame().unwrap().is_none());
    assert!(reader.is_truncated());
    assert_eq!(reader.valid_len(), good_len);

    let sink = CommitLogSink::open(&path, LogSyncStrategy::EveryCommit).unwrap();
    assert_eq!(sink.last_commit_id(), 1);
    assert_eq!(fs::metadata(&path).unwrap().len(), good_len);

    sink.persist(&batch(2, &[("b", 1, "z")], &[])).unwrap();
    drop(sink);
    let batches = CommitLogReader::read_all::<Vec<u8>, Vec<u8>>(&path).unwrap();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[1].commit_id, 2);
}

#[test]
fn test_log_crc_mismatch_is_corruption() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("commits.log");

    {
        let sink = CommitLogSink::open(&path, LogSyncStrategy::EveryCommit).unwrap();
        sink.persist(&batch(1, &[("a", 1, "hello")], &[])).unwrap();
    }

    // Flip a payload byte
    let mut bytes = fs::read(&path).unwrap();
    bytes[FRAME_HEADER_SIZE] ^= 0xFF;
    fs::write(&path, &bytes).unwrap();

    let err = CommitLogReader::read_all::<Vec<u8>, Vec<u8>>(&path).unwrap_err();
    assert!(matches!(err, KvError::LogCorruption(_)));
}

#[test]
fn test_coordinator_with_log_sink() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("commits.log");

    let store: Arc<KeyedVersionStore<Vec<u8>, Vec<u8>>> = Arc::new(KeyedVersionStore::new());
    let sink = Arc::new(CommitLogSink::open(&path, LogSyncStrategy::EveryCommit).unwrap());
    let coordinator = CommitCoordinator::new(
        Arc::clone(&store),
        Arc::clone(&sink) as Arc<dyn DurabilitySink<Vec<u8>, Vec<u8>>>,
    );

    store.append(b"k".to_vec(), b"v1".to_vec());
    coordinator.commit().unwrap();
    store.append(b"k".to_vec(), b"v2".to_vec());
    coordinator.commit().unwrap();

    let batches = CommitLogReader::read_all::<Vec<u8>, Vec<u8>>(&path).unwrap();
    assert_eq!(batches.len(), 2);
    assert_eq!(
        batches[1].written.get(&b"k".to_vec()),
        Some(&VersionedRecord::new(2, b"v2".to_vec()))
    );
}
