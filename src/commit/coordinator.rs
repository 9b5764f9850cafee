//! Commit Coordinator
//!
//! Defines the atomic unit of durability.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{KvError, Result};
use crate::record::Version;
use crate::store::{KeyedVersionStore, Snapshot};

use super::{CommitBatch, DurabilitySink};

/// Outcome of a `commit` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitReport {
    /// Id of the persisted batch; `None` when nothing was pending
    pub commit_id: Option<u64>,

    /// Keys whose latest record was handed to the sink
    pub written: usize,

    /// Keys handed to the sink as removed
    pub removed: usize,

    /// Store generation the batch was cut at
    pub generation: u64,
}

impl CommitReport {
    pub fn is_empty(&self) -> bool {
        self.commit_id.is_none()
    }
}

/// What the last successful commit handed to the sink, per key
struct Watermark<K> {
    next_commit_id: u64,

    /// key → (incarnation, version) as of the last successful commit
    committed: HashMap<K, (u64, Version)>,
}

/// Cuts snapshots of the store and hands pending changes to a sink
///
/// ## Concurrency:
/// - `watermark` mutex serializes commits against each other only.
/// - No per-key exclusion region is held; writers keep running while the
///   sink does I/O. Changes made after the snapshot belong to the next
///   commit.
pub struct CommitCoordinator<K, V> {
    store: Arc<KeyedVersionStore<K, V>>,
    sink: Arc<dyn DurabilitySink<K, V>>,
    watermark: Mutex<Watermark<K>>,
}

impl<K, V> CommitCoordinator<K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    pub fn new(store: Arc<KeyedVersionStore<K, V>>, sink: Arc<dyn DurabilitySink<K, V>>) -> Self {
        Self::starting_at(store, sink, 1)
    }

    /// Coordinator whose first batch carries `first_commit_id`
    pub fn starting_at(
        store: Arc<KeyedVersionStore<K, V>>,
        sink: Arc<dyn DurabilitySink<K, V>>,
        first_commit_id: u64,
    ) -> Self {
        Self {
            store,
            sink,
            watermark: Mutex::new(Watermark {
                next_commit_id: first_commit_id.max(1),
                committed: HashMap::new(),
            }),
        }
    }

    /// Hand every change since the last successful commit to the sink
    ///
    /// Steps:
    /// 1. Take a consistent snapshot of the store
    /// 2. Diff it against the watermark into one batch
    /// 3. Persist the batch (skipped when empty)
    /// 4. On success only, advance the watermark to the snapshot
    pub fn commit(&self) -> Result<CommitReport> {
        let mut watermark = self.watermark.lock();

        // Step 1: Consistent cut
        let snapshot = self.store.snapshot();

        // Step 2: Pending changes
        let commit_id = watermark.next_commit_id;
        let batch = Self::pending_batch(&watermark.committed, &snapshot, commit_id);

        if batch.is_empty() {
            tracing::debug!("Commit skipped: no pending changes");
            return Ok(CommitReport {
                commit_id: None,
                written: 0,
                removed: 0,
                generation: snapshot.generation(),
            });
        }

        // Step 3: Hand off
        if let Err(e) = self.sink.persist(&batch) {
            tracing::warn!("Commit {} rejected by sink: {}", commit_id, e);
            return Err(KvError::CommitFailure {
                commit_id,
                source: Box::new(e),
            });
        }

        // Step 4: Advance
        watermark.committed = snapshot
            .iter()
            .map(|(key, entry)| (key.clone(), (entry.incarnation, entry.record.version())))
            .collect();
        watermark.next_commit_id += 1;

        tracing::info!(
            "Commit {} persisted: {} written, {} removed",
            commit_id,
            batch.written.len(),
            batch.removed.len()
        );

        Ok(CommitReport {
            commit_id: Some(commit_id),
            written: batch.written.len(),
            removed: batch.removed.len(),
            generation: snapshot.generation(),
        })
    }

    /// Number of keys a commit issued now would hand to the sink
    pub fn pending_count(&self) -> usize {
        let watermark = self.watermark.lock();
        let snapshot = self.store.snapshot();
        Self::pending_batch(&watermark.committed, &snapshot, watermark.next_commit_id).len()
    }

    /// Id of the most recent successful commit, 0 if none
    pub fn last_commit_id(&self) -> u64 {
        self.watermark.lock().next_commit_id - 1
    }

    fn pending_batch(
        committed: &HashMap<K, (u64, Version)>,
        snapshot: &Snapshot<K, V>,
        commit_id: u64,
    ) -> CommitBatch<K, V> {
        let written = snapshot
            .iter()
            .filter(|(key, entry)| {
                committed.get(*key) != Some(&(entry.incarnation, entry.record.version()))
            })
            .map(|(key, entry)| (key.clone(), entry.record.clone()))
            .collect();

        let removed = committed
            .keys()
            .filter(|key| !snapshot.contains_key(key))
            .cloned()
            .collect();

        CommitBatch {
            commit_id,
            written,
            removed,
        }
    }
}
