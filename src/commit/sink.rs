//! Durability sinks
//!
//! The collaborator a commit hands its batch to.

use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::record::VersionedRecord;

/// Everything that changed between two successful commits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "K: Serialize, V: Serialize",
    deserialize = "K: Deserialize<'de> + Eq + Hash, V: Deserialize<'de>"
))]
pub struct CommitBatch<K, V> {
    /// Monotonically increasing id of the commit carrying this batch
    pub commit_id: u64,

    /// Latest record of every key written since the previous commit
    pub written: HashMap<K, VersionedRecord<V>>,

    /// Keys that were committed before and have since been deleted
    pub removed: Vec<K>,
}

impl<K, V> CommitBatch<K, V> {
    pub fn is_empty(&self) -> bool {
        self.written.is_empty() && self.removed.is_empty()
    }

    /// Number of keys touched by the batch
    pub fn len(&self) -> usize {
        self.written.len() + self.removed.len()
    }
}

// `HashMap` equality needs `K: Eq + Hash`
impl<K, V> PartialEq for CommitBatch<K, V>
where
    K: Eq + Hash,
    V: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.commit_id == other.commit_id
            && self.written == other.written
            && self.removed == other.removed
    }
}

/// External durability collaborator
///
/// `persist` must apply the whole batch or report failure; the coordinator
/// treats any error as "nothing was persisted".
pub trait DurabilitySink<K, V>: Send + Sync {
    fn persist(&self, batch: &CommitBatch<K, V>) -> Result<()>;
}

/// Sink that keeps every batch in memory
pub struct MemorySink<K, V> {
    batches: Mutex<Vec<CommitBatch<K, V>>>,
}

impl<K, V> MemorySink<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
        }
    }

    /// All batches received, oldest first
    pub fn batches(&self) -> Vec<CommitBatch<K, V>> {
        self.batches.lock().clone()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().len()
    }

    /// The key → record state obtained by applying every batch in order
    pub fn durable_state(&self) -> HashMap<K, VersionedRecord<V>> {
        let mut state = HashMap::new();
        for batch in self.batches.lock().iter() {
            for key in &batch.removed {
                state.remove(key);
            }
            for (key, record) in &batch.written {
                state.insert(key.clone(), record.clone());
            }
        }
        state
    }
}

impl<K, V> Default for MemorySink<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> DurabilitySink<K, V> for MemorySink<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn persist(&self, batch: &CommitBatch<K, V>) -> Result<()> {
        self.batches.lock().push(batch.clone());
        Ok(())
    }
}
