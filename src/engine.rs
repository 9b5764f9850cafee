//! Engine Module
//!
//! The database facade that wires the core components together.
//!
//! ## Responsibilities
//! - Own the store, the concurrency controller and the commit coordinator
//! - Expose put / write / get / get_version / delete / commit
//! - Route protocol commands for the network layer

use std::fmt::Debug;
use std::fs;
use std::hash::Hash;
use std::sync::Arc;

use crate::commit::{CommitCoordinator, CommitLogSink, CommitReport, DurabilitySink, MemorySink};
use crate::config::Config;
use crate::error::Result;
use crate::mvcc::ConcurrencyController;
use crate::protocol::Command;
use crate::record::{Version, VersionedRecord};
use crate::store::{KeyedVersionStore, Snapshot};

/// A versioned key-value database with optimistic concurrency control
///
/// ## Concurrency Model: per-key writers, lock-free-to-writers readers
///
/// - **Writes** (put/write/delete): serialized per key by the controller's
///   exclusion regions. Writers to different keys run in parallel.
/// - **Reads** (get/get_version): never wait for writers' exclusion
///   regions, only for the store's short internal locks.
/// - **Commit**: snapshots under a brief store-wide gate, then talks to the
///   sink without blocking writers.
///
/// All methods take `&self`; share a `Database` across threads with `Arc`.
pub struct Database<K, V> {
    /// Engine configuration
    config: Config,

    /// Authoritative version histories
    store: Arc<KeyedVersionStore<K, V>>,

    /// OCC validation around writes
    controller: ConcurrencyController<K, V>,

    /// Atomic hand-off to the durability sink
    coordinator: CommitCoordinator<K, V>,
}

impl<K, V> Database<K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    /// Create a database that commits into `sink`
    pub fn new(config: Config, sink: Arc<dyn DurabilitySink<K, V>>) -> Result<Self> {
        Self::with_first_commit_id(config, sink, 1)
    }

    /// Like `new`, with commit ids continuing from an existing sink
    pub fn with_first_commit_id(
        config: Config,
        sink: Arc<dyn DurabilitySink<K, V>>,
        first_commit_id: u64,
    ) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(KeyedVersionStore::new());
        let controller = ConcurrencyController::new(Arc::clone(&store), config.lock_strategy);
        let coordinator = CommitCoordinator::starting_at(Arc::clone(&store), sink, first_commit_id);

        Ok(Self {
            config,
            store,
            controller,
            coordinator,
        })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Latest value of `key`
    pub fn get(&self, key: &K) -> Option<V> {
        let value = self.controller.read(key).map(VersionedRecord::into_value);
        tracing::debug!(
            "Get key {:?}: {}",
            key,
            if value.is_some() { "found" } else { "absent" }
        );
        value
    }

    /// Latest record (value and version) of `key`
    pub fn get_record(&self, key: &K) -> Option<VersionedRecord<V>> {
        self.controller.read(key)
    }

    /// Value of `key` at exactly `version`
    ///
    /// `Ok(None)` for unknown keys or versions; `InvalidVersion` if negative.
    pub fn get_version(&self, key: &K, version: i64) -> Result<Option<V>> {
        let value = self
            .store
            .get_at(key, version)?
            .map(VersionedRecord::into_value);
        tracing::debug!(
            "Get key {:?} at version {}: {}",
            key,
            version,
            if value.is_some() { "found" } else { "absent" }
        );
        Ok(value)
    }

    /// Current version of `key`, 0 if absent
    pub fn latest_version(&self, key: &K) -> Version {
        self.store.latest_version(key)
    }

    /// Every retained version of `key`, oldest first
    pub fn history(&self, key: &K) -> Vec<VersionedRecord<V>> {
        self.store.history(key)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Write against the version current at call time
    ///
    /// The read and the write are separate steps, so a concurrent writer
    /// can still slip in between and cause `VersionConflict`. Callers must be
    /// ready to retry (or use `update`).
    pub fn put(&self, key: K, value: V) -> Result<VersionedRecord<V>> {
        let expected = self
            .controller
            .read(&key)
            .map(|record| record.version())
            .unwrap_or(0);
        tracing::debug!("Put key {:?} expecting version {}", key, expected);
        self.controller.write(key, value, expected)
    }

    /// Write only if the stored version equals `expected_version`
    pub fn write(&self, key: K, value: V, expected_version: Version) -> Result<VersionedRecord<V>> {
        self.controller.write(key, value, expected_version)
    }

    /// Read-modify-write with retry on conflict
    ///
    /// `f` receives the current value (if any) and may run several times.
    /// Gives up with the last `VersionConflict` after
    /// `config.max_update_retries` retries.
    pub fn update<F>(&self, key: K, mut f: F) -> Result<VersionedRecord<V>>
    where
        F: FnMut(Option<&V>) -> V,
    {
        let mut attempt = 0;
        loop {
            let current = self.controller.read(&key);
            let expected = current.as_ref().map(|r| r.version()).unwrap_or(0);
            let value = f(current.as_ref().map(|r| r.value()));

            match self.controller.write(key.clone(), value, expected) {
                Err(e) if e.is_conflict() && attempt < self.config.max_update_retries => {
                    attempt += 1;
                    tracing::debug!("Update of key {:?} conflicted, retry {}", key, attempt);
                }
                result => return result,
            }
        }
    }

    /// Erase `key` and all its versions. Idempotent.
    pub fn delete(&self, key: &K) -> Result<()> {
        self.controller.delete(key);
        Ok(())
    }

    // =========================================================================
    // Commit
    // =========================================================================

    /// Hand all changes since the last commit to the sink as one batch
    pub fn commit(&self) -> Result<CommitReport> {
        self.coordinator.commit()
    }

    /// Point-in-time copy of every key's latest record
    pub fn snapshot(&self) -> Snapshot<K, V> {
        self.store.snapshot()
    }

    /// Keys a commit issued now would hand to the sink
    pub fn pending_changes(&self) -> usize {
        self.coordinator.pending_count()
    }

    /// Id of the most recent successful commit, 0 if none
    pub fn last_commit_id(&self) -> u64 {
        self.coordinator.last_commit_id()
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Number of keys with a history
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Exclusion regions allocated so far
    pub fn region_count(&self) -> usize {
        self.controller.region_count()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl<K, V> Database<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Database committing into a fresh `MemorySink`, returned alongside
    pub fn in_memory(config: Config) -> Result<(Self, Arc<MemorySink<K, V>>)> {
        let sink = Arc::new(MemorySink::new());
        let db = Self::new(config, Arc::clone(&sink) as Arc<dyn DurabilitySink<K, V>>)?;
        Ok((db, sink))
    }
}

/// Result of executing a protocol command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Value found by GET / GET_VERSION
    Value(Vec<u8>),

    /// Nothing stored under that key (or version)
    Missing,

    /// Version installed by PUT / WRITE
    Version(Version),

    /// DELETE done
    Deleted,

    /// COMMIT outcome
    Committed(CommitReport),

    Pong,
}

impl Database<Vec<u8>, Vec<u8>> {
    /// Open a byte-keyed database that commits into `{data_dir}/commits.log`
    ///
    /// The store always starts empty: batches already in the log are not
    /// loaded back. Only the commit id sequence carries over, so new frames
    /// continue after the last logged one.
    ///
    /// On startup:
    /// 1. Create the data directory
    /// 2. Open the commit log (cutting off a torn tail)
    /// 3. Continue commit ids after the last logged batch
    pub fn open(config: Config) -> Result<Self> {
        // Step 1: Data directory
        fs::create_dir_all(&config.data_dir)?;

        // Step 2: Commit log
        let sink = CommitLogSink::open(&config.commit_log_path(), config.log_sync)?;
        let last_commit_id = sink.last_commit_id();
        if last_commit_id > 0 {
            tracing::info!(
                "Commit log {} ends at commit {}",
                sink.path().display(),
                last_commit_id
            );
        }

        // Step 3: Wire up
        let sink: Arc<dyn DurabilitySink<Vec<u8>, Vec<u8>>> = Arc::new(sink);
        Self::with_first_commit_id(config, sink, last_commit_id + 1)
    }

    /// Execute a command
    ///
    /// Routes commands to appropriate handlers
    pub fn execute(&self, command: Command) -> Result<Reply> {
        match command {
            Command::Get { key } => Ok(self.get(&key).map(Reply::Value).unwrap_or(Reply::Missing)),
            Command::GetVersion { key, version } => Ok(self
                .get_version(&key, version)?
                .map(Reply::Value)
                .unwrap_or(Reply::Missing)),
            Command::Put { key, value } => {
                let record = self.put(key, value)?;
                Ok(Reply::Version(record.version()))
            }
            Command::Write {
                key,
                value,
                expected,
            } => {
                let record = self.write(key, value, expected)?;
                Ok(Reply::Version(record.version()))
            }
            Command::Delete { key } => {
                self.delete(&key)?;
                Ok(Reply::Deleted)
            }
            Command::Commit => Ok(Reply::Committed(self.commit()?)),
            Command::Ping => Ok(Reply::Pong),
        }
    }
}
