//! Configuration for OptiKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{KvError, Result};

/// Main configuration for an OptiKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for data files
    /// Internal structure:
    ///   {data_dir}/
    ///     └── commits.log      (commit batches handed to the log sink)
    pub data_dir: PathBuf,

    /// Sync strategy for the commit log sink
    pub log_sync: LogSyncStrategy,

    // -------------------------------------------------------------------------
    // Concurrency Configuration
    // -------------------------------------------------------------------------
    /// How writers are mapped onto exclusion regions
    pub lock_strategy: LockStrategy,

    /// Max conflict retries for `Database::update`
    pub max_update_retries: usize,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Threads serving client connections
    pub worker_threads: usize,

    /// Connection read timeout (milliseconds, 0 = none)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds, 0 = none)
    pub write_timeout_ms: u64,
}

/// Mapping from keys to exclusion regions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStrategy {
    /// One region per distinct key, created lazily and never removed
    PerKey,

    /// A fixed pool of regions; keys are assigned by hash
    Sharded { shards: usize },
}

/// Commit log sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSyncStrategy {
    /// fsync after every committed batch
    EveryCommit,

    /// Flush buffers per batch, fsync only on explicit sync or drop
    OnClose,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./optikv_data"),
            log_sync: LogSyncStrategy::EveryCommit,
            lock_strategy: LockStrategy::PerKey,
            max_update_retries: 16,
            listen_addr: "127.0.0.1:7379".to_string(),
            max_connections: 1024,
            worker_threads: 8,
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if let LockStrategy::Sharded { shards: 0 } = self.lock_strategy {
            return Err(KvError::Config(
                "sharded lock strategy needs at least one shard".to_string(),
            ));
        }
        if self.worker_threads == 0 {
            return Err(KvError::Config(
                "worker_threads must be greater than zero".to_string(),
            ));
        }
        if self.max_connections == 0 {
            return Err(KvError::Config(
                "max_connections must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Path of the commit log inside `data_dir`
    pub fn commit_log_path(&self) -> PathBuf {
        self.data_dir.join("commits.log")
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the commit log sync strategy
    pub fn log_sync(mut self, strategy: LogSyncStrategy) -> Self {
        self.config.log_sync = strategy;
        self
    }

    /// Set the lock strategy
    pub fn lock_strategy(mut self, strategy: LockStrategy) -> Self {
        self.config.lock_strategy = strategy;
        self
    }

    /// Set the retry bound for read-modify-write updates
    pub fn max_update_retries(mut self, retries: usize) -> Self {
        self.config.max_update_retries = retries;
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the number of connection worker threads
    pub fn worker_threads(mut self, count: usize) -> Self {
        self.config.worker_threads = count;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
