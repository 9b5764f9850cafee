//! Commit Module
//!
//! The atomic boundary between in-memory state and durable storage.
//!
//! ## Responsibilities
//! - Cut consistent snapshots of the store
//! - Track what was last handed to the durability sink (the watermark)
//! - Hand each commit's changes over as one indivisible batch
//! - Leave everything unchanged when the sink fails
//!
//! ## Commit Log Frame Format
//! ```text
//! ┌───────────────┬─────────┬─────────┬──────────────────────┐
//! │ Commit ID (8) │ CRC (4) │ Len (4) │ bincode(CommitBatch) │
//! └───────────────┴─────────┴─────────┴──────────────────────┘
//! ```

mod coordinator;
mod log_sink;
mod sink;

pub use coordinator::{CommitCoordinator, CommitReport};
pub use log_sink::{CommitLogReader, CommitLogSink, LogFrame, FRAME_HEADER_SIZE, MAX_FRAME_PAYLOAD};
pub use sink::{CommitBatch, DurabilitySink, MemorySink};
