//! Commit log
//!
//! File-backed durability sink: every batch becomes one checksummed frame.

use std::fs::{self, File, OpenOptions};
use std::hash::Hash;
use std::io::{self, BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::LogSyncStrategy;
use crate::error::{KvError, Result};

use super::{CommitBatch, DurabilitySink};

/// Frame header: commit id (8) + crc32 (4) + payload length (4)
pub const FRAME_HEADER_SIZE: usize = 16;

/// Largest payload a frame may declare (256 MB)
pub const MAX_FRAME_PAYLOAD: u32 = 256 * 1024 * 1024;

/// File operations a frame append needs
pub(crate) trait LogFile: Write {
    /// Cut the file back to `len` bytes
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;

    fn sync_to_disk(&mut self) -> io::Result<()>;
}

impl LogFile for File {
    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync_to_disk(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

/// End of the log: the file plus the length covered by complete frames
///
/// An append either lands a whole frame (and sync, if asked) or leaves the
/// file at `end` again. If the rollback itself fails the tail is marked
/// broken and refuses further appends.
pub(crate) struct LogTail<F> {
    file: F,
    end: u64,
    broken: bool,
}

impl<F: LogFile> LogTail<F> {
    pub(crate) fn new(file: F, end: u64) -> Self {
        Self {
            file,
            end,
            broken: false,
        }
    }

    pub(crate) fn append(&mut self, frame: &[u8], sync: bool) -> io::Result<()> {
        if self.broken {
            return Err(io::Error::new(
                ErrorKind::Other,
                "commit log tail could not be rolled back; reopen the log",
            ));
        }

        match self.write_frame(frame, sync) {
            Ok(()) => {
                self.end += frame.len() as u64;
                Ok(())
            }
            Err(e) => {
                // Drop whatever part of the frame reached the file
                if let Err(rollback) = self.file.truncate_to(self.end) {
                    tracing::error!(
                        "Failed to roll commit log back to {} bytes: {}",
                        self.end,
                        rollback
                    );
                    self.broken = true;
                }
                Err(e)
            }
        }
    }

    fn write_frame(&mut self, frame: &[u8], sync: bool) -> io::Result<()> {
        self.file.write_all(frame)?;
        self.file.flush()?;
        if sync {
            self.file.sync_to_disk()?;
        }
        Ok(())
    }
}

/// Build one frame: header followed by `payload`
pub(crate) fn encode_frame(commit_id: u64, payload: &[u8]) -> Vec<u8> {
    let crc = crc32fast::hash(payload);

    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    frame.extend_from_slice(&commit_id.to_le_bytes());
    frame.extend_from_slice(&crc.to_le_bytes());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Appends commit batches to a log file
pub struct CommitLogSink {
    path: PathBuf,
    tail: Mutex<LogTail<File>>,
    sync: LogSyncStrategy,
    last_commit_id: u64,
}

impl CommitLogSink {
    /// Open or create the log at `path`
    ///
    /// An existing log is scanned first. A torn frame at the tail (crash
    /// mid-append) is cut off so new frames start on a clean boundary.
    pub fn open(path: &Path, sync: LogSyncStrategy) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut last_commit_id = 0;
        if path.exists() {
            let mut reader = CommitLogReader::open(path)?;
            while let Some(frame) = reader.next_frame()? {
                last_commit_id = frame.commit_id;
            }

            if reader.is_truncated() {
                let valid_len = reader.valid_len();
                tracing::warn!(
                    "Commit log {} has a torn tail, truncating to {} bytes",
                    path.display(),
                    valid_len
                );
                OpenOptions::new().write(true).open(path)?.set_len(valid_len)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let end = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            tail: Mutex::new(LogTail::new(file, end)),
            sync,
            last_commit_id,
        })
    }

    /// Id of the last complete frame found when the log was opened
    pub fn last_commit_id(&self) -> u64 {
        self.last_commit_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Force written frames to disk
    pub fn sync(&self) -> Result<()> {
        self.tail.lock().file.sync_all()?;
        Ok(())
    }

    fn append_frame(&self, commit_id: u64, payload: &[u8]) -> Result<()> {
        if payload.len() > MAX_FRAME_PAYLOAD as usize {
            return Err(KvError::Serialization(format!(
                "Commit batch too large: {} bytes (max {})",
                payload.len(),
                MAX_FRAME_PAYLOAD
            )));
        }

        let frame = encode_frame(commit_id, payload);
        self.tail
            .lock()
            .append(&frame, self.sync == LogSyncStrategy::EveryCommit)?;
        Ok(())
    }
}

impl<K, V> DurabilitySink<K, V> for CommitLogSink
where
    K: Serialize + Send + Sync,
    V: Serialize + Send + Sync,
{
    fn persist(&self, batch: &CommitBatch<K, V>) -> Result<()> {
        let payload = bincode::serialize(batch)?;
        self.append_frame(batch.commit_id, &payload)
    }
}

impl Drop for CommitLogSink {
    fn drop(&mut self) {
        if let Err(e) = self.sync() {
            tracing::warn!("Failed to sync commit log {}: {}", self.path.display(), e);
        }
    }
}

/// One raw frame read back from the log
#[derive(Debug, Clone)]
pub struct LogFrame {
    pub commit_id: u64,
    pub payload: Vec<u8>,
}

impl LogFrame {
    /// Decode the frame's batch
    pub fn decode<K, V>(&self) -> Result<CommitBatch<K, V>>
    where
        K: DeserializeOwned + Eq + Hash,
        V: DeserializeOwned,
    {
        let batch: CommitBatch<K, V> = bincode::deserialize(&self.payload)?;
        if batch.commit_id != self.commit_id {
            return Err(KvError::LogCorruption(format!(
                "Frame header says commit {} but batch says {}",
                self.commit_id, batch.commit_id
            )));
        }
        Ok(batch)
    }
}

/// Sequential reader over a commit log
///
/// - A CRC mismatch is `LogCorruption`.
/// - A frame cut short by end-of-file ends iteration and marks the log
///   truncated.
pub struct CommitLogReader {
    reader: BufReader<File>,
    valid_len: u64,
    truncated: bool,
}

impl CommitLogReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(file),
            valid_len: 0,
            truncated: false,
        })
    }

    /// Read every complete batch in the log at `path`
    pub fn read_all<K, V>(path: &Path) -> Result<Vec<CommitBatch<K, V>>>
    where
        K: DeserializeOwned + Eq + Hash,
        V: DeserializeOwned,
    {
        let mut reader = Self::open(path)?;
        let mut batches = Vec::new();
        while let Some(frame) = reader.next_frame()? {
            batches.push(frame.decode()?);
        }
        Ok(batches)
    }

    /// Next complete, checksum-verified frame
    pub fn next_frame(&mut self) -> Result<Option<LogFrame>> {
        if self.truncated {
            return Ok(None);
        }

        let mut header = [0u8; FRAME_HEADER_SIZE];
        let read = self.read_up_to(&mut header)?;
        if read == 0 {
            return Ok(None);
        }
        if read < FRAME_HEADER_SIZE {
            self.truncated = true;
            return Ok(None);
        }

        let mut id_bytes = [0u8; 8];
        let mut crc_bytes = [0u8; 4];
        let mut len_bytes = [0u8; 4];
        id_bytes.copy_from_slice(&header[0..8]);
        crc_bytes.copy_from_slice(&header[8..12]);
        len_bytes.copy_from_slice(&header[12..16]);

        let commit_id = u64::from_le_bytes(id_bytes);
        let crc = u32::from_le_bytes(crc_bytes);
        let len = u32::from_le_bytes(len_bytes);

        if len > MAX_FRAME_PAYLOAD {
            return Err(KvError::LogCorruption(format!(
                "Frame for commit {} declares {} bytes (max {})",
                commit_id, len, MAX_FRAME_PAYLOAD
            )));
        }

        let mut payload = vec![0u8; len as usize];
        if self.read_up_to(&mut payload)? < payload.len() {
            self.truncated = true;
            return Ok(None);
        }

        let actual_crc = crc32fast::hash(&payload);
        if actual_crc != crc {
            return Err(KvError::LogCorruption(format!(
                "CRC mismatch in commit {}: expected {:08x}, got {:08x}",
                commit_id, crc, actual_crc
            )));
        }

        self.valid_len += (FRAME_HEADER_SIZE + payload.len()) as u64;
        Ok(Some(LogFrame { commit_id, payload }))
    }

    /// Bytes covered by complete frames read so far
    pub fn valid_len(&self) -> u64 {
        self.valid_len
    }

    /// Whether the log ended in the middle of a frame
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Fill as much of `buf` as the file allows; returns bytes read
    fn read_up_to(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }
}
