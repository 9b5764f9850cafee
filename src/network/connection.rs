//! Connection Handler
//!
//! Handles individual client connections.

use std::io::{BufReader, BufWriter, ErrorKind};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::{Database, Reply};
use crate::error::{KvError, Result};
use crate::protocol::{read_command, write_response, Command, Response};

/// Handles a single client connection
pub struct Connection {
    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,

    /// Shared database
    database: Arc<Database<Vec<u8>, Vec<u8>>>,

    /// Peer address for logging
    peer_addr: String,
}

impl Connection {
    /// Create a new connection handler
    ///
    /// Sets up buffered I/O
    pub fn new(stream: TcpStream, database: Arc<Database<Vec<u8>, Vec<u8>>>) -> Result<Self> {
        // Get peer address for logging before we split the stream
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        // Clone stream for separate read/write handles
        let read_stream = stream.try_clone()?;
        let write_stream = stream;

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(write_stream),
            database,
            peer_addr,
        })
    }

    /// Configure connection timeouts (0 = no timeout)
    pub fn set_timeouts(&mut self, read_ms: u64, write_ms: u64) -> Result<()> {
        if read_ms > 0 {
            self.reader
                .get_ref()
                .set_read_timeout(Some(Duration::from_millis(read_ms)))?;
        }
        if write_ms > 0 {
            self.writer
                .get_ref()
                .set_write_timeout(Some(Duration::from_millis(write_ms)))?;
        }
        Ok(())
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Reads commands in a loop and sends responses.
    /// Returns when the client disconnects, times out, or an error occurs.
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!("Connection established from {}", self.peer_addr);

        loop {
            // Read next command
            let command = match read_command(&mut self.reader) {
                Ok(cmd) => cmd,
                Err(KvError::Io(ref e)) if Self::is_disconnect(e.kind()) => {
                    tracing::debug!("Client {} disconnected ({:?})", self.peer_addr, e.kind());
                    return Ok(());
                }
                Err(KvError::Io(ref e))
                    if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    // Unix reports WouldBlock on read timeout, Windows TimedOut
                    tracing::debug!("Read timeout for client {}", self.peer_addr);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
                    // Send error response if possible
                    let _ = self.send_response(Response::error(&e.to_string()));
                    return Err(e);
                }
            };

            tracing::trace!("Received command from {}: {:?}", self.peer_addr, command);

            // Execute command
            let response = self.execute_command(command);

            // Send response
            if let Err(e) = self.send_response(response) {
                if let KvError::Io(ref io_err) = e {
                    // Client went away before the response could be sent
                    if Self::is_disconnect(io_err.kind()) || io_err.kind() == ErrorKind::BrokenPipe {
                        tracing::debug!(
                            "Client {} disconnected before response could be sent: {}",
                            self.peer_addr,
                            e
                        );
                        return Ok(());
                    }
                }
                tracing::warn!("Error writing to {}: {}", self.peer_addr, e);
                return Err(e);
            }
        }
    }

    /// Execute a command and map the outcome onto a response
    fn execute_command(&self, command: Command) -> Response {
        // Conflicts report the key as the client sent it
        let key = match &command {
            Command::Put { key, .. } | Command::Write { key, .. } => {
                Some(String::from_utf8_lossy(key).into_owned())
            }
            _ => None,
        };

        match self.database.execute(command) {
            Ok(reply) => Self::reply_to_response(reply),
            Err(KvError::VersionConflict {
                key: described,
                expected,
                actual,
            }) => Response::conflict(key.as_deref().unwrap_or(&described), expected, actual),
            Err(e) => Response::error(&e.to_string()),
        }
    }

    fn reply_to_response(reply: Reply) -> Response {
        match reply {
            Reply::Value(value) => Response::ok(Some(value)),
            Reply::Missing => Response::not_found(),
            Reply::Version(version) => Response::version(version),
            Reply::Deleted => Response::ok(None),
            Reply::Committed(report) => Response::ok(Some(
                report.commit_id.unwrap_or(0).to_be_bytes().to_vec(),
            )),
            Reply::Pong => Response::ok(Some(b"PONG".to_vec())),
        }
    }

    /// Send a response to the client
    fn send_response(&mut self, response: Response) -> Result<()> {
        write_response(&mut self.writer, &response)
    }

    fn is_disconnect(kind: ErrorKind) -> bool {
        matches!(
            kind,
            ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
        )
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}
