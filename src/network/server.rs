//! TCP Server
//!
//! Accepts connections and dispatches them to worker threads.

use std::io::{BufWriter, ErrorKind};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver};

use crate::config::Config;
use crate::engine::Database;
use crate::error::{KvError, Result};
use crate::protocol::{write_response, Response};

use super::Connection;

/// How long the acceptor sleeps when no connection is waiting
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Cloneable handle that stops a running server
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Signal the server to shut down gracefully
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// TCP server for OptiKV
///
/// - Single acceptor loop (non-blocking accept, polls the shutdown flag)
/// - `worker_threads` workers fed through a crossbeam channel
/// - Connections beyond `max_connections` get an ERROR response and are closed
pub struct Server {
    config: Config,
    database: Arc<Database<Vec<u8>, Vec<u8>>>,
    listener: TcpListener,
    shutdown: ShutdownHandle,
    active: Arc<AtomicUsize>,
}

impl Server {
    /// Bind to `config.listen_addr`
    pub fn bind(config: Config, database: Arc<Database<Vec<u8>, Vec<u8>>>) -> Result<Self> {
        config.validate()?;

        let listener = TcpListener::bind(&config.listen_addr).map_err(|e| {
            KvError::Network(format!("Failed to bind {}: {}", config.listen_addr, e))
        })?;
        listener.set_nonblocking(true)?;

        Ok(Self {
            config,
            database,
            listener,
            shutdown: ShutdownHandle {
                flag: Arc::new(AtomicBool::new(false)),
            },
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Connections accepted and not yet finished
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Run the accept loop until shutdown is signalled (blocking)
    pub fn run(&self) -> Result<()> {
        tracing::info!("Listening on {}", self.local_addr()?);

        let (sender, receiver) = channel::unbounded::<TcpStream>();
        let workers: Vec<JoinHandle<()>> = (0..self.config.worker_threads)
            .map(|id| self.spawn_worker(id, receiver.clone()))
            .collect::<Result<_>>()?;
        drop(receiver);

        while !self.shutdown.is_shutdown() {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if self.active.load(Ordering::SeqCst) >= self.config.max_connections {
                        tracing::warn!("Rejecting {}: connection limit reached", peer);
                        Self::reject(stream);
                        continue;
                    }

                    stream.set_nonblocking(false)?;
                    self.active.fetch_add(1, Ordering::SeqCst);
                    if sender.send(stream).is_err() {
                        self.active.fetch_sub(1, Ordering::SeqCst);
                        return Err(KvError::Network("Worker pool is gone".to_string()));
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                }
            }
        }

        tracing::info!("Shutting down, waiting for workers");
        drop(sender);
        for worker in workers {
            if worker.join().is_err() {
                tracing::error!("Worker thread panicked");
            }
        }
        Ok(())
    }

    fn spawn_worker(&self, id: usize, receiver: Receiver<TcpStream>) -> Result<JoinHandle<()>> {
        let database = Arc::clone(&self.database);
        let active = Arc::clone(&self.active);
        let read_ms = self.config.read_timeout_ms;
        let write_ms = self.config.write_timeout_ms;

        let handle = thread::Builder::new()
            .name(format!("optikv-worker-{}", id))
            .spawn(move || {
                for stream in receiver.iter() {
                    let result = Connection::new(stream, Arc::clone(&database)).and_then(|mut conn| {
                        conn.set_timeouts(read_ms, write_ms)?;
                        conn.handle()
                    });
                    if let Err(e) = result {
                        tracing::debug!("Connection ended with error: {}", e);
                    }
                    active.fetch_sub(1, Ordering::SeqCst);
                }
            })?;
        Ok(handle)
    }

    fn reject(stream: TcpStream) {
        let _ = stream.set_nonblocking(false);
        let mut writer = BufWriter::new(stream);
        let _ = write_response(&mut writer, &Response::error("connection limit reached"));
    }
}
