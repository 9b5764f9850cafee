//! OptiKV Server Binary
//!
//! Starts the TCP server for OptiKV.

use std::sync::Arc;

use clap::Parser;
use optikv::network::Server;
use optikv::{Config, Database, LockStrategy, LogSyncStrategy};
use tracing_subscriber::{fmt, EnvFilter};

/// OptiKV Server
#[derive(Parser, Debug)]
#[command(name = "optikv-server")]
#[command(about = "Versioned key-value store with optimistic concurrency control")]
#[command(version)]
struct Args {
    /// Data directory (holds the commit log)
    #[arg(short, long, default_value = "./optikv_data")]
    data_dir: String,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:7379")]
    listen: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// Connection worker threads
    #[arg(short, long, default_value = "8")]
    workers: usize,

    /// Hash keys onto this many exclusion regions instead of one per key
    #[arg(long)]
    lock_shards: Option<usize>,

    /// Only fsync the commit log on shutdown
    #[arg(long)]
    lazy_sync: bool,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,optikv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("OptiKV Server v{}", optikv::VERSION);
    tracing::info!("Data directory: {}", args.data_dir);
    tracing::info!("Listen address: {}", args.listen);

    let lock_strategy = match args.lock_shards {
        Some(shards) => LockStrategy::Sharded { shards },
        None => LockStrategy::PerKey,
    };
    let log_sync = if args.lazy_sync {
        LogSyncStrategy::OnClose
    } else {
        LogSyncStrategy::EveryCommit
    };

    // Build config from args
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .worker_threads(args.workers)
        .lock_strategy(lock_strategy)
        .log_sync(log_sync)
        .build();

    // Open database
    let database = match Database::open(config.clone()) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            tracing::error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Database initialized successfully");

    let server = match Server::bind(config, database) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
