//! Network Tests
//!
//! Runs a real server on an ephemeral port and drives it with `Client`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use optikv::commit::CommitLogReader;
use optikv::network::{Client, Server, ShutdownHandle};
use optikv::protocol::{read_response, write_command, Command, Status};
use optikv::{Config, Database, KvError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

struct TestServer {
    addr: SocketAddr,
    shutdown: ShutdownHandle,
    handle: Option<JoinHandle<()>>,
    config: Config,
    _temp_dir: TempDir,
}

impl TestServer {
    fn start() -> Self {
        Self::start_with(|builder| builder)
    }

    fn start_with(
        customize: impl FnOnce(optikv::config::ConfigBuilder) -> optikv::config::ConfigBuilder,
    ) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config = customize(
            Config::builder()
                .data_dir(temp_dir.path())
                .listen_addr("127.0.0.1:0")
                .worker_threads(4),
        )
        .build();

        let database = Arc::new(Database::open(config.clone()).unwrap());
        let server = Server::bind(config.clone(), database).unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = server.shutdown_handle();
        let handle = thread::spawn(move || server.run().unwrap());

        Self {
            addr,
            shutdown,
            handle: Some(handle),
            config,
            _temp_dir: temp_dir,
        }
    }

    fn client(&self) -> Client {
        Client::connect(self.addr).unwrap()
    }

    fn stop(&mut self) {
        self.shutdown.shutdown();
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap();
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.stop();
    }
}

// =============================================================================
// Client Tests
// =============================================================================

#[test]
fn test_ping() {
    let server = TestServer::start();
    let mut client = server.client();

    client.ping().unwrap();
}

#[test]
fn test_put_get_delete() {
    let server = TestServer::start();
    let mut client = server.client();

    assert_eq!(client.put(b"name", b"alice").unwrap(), 1);
    assert_eq!(client.put(b"name", b"bob").unwrap(), 2);

    assert_eq!(client.get(b"name").unwrap(), Some(b"bob".to_vec()));
    assert_eq!(client.get_version(b"name", 1).unwrap(), Some(b"alice".to_vec()));
    assert_eq!(client.get_version(b"name", 3).unwrap(), None);

    client.delete(b"name").unwrap();
    assert_eq!(client.get(b"name").unwrap(), None);
    assert_eq!(client.get(b"never-set").unwrap(), None);
}

#[test]
fn test_write_conflict_reaches_client() {
    let server = TestServer::start();
    let mut client = server.client();

    assert_eq!(client.write(b"K", b"a", 0).unwrap(), 1);
    assert_eq!(client.write(b"K", b"b", 1).unwrap(), 2);

    let err = client.write(b"K", b"c", 1).unwrap_err();
    match err {
        KvError::VersionConflict {
            key,
            expected,
            actual,
        } => {
            assert_eq!(key, "K");
            assert_eq!(expected, 1);
            assert_eq!(actual, 2);
        }
        other => panic!("expected VersionConflict, got {:?}", other),
    }

    // The connection stays usable after a conflict
    assert_eq!(client.get(b"K").unwrap(), Some(b"b".to_vec()));
}

#[test]
fn test_negative_version_is_server_error() {
    let server = TestServer::start();
    let mut client = server.client();
    client.put(b"k", b"v").unwrap();

    let err = client.get_version(b"k", -1).unwrap_err();

    assert!(matches!(err, KvError::Network(_)));
    client.ping().unwrap();
}

#[test]
fn test_commit_over_the_wire() {
    let mut server = TestServer::start();
    let mut client = server.client();

    assert_eq!(client.commit().unwrap(), None);

    client.put(b"a", b"1").unwrap();
    client.put(b"b", b"1").unwrap();
    assert_eq!(client.commit().unwrap(), Some(1));
    assert_eq!(client.commit().unwrap(), None);

    client.put(b"a", b"2").unwrap();
    assert_eq!(client.commit().unwrap(), Some(2));

    drop(client);
    server.stop();

    let batches =
        CommitLogReader::read_all::<Vec<u8>, Vec<u8>>(&server.config.commit_log_path()).unwrap();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].written.len(), 2);
    assert_eq!(batches[1].written.len(), 1);
}

#[test]
fn test_unknown_command_gets_error_response() {
    let server = TestServer::start();
    let stream = std::net::TcpStream::connect(server.addr).unwrap();
    let mut writer = stream.try_clone().unwrap();
    let mut reader = stream;

    std::io::Write::write_all(&mut writer, &[0xEE, 0, 0, 0, 0]).unwrap();
    let response = read_response(&mut reader).unwrap();

    assert_eq!(response.status, Status::Error);
}

#[test]
fn test_raw_ping_response() {
    let server = TestServer::start();
    let mut stream = std::net::TcpStream::connect(server.addr).unwrap();

    write_command(&mut stream, &Command::Ping).unwrap();
    let response = read_response(&mut stream).unwrap();

    assert_eq!(response.status, Status::Ok);
    assert_eq!(response.payload, Some(b"PONG".to_vec()));
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_clients_lose_no_updates() {
    let server = TestServer::start();
    let addr = server.addr;

    let mut handles = vec![];
    for t in 0..4 {
        handles.push(thread::spawn(move || {
            let mut client = Client::connect(addr).unwrap();
            let mut landed = 0;
            while landed < 10 {
                let current = client.get(b"counter").unwrap();
                let n: u64 = current
                    .map(|v| String::from_utf8(v).unwrap().parse().unwrap())
                    .unwrap_or(0);
                let expected = n;
                match client.write(b"counter", (n + 1).to_string().as_bytes(), expected) {
                    Ok(_) => landed += 1,
                    Err(e) => assert!(e.is_conflict(), "thread {}: {}", t, e),
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let mut client = server.client();
    assert_eq!(client.get(b"counter").unwrap(), Some(b"40".to_vec()));
}

#[test]
fn test_connection_limit() {
    let server = TestServer::start_with(|builder| builder.max_connections(1).worker_threads(1));

    let mut first = server.client();
    first.ping().unwrap();

    let mut second = std::net::TcpStream::connect(server.addr).unwrap();
    let response = read_response(&mut second).unwrap();
    assert_eq!(response.status, Status::Error);

    first.ping().unwrap();
}
