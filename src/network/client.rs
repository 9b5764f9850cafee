//! Blocking TCP client

use std::io::{BufReader, BufWriter};
use std::net::{TcpStream, ToSocketAddrs};

use crate::error::{KvError, Result};
use crate::protocol::{read_response, write_command, Command, Response, Status};
use crate::record::Version;

/// One connection to an OptiKV server
pub struct Client {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl Client {
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .map_err(|e| KvError::Network(format!("Failed to connect: {}", e)))?;
        stream.set_nodelay(true)?;
        let read_stream = stream.try_clone()?;

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
        })
    }

    pub fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let response = self.call(&Command::Get { key: key.to_vec() })?;
        Self::value(response)
    }

    pub fn get_version(&mut self, key: &[u8], version: i64) -> Result<Option<Vec<u8>>> {
        let response = self.call(&Command::GetVersion {
            key: key.to_vec(),
            version,
        })?;
        Self::value(response)
    }

    /// Write at the current version; returns the new version
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<Version> {
        let response = self.call(&Command::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        })?;
        Self::expect_ok(&response)?;
        response.as_version()
    }

    /// Write only if the stored version equals `expected`
    pub fn write(&mut self, key: &[u8], value: &[u8], expected: Version) -> Result<Version> {
        let response = self.call(&Command::Write {
            key: key.to_vec(),
            value: value.to_vec(),
            expected,
        })?;
        Self::expect_ok(&response)?;
        response.as_version()
    }

    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        let response = self.call(&Command::Delete { key: key.to_vec() })?;
        Self::expect_ok(&response)
    }

    /// Commit; returns the commit id, or `None` if nothing was pending
    pub fn commit(&mut self) -> Result<Option<u64>> {
        let response = self.call(&Command::Commit)?;
        Self::expect_ok(&response)?;
        let id = response.as_version()?;
        Ok(if id == 0 { None } else { Some(id) })
    }

    pub fn ping(&mut self) -> Result<()> {
        let response = self.call(&Command::Ping)?;
        Self::expect_ok(&response)
    }

    fn call(&mut self, command: &Command) -> Result<Response> {
        write_command(&mut self.writer, command)?;
        read_response(&mut self.reader)
    }

    fn value(response: Response) -> Result<Option<Vec<u8>>> {
        match response.status {
            Status::NotFound => Ok(None),
            Status::Ok => Ok(Some(response.payload.unwrap_or_default())),
            _ => Err(Self::failure(&response)),
        }
    }

    fn expect_ok(response: &Response) -> Result<()> {
        if response.status == Status::Ok {
            Ok(())
        } else {
            Err(Self::failure(response))
        }
    }

    fn failure(response: &Response) -> KvError {
        match response.status {
            Status::Conflict => response
                .to_conflict_error()
                .unwrap_or_else(|e| e),
            _ => KvError::Network(format!("Server error: {}", response.message())),
        }
    }
}
