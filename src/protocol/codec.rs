//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ## Wire Format
//!
//! ### Request (Command) Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Cmd (1)  │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Payload by Command Type
//! - GET:         key_len (4) + key
//! - GET_VERSION: key_len (4) + key + version (8, signed)
//! - PUT:         key_len (4) + key + value
//! - WRITE:       key_len (4) + key + expected (8) + value
//! - DELETE:      key_len (4) + key
//! - COMMIT/PING: empty
//!
//! ### Response Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │Status(1) │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! All integers are big-endian.

use std::io::{Read, Write};

use bytes::{Buf, BufMut, BytesMut};

use super::{Command, CommandType, Response, Status};
use crate::error::{KvError, Result};

/// Header size: 1 byte command/status + 4 bytes length
pub const HEADER_SIZE: usize = 5;

/// Maximum payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

// =============================================================================
// Command Encoding/Decoding
// =============================================================================

/// Encode a command to bytes
///
/// Format: cmd_type (1) + payload_len (4) + payload
pub fn encode_command(command: &Command) -> Vec<u8> {
    // Build payload based on command type
    let mut payload = BytesMut::new();

    match command {
        Command::Get { key } | Command::Delete { key } => {
            put_key(&mut payload, key);
        }
        Command::GetVersion { key, version } => {
            put_key(&mut payload, key);
            payload.put_i64(*version);
        }
        Command::Put { key, value } => {
            put_key(&mut payload, key);
            payload.put_slice(value);
        }
        Command::Write {
            key,
            value,
            expected,
        } => {
            put_key(&mut payload, key);
            payload.put_u64(*expected);
            payload.put_slice(value);
        }
        Command::Commit | Command::Ping => {}
    }

    // Build full message: header + payload
    frame(command.command_type() as u8, &payload)
}

/// Decode a command from bytes
pub fn decode_command(bytes: &[u8]) -> Result<Command> {
    // Parse header and validate payload length
    let (cmd_type, payload) = split_frame(bytes, "command")?;

    let cmd_type = CommandType::try_from(cmd_type).map_err(|byte| {
        KvError::Protocol(format!("Unknown command type: 0x{:02x}", byte))
    })?;

    // Parse command based on type
    match cmd_type {
        CommandType::Get => {
            let (key, _) = take_key(payload, "GET")?;
            Ok(Command::Get { key })
        }
        CommandType::GetVersion => {
            let (key, mut rest) = take_key(payload, "GET_VERSION")?;
            if rest.remaining() != 8 {
                return Err(KvError::Protocol(format!(
                    "GET_VERSION command: expected 8 version bytes, got {}",
                    rest.remaining()
                )));
            }
            let version = rest.get_i64();
            Ok(Command::GetVersion { key, version })
        }
        CommandType::Put => {
            let (key, rest) = take_key(payload, "PUT")?;
            Ok(Command::Put {
                key,
                value: rest.to_vec(),
            })
        }
        CommandType::Write => {
            let (key, mut rest) = take_key(payload, "WRITE")?;
            if rest.remaining() < 8 {
                return Err(KvError::Protocol(
                    "WRITE command: missing expected version".to_string(),
                ));
            }
            let expected = rest.get_u64();
            Ok(Command::Write {
                key,
                value: rest.to_vec(),
                expected,
            })
        }
        CommandType::Delete => {
            let (key, _) = take_key(payload, "DELETE")?;
            Ok(Command::Delete { key })
        }
        CommandType::Commit => {
            expect_empty(payload, "COMMIT")?;
            Ok(Command::Commit)
        }
        CommandType::Ping => {
            expect_empty(payload, "PING")?;
            Ok(Command::Ping)
        }
    }
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Encode a response to bytes
///
/// Format: status (1) + payload_len (4) + payload
pub fn encode_response(response: &Response) -> Vec<u8> {
    let payload = response.payload.as_deref().unwrap_or(&[]);
    frame(response.status as u8, payload)
}

/// Decode a response from bytes
pub fn decode_response(bytes: &[u8]) -> Result<Response> {
    // Parse header and validate payload length
    let (status_byte, payload) = split_frame(bytes, "response")?;

    // Parse status
    let status = match status_byte {
        0x00 => Status::Ok,
        0x01 => Status::NotFound,
        0x02 => Status::Error,
        0x03 => Status::Conflict,
        _ => {
            return Err(KvError::Protocol(format!(
                "Unknown response status: 0x{:02x}",
                status_byte
            )))
        }
    };

    // Extract payload
    let payload = if payload.is_empty() {
        None
    } else {
        Some(payload.to_vec())
    };

    Ok(Response { status, payload })
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read a complete command from a stream
///
/// Blocks until a complete command is received or an error occurs
pub fn read_command<R: Read>(reader: &mut R) -> Result<Command> {
    let message = read_frame(reader)?;
    decode_command(&message)
}

/// Write a command to a stream
pub fn write_command<W: Write>(writer: &mut W, command: &Command) -> Result<()> {
    writer.write_all(&encode_command(command))?;
    writer.flush()?;
    Ok(())
}

/// Read a complete response from a stream
pub fn read_response<R: Read>(reader: &mut R) -> Result<Response> {
    let message = read_frame(reader)?;
    decode_response(&message)
}

/// Write a response to a stream
pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    writer.write_all(&encode_response(response))?;
    writer.flush()?;
    Ok(())
}

// =============================================================================
// Private Helpers
// =============================================================================

fn frame(kind: u8, payload: &[u8]) -> Vec<u8> {
    let mut message = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    message.put_u8(kind);
    message.put_u32(payload.len() as u32);
    message.put_slice(payload);
    message.to_vec()
}

/// Validate the header and return (kind byte, payload)
fn split_frame<'a>(bytes: &'a [u8], what: &str) -> Result<(u8, &'a [u8])> {
    if bytes.len() < HEADER_SIZE {
        return Err(KvError::Protocol(format!(
            "Incomplete {} header: expected {} bytes, got {}",
            what,
            HEADER_SIZE,
            bytes.len()
        )));
    }

    let mut header = &bytes[..HEADER_SIZE];
    let kind = header.get_u8();
    let payload_len = header.get_u32();

    if payload_len > MAX_PAYLOAD_SIZE {
        return Err(KvError::Protocol(format!(
            "{} payload too large: {} bytes (max {})",
            what, payload_len, MAX_PAYLOAD_SIZE
        )));
    }

    let total_len = HEADER_SIZE + payload_len as usize;
    if bytes.len() < total_len {
        return Err(KvError::Protocol(format!(
            "Incomplete {} payload: expected {} bytes, got {}",
            what,
            total_len,
            bytes.len()
        )));
    }

    Ok((kind, &bytes[HEADER_SIZE..total_len]))
}

/// Read header + payload off a stream into one buffer
fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    // Read header first
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    // Parse and validate payload length
    let mut len_bytes = &header[1..];
    let payload_len = len_bytes.get_u32();
    if payload_len > MAX_PAYLOAD_SIZE {
        return Err(KvError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            payload_len, MAX_PAYLOAD_SIZE
        )));
    }

    // Read payload behind the header
    let mut message = vec![0u8; HEADER_SIZE + payload_len as usize];
    message[..HEADER_SIZE].copy_from_slice(&header);
    reader.read_exact(&mut message[HEADER_SIZE..])?;
    Ok(message)
}

fn put_key(buf: &mut BytesMut, key: &[u8]) {
    buf.put_u32(key.len() as u32);
    buf.put_slice(key);
}

/// Split a payload into (key, rest)
fn take_key<'a>(mut payload: &'a [u8], name: &str) -> Result<(Vec<u8>, &'a [u8])> {
    if payload.remaining() < 4 {
        return Err(KvError::Protocol(format!(
            "{} command: missing key length",
            name
        )));
    }

    let key_len = payload.get_u32() as usize;
    if payload.remaining() < key_len {
        return Err(KvError::Protocol(format!(
            "{} command: incomplete key (expected {}, got {})",
            name,
            key_len,
            payload.remaining()
        )));
    }

    let (key, rest) = payload.split_at(key_len);
    Ok((key.to_vec(), rest))
}

fn expect_empty(payload: &[u8], name: &str) -> Result<()> {
    if !payload.is_empty() {
        return Err(KvError::Protocol(format!(
            "{} command: unexpected payload of {} bytes",
            name,
            payload.len()
        )));
    }
    Ok(())
}
