//! Response definitions
//!
//! Represents responses to clients.

use crate::error::{KvError, Result};
use crate::record::Version;

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    NotFound = 0x01,
    Error = 0x02,
    Conflict = 0x03,
}

/// A response to send to client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status code
    pub status: Status,

    /// Optional payload (value for GET, version for PUT/WRITE, details for
    /// CONFLICT, message for ERROR)
    pub payload: Option<Vec<u8>>,
}

impl Response {
    /// Create an OK response with optional payload
    pub fn ok(payload: Option<Vec<u8>>) -> Self {
        Self {
            status: Status::Ok,
            payload,
        }
    }

    /// OK carrying a version number (8 bytes, big-endian)
    pub fn version(version: Version) -> Self {
        Self::ok(Some(version.to_be_bytes().to_vec()))
    }

    /// Create a NOT_FOUND response
    pub fn not_found() -> Self {
        Self {
            status: Status::NotFound,
            payload: None,
        }
    }

    /// Create an ERROR response
    pub fn error(message: &str) -> Self {
        Self {
            status: Status::Error,
            payload: Some(message.as_bytes().to_vec()),
        }
    }

    /// Create a CONFLICT response
    ///
    /// Payload: expected (8) + actual (8) + key description
    pub fn conflict(key: &str, expected: Version, actual: Version) -> Self {
        let mut payload = Vec::with_capacity(16 + key.len());
        payload.extend_from_slice(&expected.to_be_bytes());
        payload.extend_from_slice(&actual.to_be_bytes());
        payload.extend_from_slice(key.as_bytes());
        Self {
            status: Status::Conflict,
            payload: Some(payload),
        }
    }

    /// Read the payload as a version number
    pub fn as_version(&self) -> Result<Version> {
        let payload = self.payload.as_deref().unwrap_or(&[]);
        let bytes: [u8; 8] = payload.try_into().map_err(|_| {
            KvError::Protocol(format!(
                "Expected an 8-byte version, got {} bytes",
                payload.len()
            ))
        })?;
        Ok(Version::from_be_bytes(bytes))
    }

    /// Turn a CONFLICT response back into the error it reports
    pub fn to_conflict_error(&self) -> Result<KvError> {
        let payload = self.payload.as_deref().unwrap_or(&[]);
        if self.status != Status::Conflict || payload.len() < 16 {
            return Err(KvError::Protocol(
                "Malformed conflict response".to_string(),
            ));
        }

        let mut expected = [0u8; 8];
        let mut actual = [0u8; 8];
        expected.copy_from_slice(&payload[0..8]);
        actual.copy_from_slice(&payload[8..16]);

        Ok(KvError::VersionConflict {
            key: String::from_utf8_lossy(&payload[16..]).into_owned(),
            expected: Version::from_be_bytes(expected),
            actual: Version::from_be_bytes(actual),
        })
    }

    /// Payload rendered as text (ERROR messages)
    pub fn message(&self) -> String {
        self.payload
            .as_deref()
            .map(|p| String::from_utf8_lossy(p).into_owned())
            .unwrap_or_default()
    }
}
