//! Command definitions
//!
//! Represents commands from clients.

use crate::record::Version;

/// Command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandType {
    Get = 0x01,
    Put = 0x02,
    Delete = 0x03,
    Ping = 0x04,
    GetVersion = 0x05,
    Write = 0x06,
    Commit = 0x07,
}

impl TryFrom<u8> for CommandType {
    type Error = u8;

    fn try_from(byte: u8) -> std::result::Result<Self, u8> {
        match byte {
            0x01 => Ok(CommandType::Get),
            0x02 => Ok(CommandType::Put),
            0x03 => Ok(CommandType::Delete),
            0x04 => Ok(CommandType::Ping),
            0x05 => Ok(CommandType::GetVersion),
            0x06 => Ok(CommandType::Write),
            0x07 => Ok(CommandType::Commit),
            other => Err(other),
        }
    }
}

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Latest value of a key
    Get { key: Vec<u8> },

    /// Value of a key at one exact version
    GetVersion { key: Vec<u8>, version: i64 },

    /// Write against whatever version is current (may still conflict)
    Put { key: Vec<u8>, value: Vec<u8> },

    /// Write only if the stored version equals `expected`
    Write {
        key: Vec<u8>,
        value: Vec<u8>,
        expected: Version,
    },

    /// Erase a key and all its versions
    Delete { key: Vec<u8> },

    /// Hand pending changes to the durability sink
    Commit,

    /// Ping (health check)
    Ping,
}

impl Command {
    /// Get the command type
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::Get { .. } => CommandType::Get,
            Command::GetVersion { .. } => CommandType::GetVersion,
            Command::Put { .. } => CommandType::Put,
            Command::Write { .. } => CommandType::Write,
            Command::Delete { .. } => CommandType::Delete,
            Command::Commit => CommandType::Commit,
            Command::Ping => CommandType::Ping,
        }
    }
}
