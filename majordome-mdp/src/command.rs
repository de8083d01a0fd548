//! Worker-protocol command codes.

use bytes::Bytes;
use std::fmt;

/// Command byte carried as the second frame of every worker-protocol
/// message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Worker announces readiness for a service
    Ready = 0x01,
    /// Broker dispatches a request to a worker
    Request = 0x02,
    /// Worker answers a request
    Reply = 0x03,
    /// Liveness signal, both directions
    Heartbeat = 0x04,
    /// Orderly goodbye, both directions
    Disconnect = 0x05,
}

impl Command {
    /// The wire byte for this command.
    #[inline]
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Decode a wire byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Ready),
            0x02 => Some(Self::Request),
            0x03 => Some(Self::Reply),
            0x04 => Some(Self::Heartbeat),
            0x05 => Some(Self::Disconnect),
            _ => None,
        }
    }

    /// The command as a single-byte frame.
    #[must_use]
    pub const fn frame(self) -> Bytes {
        match self {
            Self::Ready => Bytes::from_static(&[0x01]),
            Self::Request => Bytes::from_static(&[0x02]),
            Self::Reply => Bytes::from_static(&[0x03]),
            Self::Heartbeat => Bytes::from_static(&[0x04]),
            Self::Disconnect => Bytes::from_static(&[0x05]),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ready => "READY",
            Self::Request => "REQUEST",
            Self::Reply => "REPLY",
            Self::Heartbeat => "HEARTBEAT",
            Self::Disconnect => "DISCONNECT",
        };
        f.write_str(name)
    }
}
