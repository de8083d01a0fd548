/// Majordome core error types.
///
/// Error handling for transport-level operations: framing, connection
/// pumps and endpoint resolution.
use std::io;
use thiserror::Error;

use crate::codec::FrameError;
use crate::multipart::AssembleError;

/// Main error type for transport-level operations
#[derive(Error, Debug)]
pub enum CoreError {
    /// IO error during socket operations
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Wire framing violation
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Multipart message assembly violation
    #[error(transparent)]
    Assemble(#[from] AssembleError),

    /// Connection pump has terminated
    #[error("Connection closed")]
    ConnectionClosed,

    /// Channel send error
    #[error("Channel send error")]
    ChannelSend,

    /// Channel receive error
    #[error("Channel receive error")]
    ChannelRecv,

    /// Invalid endpoint
    #[error("Invalid endpoint: {0}")]
    Endpoint(String),
}

/// Result type alias for transport-level operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create an endpoint error with a message
    pub fn endpoint(msg: impl Into<String>) -> Self {
        Self::Endpoint(msg.into())
    }

    /// Check if this error means the peer is gone rather than the call
    /// being wrong.
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosed | Self::ChannelSend | Self::ChannelRecv | Self::Io(_)
        )
    }
}
