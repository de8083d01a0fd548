/// MDP protocol error types.
use std::io;
use thiserror::Error;

use majordome_core::config::ConfigError;
use majordome_core::error::CoreError;
use majordome_core::message::MessageError;

/// Main error type for MDP operations
#[derive(Error, Debug)]
pub enum MdpError {
    /// Transport-level failure
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Payload codec failure
    #[error(transparent)]
    Message(#[from] MessageError),

    /// Deployment configuration failure
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// IO error during connect/bind
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Call violates the request/reply state machine
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    /// Reply attempted with no request outstanding
    #[error("No pending request")]
    NoPendingRequest,
}

/// Result type alias for MDP operations
pub type Result<T> = std::result::Result<T, MdpError>;

impl MdpError {
    /// Check if this error means the peer is gone rather than the call
    /// being wrong.
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        match self {
            Self::Core(e) => e.is_connection_error(),
            Self::Io(_) => true,
            _ => false,
        }
    }
}
