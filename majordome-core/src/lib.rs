//! Majordome Core
//!
//! This crate contains the runtime-agnostic transport building blocks the
//! broker, workers and clients are assembled from:
//! - Wire framing (`codec`) and multipart assembly (`multipart`)
//! - Connection pumps over compio TCP streams (`actor`)
//! - Application payload codec: action + JSON mapping (`message`)
//! - Endpoint parsing (`endpoint`), options (`options`), deployment
//!   configuration (`config`)
//! - Reconnection backoff (`reconnect`)
//! - Error types (`error`)

#![cfg_attr(not(test), deny(unsafe_code))]
#![allow(clippy::module_name_repetitions)]

pub mod actor;
pub mod codec;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod message;
pub mod multipart;
pub mod options;
pub mod reconnect;
pub mod tcp;

// Optional: a small prelude to make downstream crates ergonomic.
// Keep it minimal to avoid API lock-in.
pub mod prelude {
    pub use crate::actor::{spawn_connection, spawn_connection_with, ConnCmd, ConnEvent, Connection};
    pub use crate::codec::{encode_frames, FrameDecoder, WireFrame};
    pub use crate::config::MqConfig;
    pub use crate::endpoint::Endpoint;
    pub use crate::error::CoreError;
    pub use crate::message::MqMessage;
    pub use crate::multipart::MultipartAssembler;
    pub use crate::options::MqOptions;
    pub use crate::reconnect::ReconnectState;
    pub use crate::tcp::enable_tcp_nodelay;
}
