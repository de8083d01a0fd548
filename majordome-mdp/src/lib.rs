//! Majordome MDP protocol layer.
//!
//! Implements the Majordomo request/reply pattern over the framed transport
//! in `majordome-core`: a broker routes client requests to workers
//! registered per service name, with heartbeat-driven liveness detection on
//! both sides of every worker connection.
//!
//! Message shapes on the wire (each element one frame):
//!
//! ```text
//! client  → broker   [MDPC01, service, ...payload]
//! broker  → client   [MDPC01, service, ...payload]
//! worker  → broker   [MDPW01, command, ...body]
//! broker  → worker   [MDPW01, command, ...body]
//! ```
//!
//! Worker command bodies: READY carries the service name, REQUEST and REPLY
//! carry `[...return-address, empty, ...payload]`, HEARTBEAT and DISCONNECT
//! carry nothing.

#![allow(clippy::module_name_repetitions)]

pub mod broker;
pub mod client;
pub mod command;
pub mod envelope;
pub mod error;
pub mod worker;

/// Protocol tag opening every client-side message.
pub const CLIENT_PROTOCOL: &[u8] = b"MDPC01";

/// Protocol tag opening every worker-side message.
pub const WORKER_PROTOCOL: &[u8] = b"MDPW01";

/// Reserved service-name prefix for broker introspection.
pub const MMI_PREFIX: &str = "mmi.";

pub use broker::{Broker, BrokerHandle};
pub use client::{AsyncClient, SyncClient};
pub use command::Command;
pub use error::{MdpError, Result};
pub use worker::{RequestHandler, Worker};
