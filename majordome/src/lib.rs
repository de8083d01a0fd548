//! # Majordome
//!
//! A Majordomo-pattern message queue: one broker, any number of service
//! workers and request clients.
//!
//! ## Architecture
//!
//! Majordome is structured as a small messaging kernel with clean layering:
//!
//! - **`majordome-core`**: wire framing, connection pumps, payload codec
//! - **`majordome-mdp`**: the protocol state machines (broker, worker,
//!   client)
//! - **`majordome`**: public API surface (this crate)
//!
//! Clients address *services* by name; the broker routes each request to a
//! free worker registered for that service, queues it when every worker is
//! busy, and detects dead workers through heartbeats. Workers that lose
//! their broker reconnect on their own with a fixed backoff.
//!
//! ## Quick Start
//!
//! ### Broker
//!
//! ```rust,no_run
//! use majordome::{Broker, MqConfig, MqOptions};
//!
//! #[compio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MqConfig::new("127.0.0.1", 40410);
//!     let handle = Broker::start(config, MqOptions::default()).await?;
//!     // ... serve until shutdown ...
//!     handle.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ### Worker
//!
//! ```rust,no_run
//! use majordome::{Endpoint, MqMessage, MqOptions, Worker};
//!
//! #[compio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let endpoint = Endpoint::parse("tcp://127.0.0.1:40410")?;
//!     let worker = Worker::new(endpoint, "echo", MqOptions::default());
//!     worker.run(&mut |request: MqMessage| request).await?;
//!     Ok(())
//! }
//! ```
//!
//! ### Client
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use majordome::{Endpoint, MqMessage, MqOptions, SyncClient};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let endpoint = Endpoint::parse("tcp://127.0.0.1:40410")?;
//!     let mut client = SyncClient::new(endpoint, MqOptions::default())?;
//!
//!     let request = MqMessage::new("ping");
//!     match client.request("echo", &request, Duration::from_secs(1))? {
//!         Some(reply) => println!("reply: {}", reply.action()),
//!         None => println!("no reply within the deadline"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Delivery semantics
//!
//! - Requests for services no worker has ever registered are dropped by
//!   the broker; the client only observes its own timeout.
//! - A timed-out request is not retried or cancelled on the wire; any late
//!   reply is discarded.
//! - A request dispatched to a worker that dies before replying is lost.
//!
//! Applications that need stronger guarantees re-issue requests
//! themselves.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Re-export core types
pub use bytes::Bytes;

pub mod dev_tracing;

pub use majordome_core::config::MqConfig;
pub use majordome_core::endpoint::Endpoint;
pub use majordome_core::error::CoreError;
pub use majordome_core::message::{MessageError, MqMessage};
pub use majordome_core::options::MqOptions;
pub use majordome_mdp::broker::{Broker, BrokerHandle};
pub use majordome_mdp::client::{AsyncClient, SyncClient};
pub use majordome_mdp::command::Command;
pub use majordome_mdp::error::MdpError;
pub use majordome_mdp::worker::{RequestHandler, Worker};
pub use majordome_mdp::{CLIENT_PROTOCOL, MMI_PREFIX, WORKER_PROTOCOL};
