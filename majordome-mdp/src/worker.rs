//! Worker-side protocol client.
//!
//! A worker dials the broker, announces the service it answers for and then
//! alternates between serving requests and heartbeating. When the broker
//! falls silent past the liveness window, or sends an explicit
//! DISCONNECT, the session is torn down and re-dialed after the backoff
//! delay.
//!
//! # State machine
//!
//! ```text
//! DISCONNECTED → CONNECTING → READY → (busy while handling one request)
//!       ↑                       │
//!       └───── backoff ─────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use majordome_core::endpoint::Endpoint;
//! use majordome_core::message::MqMessage;
//! use majordome_core::options::MqOptions;
//! use majordome_mdp::worker::Worker;
//!
//! #[compio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let endpoint = Endpoint::parse("tcp://127.0.0.1:40410")?;
//!     let worker = Worker::new(endpoint, "echo", MqOptions::default());
//!     worker.run(&mut |request: MqMessage| request).await?;
//!     Ok(())
//! }
//! ```

use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use compio::net::TcpStream;
use tracing::{debug, info, trace, warn};

use majordome_core::actor::{spawn_connection, ConnEvent, Connection};
use majordome_core::endpoint::Endpoint;
use majordome_core::message::MqMessage;
use majordome_core::options::MqOptions;
use majordome_core::reconnect::ReconnectState;
use majordome_core::tcp::enable_tcp_nodelay;

use crate::command::Command;
use crate::envelope::split_envelope;
use crate::error::Result;
use crate::WORKER_PROTOCOL;

/// Application seam: turns one request payload into one reply payload.
///
/// Implemented for any `FnMut(MqMessage) -> MqMessage`, so simple workers
/// can pass a closure. The reply is sent with the request's captured
/// return-address envelope, which is moved into the send, so a request can
/// be answered exactly once.
#[async_trait(?Send)]
pub trait RequestHandler {
    async fn handle(&mut self, request: MqMessage) -> MqMessage;
}

#[async_trait(?Send)]
impl<F> RequestHandler for F
where
    F: FnMut(MqMessage) -> MqMessage,
{
    async fn handle(&mut self, request: MqMessage) -> MqMessage {
        (self)(request)
    }
}

/// Outcome of one connected session.
enum SessionEnd {
    /// Broker silent past the liveness window, or connection lost
    BrokerLost,
    /// Broker asked us to go away
    Disconnected,
}

/// Worker-side protocol client.
pub struct Worker {
    endpoint: Endpoint,
    service: Bytes,
    options: MqOptions,
}

impl Worker {
    /// Create a worker for `service`, answering via `handler` once run.
    pub fn new(endpoint: Endpoint, service: &str, options: MqOptions) -> Self {
        Self {
            endpoint,
            service: Bytes::copy_from_slice(service.as_bytes()),
            options,
        }
    }

    /// Connect and serve until the surrounding task is cancelled.
    ///
    /// Connection loss and broker silence are handled internally with the
    /// configured backoff; they are not surfaced as errors.
    ///
    /// # Errors
    ///
    /// Returns an error only for failures that reconnecting cannot fix,
    /// e.g. a reply payload that cannot be serialized.
    pub async fn run<H: RequestHandler>(&self, handler: &mut H) -> Result<()> {
        let mut backoff = ReconnectState::new(&self.options);
        loop {
            match self.session(handler).await {
                Ok(end) => {
                    backoff.reset();
                    match end {
                        SessionEnd::BrokerLost => {
                            warn!(
                                "[WORKER] lost broker at {}, reconnecting",
                                self.endpoint
                            );
                        }
                        SessionEnd::Disconnected => {
                            info!("[WORKER] broker sent DISCONNECT, reconnecting");
                        }
                    }
                }
                Err(e) if e.is_connection_error() => {
                    debug!("[WORKER] connect to {} failed: {e}", self.endpoint);
                }
                Err(e) => return Err(e),
            }

            let delay = backoff.next_delay();
            trace!("[WORKER] next attempt in {delay:?}");
            compio::time::sleep(delay).await;
        }
    }

    /// One connected session: READY, then serve and heartbeat until the
    /// broker goes away.
    async fn session<H: RequestHandler>(&self, handler: &mut H) -> Result<SessionEnd> {
        debug!("[WORKER] connecting to {}", self.endpoint);
        let stream = TcpStream::connect(self.endpoint.addr()).await?;
        let _ = enable_tcp_nodelay(&stream);
        let conn = spawn_connection(stream, &self.options);

        conn.send(vec![
            Bytes::from_static(WORKER_PROTOCOL),
            Command::Ready.frame(),
            self.service.clone(),
        ])?;
        info!(
            "[WORKER] ready for service {} at {}",
            String::from_utf8_lossy(&self.service),
            self.endpoint
        );

        let hb_interval = self.options.hb_interval;
        let mut broker_expires = Instant::now() + self.options.worker_expiry();
        let mut next_hb = Instant::now() + hb_interval;

        loop {
            let now = Instant::now();
            if now >= broker_expires {
                conn.close();
                return Ok(SessionEnd::BrokerLost);
            }
            if now >= next_hb {
                conn.send(vec![
                    Bytes::from_static(WORKER_PROTOCOL),
                    Command::Heartbeat.frame(),
                ])?;
                next_hb = now + hb_interval;
            }

            let wait = next_hb.min(broker_expires).saturating_duration_since(now);
            match compio::time::timeout(wait, conn.events().recv_async()).await {
                Err(_) => continue, // a timer is due
                Ok(Err(_)) | Ok(Ok(ConnEvent::Closed)) => return Ok(SessionEnd::BrokerLost),
                Ok(Ok(ConnEvent::Message(frames))) => {
                    // Any traffic proves the broker alive.
                    broker_expires = Instant::now() + self.options.worker_expiry();
                    if let Some(end) = self.on_frames(&conn, handler, frames).await? {
                        return Ok(end);
                    }
                }
            }
        }
    }

    /// Handle one inbound message; `Some(end)` finishes the session.
    async fn on_frames<H: RequestHandler>(
        &self,
        conn: &Connection,
        handler: &mut H,
        frames: Vec<Bytes>,
    ) -> Result<Option<SessionEnd>> {
        if frames.len() < 2 || frames[0] != WORKER_PROTOCOL || frames[1].len() != 1 {
            warn!("[WORKER] dropping malformed broker message");
            return Ok(None);
        }

        match Command::from_byte(frames[1][0]) {
            Some(Command::Request) => {
                let Some((envelope, payload)) = split_envelope(&frames[2..]) else {
                    warn!("[WORKER] dropping request without an address envelope");
                    return Ok(None);
                };
                if envelope.is_empty() {
                    warn!("[WORKER] dropping request with an empty address envelope");
                    return Ok(None);
                }
                let request = match MqMessage::from_frames(&payload) {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!("[WORKER] dropping undecodable request: {e}");
                        return Ok(None);
                    }
                };

                debug!("[WORKER] handling request {}", request.action());
                let reply = handler.handle(request).await;

                let mut out = vec![
                    Bytes::from_static(WORKER_PROTOCOL),
                    Command::Reply.frame(),
                ];
                out.extend(envelope); // consumed exactly once
                out.push(Bytes::new());
                out.extend(reply.to_frames()?);
                conn.send(out)?;
                Ok(None)
            }
            Some(Command::Heartbeat) => Ok(None), // expiry already refreshed
            Some(Command::Disconnect) => {
                conn.close();
                Ok(Some(SessionEnd::Disconnected))
            }
            Some(cmd) => {
                warn!("[WORKER] unexpected {cmd} from broker, ignored");
                Ok(None)
            }
            None => {
                warn!("[WORKER] unknown command {:#04x} from broker, ignored", frames[1][0]);
                Ok(None)
            }
        }
    }
}
