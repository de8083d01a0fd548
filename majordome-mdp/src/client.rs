//! Client-side requesters.
//!
//! [`AsyncClient`] suspends on the event loop; [`SyncClient`] wraps it with
//! its own runtime to give non-async callers a plain call/return API.
//!
//! The connection follows a strict send → receive alternation: at most one
//! request may be outstanding. A timed-out request is abandoned: the
//! connection is re-dialed before the next send so that a late reply from
//! the broker can never bleed into a later exchange. Timeouts are reported
//! as `Ok(None)`, never as errors, and nothing is retried automatically.

use std::time::{Duration, Instant};

use bytes::Bytes;
use compio::net::TcpStream;
use tracing::{debug, trace, warn};

use majordome_core::actor::{spawn_connection, ConnEvent, Connection};
use majordome_core::endpoint::Endpoint;
use majordome_core::error::CoreError;
use majordome_core::message::MqMessage;
use majordome_core::options::MqOptions;
use majordome_core::tcp::enable_tcp_nodelay;

use crate::error::{MdpError, Result};
use crate::CLIENT_PROTOCOL;

/// Request/reply alternation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReqState {
    /// Ready to send a request
    Idle,
    /// Waiting for the reply to the last request
    AwaitingReply,
}

/// Asynchronous requester.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use majordome_core::endpoint::Endpoint;
/// use majordome_core::message::MqMessage;
/// use majordome_core::options::MqOptions;
/// use majordome_mdp::client::AsyncClient;
///
/// #[compio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let endpoint = Endpoint::parse("tcp://127.0.0.1:40410")?;
///     let mut client = AsyncClient::new(endpoint, MqOptions::default());
///
///     let request = MqMessage::new("ping");
///     match client.request("dbmgr", &request, Duration::from_millis(500)).await? {
///         Some(reply) => println!("reply: {}", reply.action()),
///         None => println!("no reply within the deadline"),
///     }
///     Ok(())
/// }
/// ```
pub struct AsyncClient {
    endpoint: Endpoint,
    options: MqOptions,
    conn: Option<Connection>,
    state: ReqState,
}

impl AsyncClient {
    /// Create a requester; the connection is dialed lazily on first send.
    #[must_use]
    pub const fn new(endpoint: Endpoint, options: MqOptions) -> Self {
        Self {
            endpoint,
            options,
            conn: None,
            state: ReqState::Idle,
        }
    }

    /// Send a request and wait up to `timeout` for the reply.
    ///
    /// Returns `Ok(None)` on timeout; the caller decides whether to
    /// re-issue.
    pub async fn request(
        &mut self,
        service: &str,
        request: &MqMessage,
        timeout: Duration,
    ) -> Result<Option<MqMessage>> {
        self.send(service, request).await?;
        self.recv(timeout).await
    }

    /// Frame-level variant of [`AsyncClient::request`], used for `mmi.*`
    /// queries whose payloads are raw frames rather than encoded messages.
    pub async fn request_raw(
        &mut self,
        service: &str,
        payload: Vec<Bytes>,
        timeout: Duration,
    ) -> Result<Option<Vec<Bytes>>> {
        self.send_raw(service, payload).await?;
        self.recv_raw(timeout).await
    }

    /// Send a request without waiting for the reply.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidState` if a request is already outstanding.
    pub async fn send(&mut self, service: &str, request: &MqMessage) -> Result<()> {
        self.send_raw(service, request.to_frames()?).await
    }

    /// Wait up to `timeout` for the reply to the outstanding request.
    ///
    /// # Errors
    ///
    /// Fails with `NoPendingRequest` if nothing was sent.
    pub async fn recv(&mut self, timeout: Duration) -> Result<Option<MqMessage>> {
        match self.recv_raw(timeout).await? {
            Some(payload) => Ok(Some(MqMessage::from_frames(&payload)?)),
            None => Ok(None),
        }
    }

    /// Frame-level send.
    pub async fn send_raw(&mut self, service: &str, payload: Vec<Bytes>) -> Result<()> {
        if self.state == ReqState::AwaitingReply {
            return Err(MdpError::InvalidState("a request is already outstanding"));
        }

        if self.conn.is_none() {
            debug!("[CLIENT] connecting to {}", self.endpoint);
            let stream = TcpStream::connect(self.endpoint.addr()).await?;
            let _ = enable_tcp_nodelay(&stream);
            self.conn = Some(spawn_connection(stream, &self.options));
        }
        let conn = self.conn.as_ref().ok_or(CoreError::ConnectionClosed)?;

        let mut frames = Vec::with_capacity(payload.len() + 2);
        frames.push(Bytes::from_static(CLIENT_PROTOCOL));
        frames.push(Bytes::copy_from_slice(service.as_bytes()));
        frames.extend(payload);

        if let Err(e) = conn.send(frames) {
            self.teardown();
            return Err(e.into());
        }
        trace!("[CLIENT] request sent to service {service}");
        self.state = ReqState::AwaitingReply;
        Ok(())
    }

    /// Frame-level receive.
    pub async fn recv_raw(&mut self, timeout: Duration) -> Result<Option<Vec<Bytes>>> {
        if self.state == ReqState::Idle {
            return Err(MdpError::NoPendingRequest);
        }
        let deadline = Instant::now() + timeout;

        loop {
            let Some(conn) = self.conn.as_ref() else {
                self.state = ReqState::Idle;
                return Ok(None);
            };

            let remaining = deadline.saturating_duration_since(Instant::now());
            match compio::time::timeout(remaining, conn.events().recv_async()).await {
                Err(_) => {
                    // Abandon the exchange; re-dial before the next send so
                    // a late reply cannot be mistaken for a fresh one.
                    debug!("[CLIENT] no reply within {timeout:?}, abandoning request");
                    self.teardown();
                    self.state = ReqState::Idle;
                    return Ok(None);
                }
                Ok(Err(_)) | Ok(Ok(ConnEvent::Closed)) => {
                    warn!("[CLIENT] connection lost while awaiting reply");
                    self.teardown();
                    self.state = ReqState::Idle;
                    return Ok(None);
                }
                Ok(Ok(ConnEvent::Message(frames))) => {
                    if frames.len() < 2 || frames[0] != CLIENT_PROTOCOL {
                        warn!("[CLIENT] dropping malformed reply");
                        continue;
                    }
                    trace!(
                        "[CLIENT] reply from service {}",
                        String::from_utf8_lossy(&frames[1])
                    );
                    self.state = ReqState::Idle;
                    return Ok(Some(frames[2..].to_vec()));
                }
            }
        }
    }

    /// Ask the broker whether `service` has at least one registered
    /// worker: `"200"` if so, `"404"` otherwise.
    pub async fn service_status(
        &mut self,
        service: &str,
        timeout: Duration,
    ) -> Result<Option<String>> {
        let payload = vec![Bytes::copy_from_slice(service.as_bytes())];
        let reply = self.request_raw("mmi.service", payload, timeout).await?;
        Ok(reply.and_then(|frames| {
            frames
                .first()
                .map(|code| String::from_utf8_lossy(code).into_owned())
        }))
    }

    /// Ask the broker for its service listing (one entry per registered
    /// worker).
    pub async fn known_services(&mut self, timeout: Duration) -> Result<Option<String>> {
        let reply = self.request_raw("mmi.services", Vec::new(), timeout).await?;
        Ok(reply.and_then(|frames| {
            frames
                .first()
                .map(|listing| String::from_utf8_lossy(listing).into_owned())
        }))
    }

    fn teardown(&mut self) {
        if let Some(conn) = self.conn.take() {
            conn.close();
        }
    }
}

/// Blocking requester for non-async callers.
///
/// Owns a private runtime; each call drives the async client to
/// completion on the calling thread.
pub struct SyncClient {
    runtime: compio::runtime::Runtime,
    inner: AsyncClient,
}

impl SyncClient {
    /// Create a blocking requester.
    ///
    /// # Errors
    ///
    /// Returns an error if the private runtime cannot be created.
    pub fn new(endpoint: Endpoint, options: MqOptions) -> std::io::Result<Self> {
        Ok(Self {
            runtime: compio::runtime::Runtime::new()?,
            inner: AsyncClient::new(endpoint, options),
        })
    }

    /// Blocking [`AsyncClient::request`].
    pub fn request(
        &mut self,
        service: &str,
        request: &MqMessage,
        timeout: Duration,
    ) -> Result<Option<MqMessage>> {
        let Self { runtime, inner } = self;
        runtime.block_on(inner.request(service, request, timeout))
    }

    /// Blocking [`AsyncClient::request_raw`].
    pub fn request_raw(
        &mut self,
        service: &str,
        payload: Vec<Bytes>,
        timeout: Duration,
    ) -> Result<Option<Vec<Bytes>>> {
        let Self { runtime, inner } = self;
        runtime.block_on(inner.request_raw(service, payload, timeout))
    }

    /// Blocking [`AsyncClient::service_status`].
    pub fn service_status(
        &mut self,
        service: &str,
        timeout: Duration,
    ) -> Result<Option<String>> {
        let Self { runtime, inner } = self;
        runtime.block_on(inner.service_status(service, timeout))
    }

    /// Blocking [`AsyncClient::known_services`].
    pub fn known_services(&mut self, timeout: Duration) -> Result<Option<String>> {
        let Self { runtime, inner } = self;
        runtime.block_on(inner.known_services(timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alternation_is_enforced_before_any_io() {
        // State checks happen before the lazy connect, so they are
        // observable without a broker.
        let endpoint = Endpoint::parse("tcp://127.0.0.1:1").unwrap();
        let mut client = AsyncClient::new(endpoint, MqOptions::default());

        let err = futures::executor::block_on(client.recv_raw(Duration::from_millis(1)))
            .unwrap_err();
        assert!(matches!(err, MdpError::NoPendingRequest));
    }
}
