//! Connection pumps (protocol-agnostic core)
//!
//! One connection == one TCP stream == two pumps:
//!
//! - Write pump: application → kernel (drains a command channel)
//! - Read pump: kernel → application (decodes frames, assembles multiparts)
//!
//! The pumps share nothing but the cloned stream handle (compio sockets are
//! cheaply cloneable handles to the same fd), so neither direction can
//! starve the other. Routing and protocol logic live in the layers above;
//! the pumps only move complete multipart messages.

use bytes::{Bytes, BytesMut};
use compio::buf::BufResult;
use compio::io::{AsyncRead, AsyncWriteExt};
use compio::net::TcpStream;
use compio::runtime::TryClone;
use flume::{Receiver, Sender};
use futures::FutureExt;
use tracing::{trace, warn};

use crate::codec::{encode_frames, FrameDecoder};
use crate::error::{CoreError, Result};
use crate::multipart::MultipartAssembler;
use crate::options::MqOptions;

/// Commands from application to a connection
#[derive(Debug)]
pub enum ConnCmd {
    /// Send a multipart message
    Send(Vec<Bytes>),
    /// Close the connection
    Close,
}

/// Events from a connection to the application
#[derive(Debug, Clone)]
pub enum ConnEvent {
    /// Received a complete multipart message
    Message(Vec<Bytes>),
    /// Connection closed (peer EOF, I/O error, protocol violation or
    /// local close)
    Closed,
}

/// Handle to a spawned connection: commands in, events out.
pub struct Connection {
    cmd_tx: Sender<ConnCmd>,
    event_rx: Receiver<ConnEvent>,
}

impl Connection {
    /// Queue a multipart message for sending.
    pub fn send(&self, frames: Vec<Bytes>) -> Result<()> {
        self.cmd_tx
            .send(ConnCmd::Send(frames))
            .map_err(|_| CoreError::ChannelSend)
    }

    /// Ask the write pump to close the connection.
    pub fn close(&self) {
        let _ = self.cmd_tx.send(ConnCmd::Close);
    }

    /// Receive the next event.
    pub async fn recv(&self) -> ConnEvent {
        match self.event_rx.recv_async().await {
            Ok(ev) => ev,
            Err(_) => ConnEvent::Closed,
        }
    }

    /// The raw event channel, for callers that multiplex it themselves.
    #[inline]
    pub const fn events(&self) -> &Receiver<ConnEvent> {
        &self.event_rx
    }
}

/// Spawn pumps for a connection with its own private channels.
///
/// Used by workers and clients, which own exactly one connection.
#[must_use]
pub fn spawn_connection(stream: TcpStream, options: &MqOptions) -> Connection {
    let (cmd_tx, cmd_rx) = flume::unbounded();
    let (event_tx, event_rx) = flume::unbounded();
    spawn_connection_with(stream, cmd_rx, event_tx, |ev| ev, options);
    Connection { cmd_tx, event_rx }
}

/// Spawn pumps for a connection that reports into a shared event channel.
///
/// Used by the broker hub, which multiplexes many peers onto one channel;
/// `wrap` tags each event with the peer's identity.
pub fn spawn_connection_with<E>(
    stream: TcpStream,
    cmd_rx: Receiver<ConnCmd>,
    event_tx: Sender<E>,
    wrap: impl Fn(ConnEvent) -> E + 'static,
    options: &MqOptions,
) where
    E: 'static,
{
    let read_buffer_size = options.read_buffer_size;
    let max_frame_size = options.max_frame_size;
    let max_frames = options.max_frames;

    // One half writes, the other reads; the stop channel lets the write
    // pump tear the read pump down when the connection is closed locally.
    let mut write_stream = stream.try_clone().expect("clone stream handle");
    let mut read_stream = stream;
    let (stop_tx, stop_rx) = flume::bounded::<()>(1);

    compio::runtime::spawn(async move {
        let mut out = BytesMut::new();
        while let Ok(cmd) = cmd_rx.recv_async().await {
            match cmd {
                ConnCmd::Send(frames) => {
                    out.clear();
                    encode_frames(&frames, &mut out);
                    let BufResult(res, _) = write_stream.write_all(out.to_vec()).await;
                    if let Err(e) = res {
                        trace!("[CONN] write failed: {e}");
                        break;
                    }
                }
                ConnCmd::Close => break,
            }
        }
        // Dropping stop_tx wakes the read pump out of a blocked read.
        drop(stop_tx);
    })
    .detach();

    compio::runtime::spawn(async move {
        let mut decoder = FrameDecoder::new(max_frame_size);
        let mut assembler = MultipartAssembler::new(max_frames, max_frame_size);
        let mut inbuf = BytesMut::with_capacity(read_buffer_size);

        'conn: loop {
            let buf = Vec::with_capacity(read_buffer_size);
            let read = AsyncRead::read(&mut read_stream, buf).fuse();
            let stopped = stop_rx.recv_async().fuse();
            futures::pin_mut!(read, stopped);

            let chunk = futures::select! {
                res = read => {
                    let BufResult(res, buf) = res;
                    match res {
                        Ok(0) => {
                            trace!("[CONN] peer closed (EOF)");
                            break 'conn;
                        }
                        Ok(_) => buf,
                        Err(e) => {
                            trace!("[CONN] read failed: {e}");
                            break 'conn;
                        }
                    }
                }
                _ = stopped => break 'conn,
            };

            inbuf.extend_from_slice(&chunk);
            loop {
                match decoder.decode(&mut inbuf) {
                    Ok(Some(frame)) => match assembler.push(frame) {
                        Ok(Some(msg)) => {
                            if event_tx.send(wrap(ConnEvent::Message(msg))).is_err() {
                                break 'conn;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!("[CONN] dropping connection: {e}");
                            break 'conn;
                        }
                    },
                    Ok(None) => break,
                    Err(e) => {
                        warn!("[CONN] dropping connection: {e}");
                        break 'conn;
                    }
                }
            }
        }

        let _ = event_tx.send(wrap(ConnEvent::Closed));
    })
    .detach();
}
