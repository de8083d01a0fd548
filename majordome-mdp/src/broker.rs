//! MDP broker: service registry, request routing and liveness sweeps.
//!
//! The broker is split in two layers:
//!
//! - [`BrokerCore`] is a pure state machine (sans-IO): it owns the worker
//!   records and per-service queues and turns `(peer, frames, now)` into a
//!   list of outgoing actions. All routing policy lives here, which is also
//!   where it is unit-tested.
//! - The hub loop wires the core to real connections: accept loops assign
//!   each TCP peer an identity and feed its multiparts into one shared
//!   channel; the hub applies the core's actions to the peer map and drives
//!   the periodic liveness tick.
//!
//! Known gap, kept on purpose: a request already dispatched to a worker
//! that dies before replying is lost; it is not returned to the pending
//! queue. The client observes a timeout and decides whether to re-issue.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use bytes::Bytes;
use compio::net::TcpListener;
use flume::{Receiver, Sender};
use futures::FutureExt;
use hashbrown::HashMap;
use tracing::{debug, info, trace, warn};

use majordome_core::actor::{spawn_connection_with, ConnCmd, ConnEvent};
use majordome_core::config::MqConfig;
use majordome_core::options::MqOptions;
use majordome_core::tcp::enable_tcp_nodelay;

use crate::command::Command;
use crate::envelope::{split_envelope, wrap_envelope};
use crate::error::Result;
use crate::{CLIENT_PROTOCOL, MMI_PREFIX, WORKER_PROTOCOL};

/// Outgoing effect decided by the routing core, applied by the hub.
#[derive(Debug)]
pub enum BrokerAction {
    /// Send a multipart message to a connected peer
    Send { to: Bytes, frames: Vec<Bytes> },
    /// Close a peer's connection
    Drop { peer: Bytes },
}

struct WorkerRecord {
    service: Bytes,
    expires_at: Instant,
}

#[derive(Default)]
struct ServiceQueue {
    /// Workers free to take a request, oldest-ready first
    available: VecDeque<Bytes>,
    /// Requests waiting for a free worker, oldest first; unbounded on
    /// purpose: queueing in memory is the backpressure policy
    pending: VecDeque<PendingRequest>,
}

struct PendingRequest {
    envelope: Vec<Bytes>,
    payload: Vec<Bytes>,
}

/// The broker routing state machine.
///
/// Owned and mutated exclusively by the hub loop task; no locking.
pub struct BrokerCore {
    options: MqOptions,
    workers: HashMap<Bytes, WorkerRecord>,
    /// Created lazily on first READY for a service, never removed.
    services: HashMap<Bytes, ServiceQueue>,
}

impl BrokerCore {
    #[must_use]
    pub fn new(options: MqOptions) -> Self {
        Self {
            options,
            workers: HashMap::new(),
            services: HashMap::new(),
        }
    }

    /// Process one inbound multipart message from `peer`.
    ///
    /// Malformed input never panics or poisons the state: it is logged and
    /// dropped, except for an unrecognized worker command byte which earns
    /// the peer a defensive DISCONNECT.
    pub fn handle_message(
        &mut self,
        peer: &Bytes,
        frames: Vec<Bytes>,
        now: Instant,
    ) -> Vec<BrokerAction> {
        if frames.len() < 2 {
            warn!("[BROKER] dropping short message ({} frames)", frames.len());
            return Vec::new();
        }

        if frames[0] == CLIENT_PROTOCOL {
            let service = frames[1].clone();
            let payload = frames[2..].to_vec();
            self.on_client_request(peer, service, payload)
        } else if frames[0] == WORKER_PROTOCOL {
            if frames[1].len() != 1 {
                warn!("[BROKER] dropping worker message with malformed command frame");
                return Vec::new();
            }
            let byte = frames[1][0];
            match Command::from_byte(byte) {
                Some(Command::Ready) => self.on_ready(peer, frames.get(2).cloned(), now),
                Some(Command::Heartbeat) => self.on_heartbeat(peer, now),
                Some(Command::Reply) => self.on_worker_reply(peer, &frames[2..], now),
                Some(Command::Disconnect) => self.on_disconnect(peer),
                // REQUEST only ever flows broker → worker
                Some(Command::Request) | None => self.on_unknown_command(peer, byte),
            }
        } else {
            warn!(
                "[BROKER] dropping message with unknown protocol tag {:?}",
                String::from_utf8_lossy(&frames[0])
            );
            Vec::new()
        }
    }

    /// READY: register the worker and add it to the free pool.
    ///
    /// Idempotent: a second READY from the same identity is a no-op.
    fn on_ready(
        &mut self,
        peer: &Bytes,
        service: Option<Bytes>,
        now: Instant,
    ) -> Vec<BrokerAction> {
        let Some(service) = service else {
            warn!("[BROKER] dropping READY without a service name");
            return Vec::new();
        };
        if self.workers.contains_key(peer) {
            debug!(
                "[BROKER] duplicate READY from {}, ignored",
                String::from_utf8_lossy(peer)
            );
            return Vec::new();
        }

        info!(
            "[BROKER] worker {} ready for service {}",
            String::from_utf8_lossy(peer),
            String::from_utf8_lossy(&service)
        );
        self.workers.insert(
            peer.clone(),
            WorkerRecord {
                service: service.clone(),
                expires_at: now + self.options.broker_expiry(),
            },
        );
        self.services
            .entry(service)
            .or_default()
            .available
            .push_back(peer.clone());
        Vec::new()
    }

    /// HEARTBEAT: refresh the worker's expiry. Unknown senders are ignored.
    fn on_heartbeat(&mut self, peer: &Bytes, now: Instant) -> Vec<BrokerAction> {
        if let Some(worker) = self.workers.get_mut(peer) {
            worker.expires_at = now + self.options.broker_expiry();
        } else {
            trace!(
                "[BROKER] heartbeat from unknown peer {}",
                String::from_utf8_lossy(peer)
            );
        }
        Vec::new()
    }

    /// DISCONNECT: unregister immediately, liveness notwithstanding.
    fn on_disconnect(&mut self, peer: &Bytes) -> Vec<BrokerAction> {
        if self.unregister(peer) {
            info!(
                "[BROKER] worker {} disconnected",
                String::from_utf8_lossy(peer)
            );
        }
        Vec::new()
    }

    /// Connection gone without a goodbye.
    pub fn peer_down(&mut self, peer: &Bytes) {
        if self.unregister(peer) {
            info!(
                "[BROKER] worker {} lost its connection",
                String::from_utf8_lossy(peer)
            );
        }
    }

    fn on_unknown_command(&mut self, peer: &Bytes, byte: u8) -> Vec<BrokerAction> {
        warn!(
            "[BROKER] unknown command {byte:#04x} from {}, disconnecting it",
            String::from_utf8_lossy(peer)
        );
        self.unregister(peer);
        vec![
            BrokerAction::Send {
                to: peer.clone(),
                frames: worker_message(Command::Disconnect),
            },
            BrokerAction::Drop { peer: peer.clone() },
        ]
    }

    /// Route a client request: introspection, dispatch, or queue.
    ///
    /// Requests for services no worker has ever registered are dropped, not
    /// bounced back; the client's own timeout is the only failure signal.
    fn on_client_request(
        &mut self,
        peer: &Bytes,
        service: Bytes,
        payload: Vec<Bytes>,
    ) -> Vec<BrokerAction> {
        if let Ok(name) = std::str::from_utf8(&service) {
            if name.starts_with(MMI_PREFIX) {
                return self.on_mmi_request(peer, &service, name, &payload);
            }
        }

        let Some(queue) = self.services.get_mut(&service) else {
            warn!(
                "[BROKER] dropping request for unknown service {}",
                String::from_utf8_lossy(&service)
            );
            return Vec::new();
        };

        let envelope = vec![peer.clone()];
        if let Some(worker) = queue.available.pop_front() {
            trace!(
                "[BROKER] dispatching {} request to {}",
                String::from_utf8_lossy(&service),
                String::from_utf8_lossy(&worker)
            );
            vec![BrokerAction::Send {
                to: worker,
                frames: request_message(envelope, payload),
            }]
        } else {
            debug!(
                "[BROKER] no free worker for {}, queueing request ({} pending)",
                String::from_utf8_lossy(&service),
                queue.pending.len() + 1
            );
            queue.pending.push_back(PendingRequest { envelope, payload });
            Vec::new()
        }
    }

    /// REPLY: route back to the client, then hand the worker the oldest
    /// pending request for its service, or return it to the free pool.
    fn on_worker_reply(
        &mut self,
        peer: &Bytes,
        body: &[Bytes],
        now: Instant,
    ) -> Vec<BrokerAction> {
        let Some(worker) = self.workers.get_mut(peer) else {
            warn!(
                "[BROKER] dropping reply from unknown worker {}",
                String::from_utf8_lossy(peer)
            );
            return Vec::new();
        };
        worker.expires_at = now + self.options.broker_expiry();
        let service = worker.service.clone();

        let Some((envelope, payload)) = split_envelope(body) else {
            warn!("[BROKER] dropping reply without an address envelope");
            return Vec::new();
        };
        let Some((client, hops)) = envelope.split_first() else {
            warn!("[BROKER] dropping reply with an empty address envelope");
            return Vec::new();
        };

        let mut reply = Vec::with_capacity(hops.len() + payload.len() + 3);
        if !hops.is_empty() {
            reply = wrap_envelope(hops.to_vec(), reply);
        }
        reply.push(Bytes::from_static(CLIENT_PROTOCOL));
        reply.push(service.clone());
        reply.extend(payload);

        let mut actions = vec![BrokerAction::Send {
            to: client.clone(),
            frames: reply,
        }];

        // The queue exists: READY created it and queues are never removed.
        if let Some(queue) = self.services.get_mut(&service) {
            if let Some(next) = queue.pending.pop_front() {
                trace!(
                    "[BROKER] handing queued {} request to {}",
                    String::from_utf8_lossy(&service),
                    String::from_utf8_lossy(peer)
                );
                actions.push(BrokerAction::Send {
                    to: peer.clone(),
                    frames: request_message(next.envelope, next.payload),
                });
            } else if !queue.available.contains(peer) {
                queue.available.push_back(peer.clone());
            }
        }

        actions
    }

    /// Periodic sweep: purge workers whose expiry passed, heartbeat the
    /// rest.
    ///
    /// A purged worker's in-flight request (if any) is *not* re-queued.
    pub fn tick(&mut self, now: Instant) -> Vec<BrokerAction> {
        let expired: Vec<Bytes> = self
            .workers
            .iter()
            .filter(|(_, w)| now >= w.expires_at)
            .map(|(id, _)| id.clone())
            .collect();

        let mut actions = Vec::new();
        for peer in expired {
            warn!(
                "[BROKER] purging silent worker {}",
                String::from_utf8_lossy(&peer)
            );
            self.unregister(&peer);
            actions.push(BrokerAction::Drop { peer });
        }

        for peer in self.workers.keys() {
            actions.push(BrokerAction::Send {
                to: peer.clone(),
                frames: worker_message(Command::Heartbeat),
            });
        }
        actions
    }

    /// Orderly shutdown: disconnect every worker and clear all state.
    pub fn shutdown(&mut self) -> Vec<BrokerAction> {
        let actions = self
            .workers
            .keys()
            .map(|peer| BrokerAction::Send {
                to: peer.clone(),
                frames: worker_message(Command::Disconnect),
            })
            .collect();
        self.workers.clear();
        self.services.clear();
        actions
    }

    /// `mmi.*` introspection, answered by the broker itself.
    fn on_mmi_request(
        &self,
        peer: &Bytes,
        service: &Bytes,
        name: &str,
        payload: &[Bytes],
    ) -> Vec<BrokerAction> {
        let code = match name {
            "mmi.service" => match payload.first() {
                Some(asked) if self.workers.values().any(|w| w.service == *asked) => {
                    Bytes::from_static(b"200")
                }
                _ => Bytes::from_static(b"404"),
            },
            // One entry per registered worker, not deduplicated.
            "mmi.services" => {
                let names: Vec<_> = self
                    .workers
                    .values()
                    .map(|w| String::from_utf8_lossy(&w.service).into_owned())
                    .collect();
                Bytes::from(names.join(", "))
            }
            _ => Bytes::from_static(b"501"),
        };

        vec![BrokerAction::Send {
            to: peer.clone(),
            frames: vec![Bytes::from_static(CLIENT_PROTOCOL), service.clone(), code],
        }]
    }

    /// Remove a worker record and its free-pool slot. Returns whether the
    /// peer was a registered worker.
    fn unregister(&mut self, peer: &Bytes) -> bool {
        let Some(record) = self.workers.remove(peer) else {
            return false;
        };
        if let Some(queue) = self.services.get_mut(&record.service) {
            queue.available.retain(|id| id != peer);
        }
        true
    }
}

fn worker_message(cmd: Command) -> Vec<Bytes> {
    vec![Bytes::from_static(WORKER_PROTOCOL), cmd.frame()]
}

fn request_message(envelope: Vec<Bytes>, payload: Vec<Bytes>) -> Vec<Bytes> {
    let mut frames = worker_message(Command::Request);
    frames.extend(wrap_envelope(envelope, payload));
    frames
}

/// Events multiplexed onto the hub loop's single channel.
enum PeerEvent {
    Up { id: Bytes, cmd_tx: Sender<ConnCmd> },
    Conn { id: Bytes, event: ConnEvent },
    Shutdown,
}

static PEER_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_peer_id() -> Bytes {
    let id = PEER_COUNTER.fetch_add(1, Ordering::Relaxed);
    Bytes::from(format!("peer-{id}"))
}

/// The broker service.
pub struct Broker;

impl Broker {
    /// Bind the configured endpoints and start routing.
    ///
    /// The main endpoint serves workers and clients; if `client_port` is
    /// configured, a second endpoint is bound that clients can use instead;
    /// both feed the same hub.
    ///
    /// # Errors
    ///
    /// Returns an error if an endpoint cannot be parsed or bound.
    pub async fn start(config: MqConfig, options: MqOptions) -> Result<BrokerHandle> {
        let endpoint = config.endpoint()?;
        let listener = TcpListener::bind(endpoint.addr()).await?;
        info!("[BROKER] listening on {endpoint}");

        let client_listener = match config.client_endpoint()? {
            Some(client_endpoint) => {
                let listener = TcpListener::bind(client_endpoint.addr()).await?;
                info!("[BROKER] client endpoint on {client_endpoint}");
                Some(listener)
            }
            None => None,
        };

        let (hub_tx, hub_rx) = flume::unbounded();
        let (stop_tx, stop_rx) = flume::bounded::<()>(1);

        compio::runtime::spawn(accept_loop(
            listener,
            hub_tx.clone(),
            stop_rx.clone(),
            options.clone(),
            "main",
        ))
        .detach();
        if let Some(listener) = client_listener {
            compio::runtime::spawn(accept_loop(
                listener,
                hub_tx.clone(),
                stop_rx,
                options.clone(),
                "client",
            ))
            .detach();
        }

        let hub = compio::runtime::spawn(hub_loop(hub_rx, options));
        Ok(BrokerHandle {
            hub_tx,
            stop_tx,
            hub,
        })
    }
}

/// Handle to a running broker.
///
/// Dropping the handle tears the broker down without the orderly goodbye;
/// call [`BrokerHandle::shutdown`] to disconnect workers first.
pub struct BrokerHandle {
    hub_tx: Sender<PeerEvent>,
    stop_tx: Sender<()>,
    hub: compio::runtime::Task<()>,
}

impl BrokerHandle {
    /// Stop accepting, disconnect workers, close every connection and
    /// clear all state. The handle is consumed; the broker is gone.
    pub async fn shutdown(self) {
        // Dropping the stop channel wakes both accept loops.
        drop(self.stop_tx);
        let _ = self.hub_tx.send(PeerEvent::Shutdown);
        self.hub.await;
    }
}

async fn accept_loop(
    listener: TcpListener,
    hub_tx: Sender<PeerEvent>,
    stop_rx: Receiver<()>,
    options: MqOptions,
    label: &'static str,
) {
    loop {
        let accept = listener.accept().fuse();
        let stopped = stop_rx.recv_async().fuse();
        futures::pin_mut!(accept, stopped);

        futures::select! {
            res = accept => match res {
                Ok((stream, addr)) => {
                    if let Err(e) = enable_tcp_nodelay(&stream) {
                        debug!("[BROKER] could not set TCP_NODELAY: {e}");
                    }
                    let id = next_peer_id();
                    debug!(
                        "[BROKER] peer {} connected from {addr} ({label})",
                        String::from_utf8_lossy(&id)
                    );

                    let (cmd_tx, cmd_rx) = flume::unbounded();
                    // Register before spawning the pumps so the hub sees
                    // PeerUp ahead of the peer's first message.
                    if hub_tx.send(PeerEvent::Up { id: id.clone(), cmd_tx }).is_err() {
                        break;
                    }
                    let tag = id;
                    spawn_connection_with(
                        stream,
                        cmd_rx,
                        hub_tx.clone(),
                        move |event| PeerEvent::Conn { id: tag.clone(), event },
                        &options,
                    );
                }
                Err(e) => warn!("[BROKER] accept failed on {label} endpoint: {e}"),
            },
            _ = stopped => break,
        }
    }
    debug!("[BROKER] {label} accept loop stopped");
}

async fn hub_loop(hub_rx: Receiver<PeerEvent>, options: MqOptions) {
    let mut core = BrokerCore::new(options.clone());
    let mut peers: HashMap<Bytes, Sender<ConnCmd>> = HashMap::new();
    let hb_interval = options.hb_interval;
    let mut next_tick = Instant::now() + hb_interval;

    loop {
        let now = Instant::now();
        if now >= next_tick {
            let actions = core.tick(now);
            apply_actions(&mut peers, actions);
            next_tick = now + hb_interval;
        }

        let wait = next_tick.saturating_duration_since(now);
        match compio::time::timeout(wait, hub_rx.recv_async()).await {
            Err(_) => continue, // tick due
            Ok(Err(_)) => break,
            Ok(Ok(PeerEvent::Shutdown)) => break,
            Ok(Ok(PeerEvent::Up { id, cmd_tx })) => {
                peers.insert(id, cmd_tx);
            }
            Ok(Ok(PeerEvent::Conn { id, event })) => match event {
                ConnEvent::Message(frames) => {
                    let actions = core.handle_message(&id, frames, Instant::now());
                    apply_actions(&mut peers, actions);
                }
                ConnEvent::Closed => {
                    peers.remove(&id);
                    core.peer_down(&id);
                }
            },
        }
    }

    let goodbye = core.shutdown();
    apply_actions(&mut peers, goodbye);
    for (_, cmd_tx) in peers.drain() {
        let _ = cmd_tx.send(ConnCmd::Close);
    }
    info!("[BROKER] hub stopped");
}

fn apply_actions(peers: &mut HashMap<Bytes, Sender<ConnCmd>>, actions: Vec<BrokerAction>) {
    for action in actions {
        match action {
            BrokerAction::Send { to, frames } => {
                // Unknown destination: the peer is already gone; drop
                // silently, matching the routing policy for stale ids.
                if let Some(cmd_tx) = peers.get(&to) {
                    let _ = cmd_tx.send(ConnCmd::Send(frames));
                }
            }
            BrokerAction::Drop { peer } => {
                if let Some(cmd_tx) = peers.remove(&peer) {
                    let _ = cmd_tx.send(ConnCmd::Close);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn core() -> BrokerCore {
        BrokerCore::new(MqOptions::default())
    }

    fn id(name: &str) -> Bytes {
        Bytes::copy_from_slice(name.as_bytes())
    }

    fn ready(service: &str) -> Vec<Bytes> {
        vec![
            Bytes::from_static(WORKER_PROTOCOL),
            Command::Ready.frame(),
            id(service),
        ]
    }

    fn heartbeat() -> Vec<Bytes> {
        worker_message(Command::Heartbeat)
    }

    fn client_request(service: &str, payload: &[&str]) -> Vec<Bytes> {
        let mut frames = vec![Bytes::from_static(CLIENT_PROTOCOL), id(service)];
        frames.extend(payload.iter().map(|p| id(p)));
        frames
    }

    fn worker_reply(client: &Bytes, payload: &[&str]) -> Vec<Bytes> {
        let mut frames = worker_message(Command::Reply);
        frames.push(client.clone());
        frames.push(Bytes::new());
        frames.extend(payload.iter().map(|p| id(p)));
        frames
    }

    /// Destructure a single Send action.
    fn sent(mut actions: Vec<BrokerAction>) -> (Bytes, Vec<Bytes>) {
        assert_eq!(actions.len(), 1, "expected exactly one action");
        match actions.remove(0) {
            BrokerAction::Send { to, frames } => (to, frames),
            other => panic!("expected Send, got {other:?}"),
        }
    }

    #[test]
    fn request_reaches_the_ready_worker_exactly_once() {
        let mut core = core();
        let now = Instant::now();
        let worker = id("w1");
        let client = id("c1");

        assert!(core.handle_message(&worker, ready("echo"), now).is_empty());

        let (to, frames) = sent(core.handle_message(
            &client,
            client_request("echo", &["ping", "{}"]),
            now,
        ));
        assert_eq!(to, worker);
        assert_eq!(frames[0], WORKER_PROTOCOL);
        assert_eq!(frames[1], Command::Request.frame());
        assert_eq!(frames[2], client);
        assert_eq!(frames[3], Bytes::new());
        assert_eq!(frames[4], id("ping"));

        // The worker is now busy; a second request queues.
        let actions =
            core.handle_message(&client, client_request("echo", &["ping", "{}"]), now);
        assert!(actions.is_empty());
        assert_eq!(core.services[&id("echo")].pending.len(), 1);
    }

    #[test]
    fn fifo_availability_earliest_ready_first() {
        let mut core = core();
        let now = Instant::now();
        let (w1, w2) = (id("w1"), id("w2"));

        core.handle_message(&w1, ready("echo"), now);
        core.handle_message(&w2, ready("echo"), now);

        let (to1, _) =
            sent(core.handle_message(&id("c1"), client_request("echo", &["r1", "{}"]), now));
        let (to2, _) =
            sent(core.handle_message(&id("c2"), client_request("echo", &["r2", "{}"]), now));
        assert_eq!(to1, w1);
        assert_eq!(to2, w2);
    }

    #[test]
    fn reply_routes_to_client_and_worker_takes_oldest_pending() {
        let mut core = core();
        let now = Instant::now();
        let (w1, w2) = (id("w1"), id("w2"));
        let (c1, c2, c3) = (id("c1"), id("c2"), id("c3"));

        core.handle_message(&w1, ready("echo"), now);

        // R1 occupies W1, R2 queues, then W2 arrives and R3 goes straight
        // to it.
        let (to, _) = sent(core.handle_message(&c1, client_request("echo", &["r1", "{}"]), now));
        assert_eq!(to, w1);
        assert!(core
            .handle_message(&c2, client_request("echo", &["r2", "{}"]), now)
            .is_empty());
        core.handle_message(&w2, ready("echo"), now);
        let (to, _) = sent(core.handle_message(&c3, client_request("echo", &["r3", "{}"]), now));
        assert_eq!(to, w2);

        // W1 replies: the reply reaches C1 and W1 is immediately handed R2
        // (the oldest pending), not returned to the pool.
        let actions = core.handle_message(&w1, worker_reply(&c1, &["r1", "{}"]), now);
        assert_eq!(actions.len(), 2);
        match &actions[0] {
            BrokerAction::Send { to, frames } => {
                assert_eq!(*to, c1);
                assert_eq!(frames[0], CLIENT_PROTOCOL);
                assert_eq!(frames[1], id("echo"));
                assert_eq!(frames[2], id("r1"));
            }
            other => panic!("expected Send, got {other:?}"),
        }
        match &actions[1] {
            BrokerAction::Send { to, frames } => {
                assert_eq!(*to, w1);
                assert_eq!(frames[1], Command::Request.frame());
                assert_eq!(frames[2], c2);
                assert_eq!(frames[4], id("r2"));
            }
            other => panic!("expected Send, got {other:?}"),
        }
        assert!(core.services[&id("echo")].pending.is_empty());
    }

    #[test]
    fn unknown_service_requests_are_dropped_silently() {
        let mut core = core();
        let now = Instant::now();
        let actions =
            core.handle_message(&id("c1"), client_request("nope", &["ping", "{}"]), now);
        assert!(actions.is_empty());
        // Not even a queue is created for it.
        assert!(!core.services.contains_key(&id("nope")));
    }

    #[test]
    fn duplicate_ready_does_not_duplicate_the_free_slot() {
        let mut core = core();
        let now = Instant::now();
        let worker = id("w1");

        core.handle_message(&worker, ready("echo"), now);
        core.handle_message(&worker, ready("echo"), now);
        assert_eq!(core.services[&id("echo")].available.len(), 1);

        // First request dispatches, second must queue: no phantom slot.
        let (to, _) =
            sent(core.handle_message(&id("c1"), client_request("echo", &["r1", "{}"]), now));
        assert_eq!(to, worker);
        assert!(core
            .handle_message(&id("c2"), client_request("echo", &["r2", "{}"]), now)
            .is_empty());
    }

    #[test]
    fn silent_worker_is_purged_and_heartbeats_keep_it_alive() {
        let mut core = core();
        let t0 = Instant::now();
        let worker = id("w1");
        let expiry = MqOptions::default().broker_expiry();

        core.handle_message(&worker, ready("echo"), t0);

        // A heartbeat halfway through the window pushes the expiry out.
        core.handle_message(&worker, heartbeat(), t0 + expiry / 2);
        let actions = core.tick(t0 + expiry);
        assert!(actions
            .iter()
            .all(|a| matches!(a, BrokerAction::Send { frames, .. } if frames[1] == Command::Heartbeat.frame())));
        assert!(core.workers.contains_key(&worker));

        // Silence past the refreshed window purges the worker.
        let actions = core.tick(t0 + expiry / 2 + expiry);
        assert!(matches!(&actions[0], BrokerAction::Drop { peer } if *peer == worker));
        assert!(!core.workers.contains_key(&worker));
        assert!(core.services[&id("echo")].available.is_empty());
    }

    #[test]
    fn purged_workers_in_flight_request_is_not_requeued() {
        let mut core = core();
        let t0 = Instant::now();
        let worker = id("w1");
        let expiry = MqOptions::default().broker_expiry();

        core.handle_message(&worker, ready("echo"), t0);
        sent(core.handle_message(&id("c1"), client_request("echo", &["r1", "{}"]), t0));

        core.tick(t0 + expiry);
        // The dispatched request is gone for good: a fresh worker gets
        // nothing until a client asks again.
        assert!(core.handle_message(&id("w2"), ready("echo"), t0 + expiry).is_empty());
        assert!(core.services[&id("echo")].pending.is_empty());
    }

    #[test]
    fn explicit_disconnect_removes_the_worker_before_its_expiry() {
        let mut core = core();
        let now = Instant::now();
        let worker = id("w1");

        core.handle_message(&worker, ready("echo"), now);
        core.handle_message(&worker, worker_message(Command::Disconnect), now);

        // A request arriving right after must queue, not dispatch to the
        // disconnected identity.
        assert!(core
            .handle_message(&id("c1"), client_request("echo", &["r1", "{}"]), now)
            .is_empty());
        assert_eq!(core.services[&id("echo")].pending.len(), 1);
    }

    #[test]
    fn unknown_command_byte_earns_a_disconnect() {
        let mut core = core();
        let now = Instant::now();
        let worker = id("w1");
        core.handle_message(&worker, ready("echo"), now);

        let frames = vec![
            Bytes::from_static(WORKER_PROTOCOL),
            Bytes::from_static(&[0x77]),
        ];
        let actions = core.handle_message(&worker, frames, now);
        assert!(matches!(
            &actions[0],
            BrokerAction::Send { to, frames } if *to == worker && frames[1] == Command::Disconnect.frame()
        ));
        assert!(matches!(&actions[1], BrokerAction::Drop { peer } if *peer == worker));
        assert!(!core.workers.contains_key(&worker));
    }

    #[test]
    fn malformed_messages_are_dropped_without_panic() {
        let mut core = core();
        let now = Instant::now();
        let peer = id("p1");

        assert!(core.handle_message(&peer, vec![], now).is_empty());
        assert!(core
            .handle_message(&peer, vec![id("GARBAGE"), id("x")], now)
            .is_empty());
        // Worker message with a two-byte command frame
        assert!(core
            .handle_message(
                &peer,
                vec![Bytes::from_static(WORKER_PROTOCOL), id("xx")],
                now
            )
            .is_empty());
        // Reply with no envelope delimiter
        core.handle_message(&peer, ready("echo"), now);
        let mut bad_reply = worker_message(Command::Reply);
        bad_reply.push(id("no-delimiter"));
        assert!(core.handle_message(&peer, bad_reply, now).is_empty());
    }

    #[test]
    fn reply_from_unknown_worker_is_dropped() {
        let mut core = core();
        let now = Instant::now();
        let actions = core.handle_message(&id("ghost"), worker_reply(&id("c1"), &["x"]), now);
        assert!(actions.is_empty());
    }

    #[test]
    fn mmi_service_reports_200_and_404() {
        let mut core = core();
        let now = Instant::now();
        core.handle_message(&id("w1"), ready("dbmgr"), now);

        let (to, frames) = sent(core.handle_message(
            &id("c1"),
            vec![
                Bytes::from_static(CLIENT_PROTOCOL),
                id("mmi.service"),
                id("dbmgr"),
            ],
            now,
        ));
        assert_eq!(to, id("c1"));
        assert_eq!(frames, vec![
            Bytes::from_static(CLIENT_PROTOCOL),
            id("mmi.service"),
            id("200"),
        ]);

        let (_, frames) = sent(core.handle_message(
            &id("c1"),
            vec![
                Bytes::from_static(CLIENT_PROTOCOL),
                id("mmi.service"),
                id("absent"),
            ],
            now,
        ));
        assert_eq!(frames[2], id("404"));
    }

    #[test]
    fn mmi_service_404_after_only_worker_purged() {
        let mut core = core();
        let t0 = Instant::now();
        core.handle_message(&id("w1"), ready("dbmgr"), t0);
        core.tick(t0 + MqOptions::default().broker_expiry());

        let (_, frames) = sent(core.handle_message(
            &id("c1"),
            vec![
                Bytes::from_static(CLIENT_PROTOCOL),
                id("mmi.service"),
                id("dbmgr"),
            ],
            t0,
        ));
        assert_eq!(frames[2], id("404"));
    }

    #[test]
    fn mmi_services_lists_one_entry_per_worker() {
        let mut core = core();
        let now = Instant::now();
        core.handle_message(&id("w1"), ready("echo"), now);
        core.handle_message(&id("w2"), ready("echo"), now);

        let (_, frames) = sent(core.handle_message(
            &id("c1"),
            vec![Bytes::from_static(CLIENT_PROTOCOL), id("mmi.services")],
            now,
        ));
        let listing = String::from_utf8(frames[2].to_vec()).unwrap();
        let mut entries: Vec<_> = listing.split(", ").collect();
        entries.sort_unstable();
        // Two workers for the same service: two entries, no deduplication.
        assert_eq!(entries, vec!["echo", "echo"]);
    }

    #[test]
    fn unknown_mmi_names_get_501() {
        let mut core = core();
        let now = Instant::now();
        let (_, frames) = sent(core.handle_message(
            &id("c1"),
            vec![Bytes::from_static(CLIENT_PROTOCOL), id("mmi.uptime")],
            now,
        ));
        assert_eq!(frames[2], id("501"));
    }

    #[test]
    fn mmi_wins_over_a_worker_registered_under_the_prefix() {
        let mut core = core();
        let now = Instant::now();
        core.handle_message(&id("w1"), ready("mmi.uptime"), now);

        let (_, frames) = sent(core.handle_message(
            &id("c1"),
            vec![Bytes::from_static(CLIENT_PROTOCOL), id("mmi.uptime")],
            now,
        ));
        // Introspection dispatch happens before normal routing.
        assert_eq!(frames[2], id("501"));
    }

    #[test]
    fn shutdown_disconnects_workers_and_clears_state() {
        let mut core = core();
        let now = Instant::now();
        core.handle_message(&id("w1"), ready("echo"), now);
        core.handle_message(&id("w2"), ready("dbmgr"), now);

        let actions = core.shutdown();
        assert_eq!(actions.len(), 2);
        assert!(actions.iter().all(|a| matches!(
            a,
            BrokerAction::Send { frames, .. } if frames[1] == Command::Disconnect.frame()
        )));
        assert!(core.workers.is_empty());
        assert!(core.services.is_empty());
    }

    #[test]
    fn tick_heartbeats_every_live_worker() {
        let mut core = core();
        let now = Instant::now();
        core.handle_message(&id("w1"), ready("echo"), now);
        core.handle_message(&id("w2"), ready("dbmgr"), now);

        let actions = core.tick(now + Duration::from_millis(10));
        assert_eq!(actions.len(), 2);
        assert!(actions.iter().all(|a| matches!(
            a,
            BrokerAction::Send { frames, .. } if frames[1] == Command::Heartbeat.frame()
        )));
    }
}
