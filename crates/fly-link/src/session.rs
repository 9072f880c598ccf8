//! UDP session with the flight controller.
//!
//! UDP has no connection, so "connected" means: socket bound, remote resolved,
//! send and receive loops running, keep-alive queued. `disconnect` stops both
//! loops, waits for them, and only then drops the socket.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fly_proto::crtp::{self, NULL_PACKET};
use fly_proto::telemetry::{BatteryInfo, Telemetry};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::events::{ConnectionState, LinkEvents};
use crate::queue::OutboundQueue;
use crate::{LinkConfig, LinkError};

const RECV_BUF: usize = 1024;
const ERROR_BACKOFF: Duration = Duration::from_millis(10);

struct Shared {
    events: LinkEvents,
    queue: OutboundQueue,
    loops: AtomicUsize,
}

struct Running {
    shutdown: watch::Sender<bool>,
    send_task: JoinHandle<()>,
    recv_task: JoinHandle<()>,
    local: SocketAddr,
}

pub struct UdpLink {
    cfg: LinkConfig,
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl UdpLink {
    pub fn new(cfg: LinkConfig) -> Self {
        let shared = Arc::new(Shared {
            events: LinkEvents::new(),
            queue: OutboundQueue::new(cfg.queue_capacity),
            loops: AtomicUsize::new(0),
        });
        Self { cfg, shared, running: Mutex::new(None) }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.cfg
    }

    /// Binds, resolves, starts both loops and queues the keep-alive.
    /// On failure everything is rolled back and the state returns to `Disconnected`.
    pub async fn connect(&self) -> Result<(), LinkError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            warn!("link: already connected");
            return Ok(());
        }

        let ev = &self.shared.events;
        ev.set_state(ConnectionState::Connecting);

        match self.open().await {
            Ok((socket, remote, local)) => {
                let socket = Arc::new(socket);
                let (shutdown, shutdown_rx) = watch::channel(false);

                self.shared.queue.clear();
                let recv_task = tokio::spawn(recv_loop(
                    socket.clone(),
                    LoopGuard::enter(&self.shared),
                    shutdown_rx.clone(),
                    Duration::from_millis(self.cfg.recv_timeout_ms.max(1)),
                ));
                let send_task = tokio::spawn(send_loop(
                    socket,
                    remote,
                    LoopGuard::enter(&self.shared),
                    shutdown_rx,
                ));

                self.shared.queue.push(NULL_PACKET.to_vec());
                *running = Some(Running { shutdown, send_task, recv_task, local });

                let session = ev.new_session();
                ev.set_state(ConnectionState::Connected);
                ev.set_status(format!("connected to {}", self.cfg.remote()));
                info!("link: session {} connected to {} (local {})", session, remote, local);
                Ok(())
            }
            Err(e) => {
                error!("link: connect failed: {}", e);
                ev.set_state(ConnectionState::Disconnected);
                ev.set_status(format!("connect failed: {}", e));
                Err(e)
            }
        }
    }

    async fn open(&self) -> Result<(UdpSocket, SocketAddr, SocketAddr), LinkError> {
        let socket = bind_reuse(self.cfg.local_port)?;
        let local = socket.local_addr()?;
        let remote = resolve(&self.cfg.remote_host, self.cfg.remote_port).await?;
        debug!("link: bound {}, remote {}", local, remote);
        Ok((socket, remote, local))
    }

    /// Stops both loops, releases the socket and drops anything still queued.
    /// Safe to call when already disconnected.
    pub async fn disconnect(&self) {
        let mut running = self.running.lock().await;
        if let Some(r) = running.take() {
            debug!("link: disconnecting (local {})", r.local);
            // flip state first so producers stop enqueueing
            self.shared.events.set_state(ConnectionState::Disconnected);
            r.shutdown.send_replace(true);
            for (name, task) in [("send", r.send_task), ("recv", r.recv_task)] {
                if let Err(e) = task.await {
                    warn!("link: {} loop ended abnormally: {}", name, e);
                }
            }
            info!("link: disconnected");
        }

        self.shared.queue.clear();
        self.shared.events.set_state(ConnectionState::Disconnected);
        self.shared.events.set_status("disconnected");
    }

    /// Queues a datagram. Never touches the network; false when not connected.
    pub fn send(&self, pkt: Vec<u8>) -> bool {
        if !self.state().is_connected() {
            trace!("link: not connected, dropping {} bytes", pkt.len());
            return false;
        }
        self.shared.queue.push(pkt);
        true
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.events.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Id of the latest successful connect; 0 before the first one.
    pub fn session_id(&self) -> u64 {
        *self.shared.events.session.borrow()
    }

    pub fn queued(&self) -> usize {
        self.shared.queue.len()
    }

    /// Number of send/receive loops currently alive (2 while connected).
    pub fn active_loops(&self) -> usize {
        self.shared.loops.load(Ordering::SeqCst)
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|r| r.local)
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.events.state.subscribe()
    }

    pub fn subscribe_sessions(&self) -> watch::Receiver<u64> {
        self.shared.events.session.subscribe()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<String> {
        self.shared.events.status.subscribe()
    }

    pub fn subscribe_battery(&self) -> watch::Receiver<Option<BatteryInfo>> {
        self.shared.events.battery.subscribe()
    }

    pub fn subscribe_console(&self) -> broadcast::Receiver<String> {
        self.shared.events.console.subscribe()
    }

    pub fn console_history(&self) -> Vec<String> {
        self.shared.events.console_log.snapshot()
    }

    pub fn clear_console(&self) {
        self.shared.events.console_log.clear();
    }
}

fn bind_reuse(port: u16) -> Result<UdpSocket, LinkError> {
    let bind_err = |source| LinkError::Bind { port, source };

    let sock = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(bind_err)?;
    sock.set_reuse_address(true).map_err(bind_err)?;
    sock.set_nonblocking(true).map_err(bind_err)?;
    let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
    sock.bind(&addr.into()).map_err(bind_err)?;

    let std_sock: std::net::UdpSocket = sock.into();
    UdpSocket::from_std(std_sock).map_err(bind_err)
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr, LinkError> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|source| LinkError::Resolve { host: host.to_string(), source })?
        .collect();
    // socket is IPv4-only
    addrs
        .into_iter()
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| LinkError::NoAddress(format!("{}:{}", host, port)))
}

/// Counts a loop as alive from spawn until its task ends.
struct LoopGuard(Arc<Shared>);

impl LoopGuard {
    fn enter(shared: &Arc<Shared>) -> Self {
        shared.loops.fetch_add(1, Ordering::SeqCst);
        Self(shared.clone())
    }
}

impl Drop for LoopGuard {
    fn drop(&mut self) {
        self.0.loops.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn send_loop(
    socket: Arc<UdpSocket>,
    remote: SocketAddr,
    guard: LoopGuard,
    mut shutdown: watch::Receiver<bool>,
) {
    let shared = &guard.0;
    debug!("link: send loop started");

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            pkt = shared.queue.pop() => {
                match socket.send_to(&pkt, remote).await {
                    Ok(n) => trace!("tx {} bytes: {}", n, hex::encode(&pkt)),
                    Err(e) => {
                        warn!("link: send error: {}", e);
                        tokio::time::sleep(ERROR_BACKOFF).await;
                    }
                }
            }
        }
    }
    debug!("link: send loop stopped");
}

async fn recv_loop(
    socket: Arc<UdpSocket>,
    guard: LoopGuard,
    mut shutdown: watch::Receiver<bool>,
    timeout: Duration,
) {
    let shared = &guard.0;
    debug!("link: receive loop started");
    let mut buf = vec![0u8; RECV_BUF];

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            res = tokio::time::timeout(timeout, socket.recv_from(&mut buf)) => match res {
                // idle link; poll again
                Err(_) => continue,
                Ok(Ok((n, from))) => {
                    trace!("rx {} bytes from {}: {}", n, from, hex::encode(&buf[..n]));
                    dispatch(shared, &buf[..n]);
                }
                Ok(Err(e)) => {
                    if *shutdown.borrow() {
                        break;
                    }
                    warn!("link: receive error: {}", e);
                    tokio::time::sleep(ERROR_BACKOFF).await;
                }
            }
        }
    }
    debug!("link: receive loop stopped");
}

fn dispatch(shared: &Shared, datagram: &[u8]) {
    let pkt = match crtp::decode(datagram) {
        Ok(pkt) => pkt,
        Err(e) => {
            trace!("link: dropped datagram: {}", e);
            return;
        }
    };

    match Telemetry::classify(&pkt) {
        Telemetry::Battery(info) => {
            debug!("battery: {}% {:.2}V {:?}", info.level_pct, info.voltage_v, info.state);
            shared.events.battery(info);
        }
        Telemetry::Console(line) => {
            debug!("console: {}", line);
            shared.events.console(line);
        }
        Telemetry::Ignored(port) => {
            trace!("link: ignoring port {:?} channel {}", port, pkt.channel);
        }
    }
}
