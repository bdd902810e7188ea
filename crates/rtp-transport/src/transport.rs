//! Single UDP socket, demultiplexed by source endpoint.
//!
//! One socket, a spawned receive loop, per-peer state behind a lock-free
//! map. The socket is shared across an unbounded set of PBX endpoints
//! rather than a single negotiated pair, so silence past the inactivity
//! window is turned into an explicit lifecycle event instead of just
//! dropping packets.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bridge_types::Endpoint;
use dashmap::DashMap;
use rand::Rng;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::rtp::{wrap, RtpHeader};

const MAX_DATAGRAM: usize = 2048;
pub const DEFAULT_INACTIVITY: Duration = Duration::from_secs(3);
const SWEEP_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub enum TransportEvent {
    ClientAppeared(Endpoint),
    Audio(Endpoint, Vec<u8>),
    ClientGone(Endpoint),
}

struct PeerState {
    last_seen: Instant,
    send_seq: u16,
    send_timestamp: u32,
    ssrc: u32,
}

impl PeerState {
    fn fresh() -> Self {
        Self {
            last_seen: Instant::now(),
            send_seq: 0,
            send_timestamp: 0,
            ssrc: rand::thread_rng().gen(),
        }
    }
}

/// Owns the UDP socket and the endpoint → peer-state map. Cloning is cheap;
/// all clones share the same socket and map.
#[derive(Clone)]
pub struct RtpTransport {
    socket: Arc<UdpSocket>,
    peers: Arc<DashMap<Endpoint, PeerState>>,
    inactivity: Duration,
    cancel: CancellationToken,
    events: mpsc::Sender<TransportEvent>,
}

impl RtpTransport {
    /// Bind the UDP socket and start the receive + inactivity-sweep tasks.
    /// Returns the transport handle and the event stream consumers observe.
    pub async fn bind(
        addr: SocketAddr,
        inactivity: Duration,
    ) -> std::io::Result<(Self, mpsc::Receiver<TransportEvent>)> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        let (tx, rx) = mpsc::channel(1024);
        let transport = Self {
            socket,
            peers: Arc::new(DashMap::new()),
            inactivity,
            cancel: CancellationToken::new(),
            events: tx.clone(),
        };

        transport.clone().spawn_recv_loop(tx.clone());
        transport.clone().spawn_sweep_loop(tx);

        Ok((transport, rx))
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Whether `endpoint` still has peer state tracked (test/diagnostic
    /// use: confirms a rejected or torn-down call was actually released
    /// instead of lingering until the inactivity sweep).
    pub fn is_tracked(&self, endpoint: Endpoint) -> bool {
        self.peers.contains_key(&endpoint)
    }

    /// Wrap `payload` in an RTP header with this endpoint's monotonically
    /// increasing sequence/timestamp and transmit it.
    pub async fn send(&self, endpoint: Endpoint, payload: &[u8]) -> std::io::Result<()> {
        let datagram = {
            let mut peer = self.peers.entry(endpoint).or_insert_with(PeerState::fresh);
            let header_seq = peer.send_seq;
            let header_ts = peer.send_timestamp;
            let ssrc = peer.ssrc;
            peer.send_seq = peer.send_seq.wrapping_add(1);
            peer.send_timestamp = peer.send_timestamp.wrapping_add(payload.len() as u32);
            wrap(payload, header_seq, header_ts, ssrc)
        };
        self.socket.send_to(&datagram, endpoint.addr()).await?;
        Ok(())
    }

    /// Explicitly evict an endpoint, emitting `client-gone` immediately
    /// rather than waiting for the inactivity sweep.
    pub fn release(&self, endpoint: Endpoint) {
        if self.peers.remove(&endpoint).is_some() {
            let _ = self.events.try_send(TransportEvent::ClientGone(endpoint));
        }
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn spawn_recv_loop(self, events: mpsc::Sender<TransportEvent>) {
        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            loop {
                let (n, from) = tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    result = self.socket.recv_from(&mut buf) => match result {
                        Ok(pair) => pair,
                        Err(err) => {
                            tracing::error!(error = %err, "rtp socket recv failed, transport is dead");
                            std::process::exit(1);
                        }
                    },
                };

                if n < crate::rtp::HEADER_LEN {
                    continue;
                }
                let Some((_header, payload)) = RtpHeader::parse(&buf[..n]) else {
                    continue;
                };
                if payload.is_empty() {
                    continue;
                }

                let endpoint = Endpoint::from(from);
                let is_new = !self.peers.contains_key(&endpoint);
                self.peers
                    .entry(endpoint)
                    .and_modify(|p| p.last_seen = Instant::now())
                    .or_insert_with(PeerState::fresh);

                if is_new {
                    let _ = events.send(TransportEvent::ClientAppeared(endpoint)).await;
                }
                let _ = events
                    .send(TransportEvent::Audio(endpoint, payload.to_vec()))
                    .await;
            }
        });
    }

    fn spawn_sweep_loop(self, events: mpsc::Sender<TransportEvent>) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let now = Instant::now();
                let stale: Vec<Endpoint> = self
                    .peers
                    .iter()
                    .filter(|entry| now.duration_since(entry.last_seen) >= self.inactivity)
                    .map(|entry| *entry.key())
                    .collect();

                for endpoint in stale {
                    self.peers.remove(&endpoint);
                    let _ = events.send(TransportEvent::ClientGone(endpoint)).await;
                }
            }
        });
    }
}
