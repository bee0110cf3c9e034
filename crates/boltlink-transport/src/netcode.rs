//! UDP transport backend built on `renet` and its netcode transport.
//!
//! Each logical channel maps onto two renet channels: one reliable-ordered
//! and one unreliable, so the [`Delivery`] mode picks the lane and the
//! receiving side folds both back into the logical channel index. Renet
//! fragments large messages and retransmits reliable ones; this module only
//! translates between renet's client ids and [`PeerId`] handles and turns
//! renet's state changes into [`TransportEvent`]s.
//!
//! All work happens inside [`Endpoint::poll`] and [`Endpoint::flush`];
//! there are no background threads.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use renet::{
    ChannelConfig, ClientId, ConnectionConfig, RenetClient, RenetServer,
    SendType, ServerEvent,
};
use renet_netcode::{
    ClientAuthentication, NetcodeClientTransport, NetcodeServerTransport,
    ServerAuthentication, ServerConfig,
};

use crate::{
    Backend, Delivery, Endpoint, PeerId, PeerState, TransportError,
    TransportEvent, lan_address,
};

/// Netcode protocol id shared by every boltlink endpoint ("bolt").
pub const PROTOCOL_ID: u64 = 0x626f_6c74;

/// Tunables for the renet backend.
#[derive(Debug, Clone)]
pub struct RenetConfig {
    /// Netcode protocol id. Hosts and clients must agree on it.
    pub protocol_id: u64,
    /// Retransmit interval for reliable messages.
    pub resend_time: Duration,
    /// Memory budget per renet channel. Messages beyond it are refused
    /// instead of queued.
    pub max_channel_memory: usize,
    /// Longest a graceful disconnect waits for queued reliable data to be
    /// acknowledged before giving up and disconnecting anyway.
    pub drain_timeout: Duration,
}

impl Default for RenetConfig {
    fn default() -> Self {
        Self {
            protocol_id: PROTOCOL_ID,
            resend_time: Duration::from_millis(100),
            max_channel_memory: 5 * 1024 * 1024,
            drain_timeout: Duration::from_secs(1),
        }
    }
}

impl RenetConfig {
    fn connection(&self, channels: usize) -> ConnectionConfig {
        let lanes: Vec<ChannelConfig> = (0..channels)
            .flat_map(|channel| {
                [Delivery::Reliable, Delivery::Unreliable].map(|delivery| {
                    ChannelConfig {
                        channel_id: lane(channel as u8, delivery),
                        max_memory_usage_bytes: self.max_channel_memory,
                        send_type: match delivery {
                            Delivery::Reliable => SendType::ReliableOrdered {
                                resend_time: self.resend_time,
                            },
                            Delivery::Unreliable => SendType::Unreliable,
                        },
                    }
                })
            })
            .collect();
        ConnectionConfig {
            server_channels_config: lanes.clone(),
            client_channels_config: lanes,
            ..Default::default()
        }
    }
}

/// Renet channel id for a logical channel and delivery mode.
fn lane(channel: u8, delivery: Delivery) -> u8 {
    channel * 2 + u8::from(delivery == Delivery::Unreliable)
}

/// Logical channel a renet channel id belongs to.
fn logical(lane: u8) -> u8 {
    lane / 2
}

fn since_epoch() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

fn netcode_error(err: impl std::fmt::Display) -> TransportError {
    TransportError::Netcode(err.to_string())
}

/// Creates [`RenetEndpoint`]s.
#[derive(Debug, Clone, Default)]
pub struct RenetBackend {
    config: RenetConfig,
}

impl RenetBackend {
    /// Creates a backend with the given tunables.
    pub fn new(config: RenetConfig) -> Self {
        Self { config }
    }

    fn bind(bind: SocketAddr) -> Result<(UdpSocket, SocketAddr), TransportError> {
        let socket = UdpSocket::bind(bind).map_err(|source| {
            if source.kind() == ErrorKind::AddrInUse {
                TransportError::AddressInUse(bind)
            } else {
                TransportError::Bind { addr: bind, source }
            }
        })?;
        let local = socket.local_addr()?;
        Ok((socket, local))
    }
}

/// Addresses a client may have typed to reach a server bound at `local`.
/// Netcode refuses connect tokens that name none of them.
fn public_addresses(local: SocketAddr) -> Vec<SocketAddr> {
    if !local.ip().is_unspecified() {
        return vec![local];
    }
    let mut addrs = vec![SocketAddr::from((Ipv4Addr::LOCALHOST, local.port()))];
    let lan = SocketAddr::new(lan_address(), local.port());
    if !addrs.contains(&lan) {
        addrs.push(lan);
    }
    addrs
}

impl Backend for RenetBackend {
    type Endpoint = RenetEndpoint;

    fn create_server(
        &self,
        bind: SocketAddr,
        max_peers: usize,
        channels: usize,
    ) -> Result<RenetEndpoint, TransportError> {
        let (socket, local) = Self::bind(bind)?;
        let channels = channels.clamp(1, usize::from(u8::MAX / 2));
        let server = RenetServer::new(self.config.connection(channels));
        let transport = NetcodeServerTransport::new(
            ServerConfig {
                current_time: since_epoch(),
                max_clients: max_peers,
                protocol_id: self.config.protocol_id,
                public_addresses: public_addresses(local),
                authentication: ServerAuthentication::Unsecure,
            },
            socket,
        )?;
        tracing::info!(%local, max_peers, "renet server bound");

        Ok(RenetEndpoint::new(
            local,
            self.config.clone(),
            channels,
            Side::Server(Box::new(ServerSide {
                server,
                transport,
                peers: BTreeMap::new(),
                by_client: HashMap::new(),
            })),
        ))
    }

    fn create_client(
        &self,
        channels: usize,
    ) -> Result<RenetEndpoint, TransportError> {
        let (socket, local) =
            Self::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))?;
        let channels = channels.clamp(1, usize::from(u8::MAX / 2));
        tracing::debug!(%local, "renet client bound");
        Ok(RenetEndpoint::new(
            local,
            self.config.clone(),
            channels,
            Side::Idle(Some(socket)),
        ))
    }
}

struct Link {
    client_id: ClientId,
    state: PeerState,
    draining_since: Option<Instant>,
}

struct ServerSide {
    server: RenetServer,
    transport: NetcodeServerTransport,
    peers: BTreeMap<PeerId, Link>,
    by_client: HashMap<ClientId, PeerId>,
}

struct ClientSide {
    client: RenetClient,
    transport: NetcodeClientTransport,
    peer: PeerId,
    state: PeerState,
    draining_since: Option<Instant>,
}

enum Side {
    /// A client endpoint that has not connected yet.
    Idle(Option<UdpSocket>),
    Client(Box<ClientSide>),
    Server(Box<ServerSide>),
}

/// A renet server or client behind the [`Endpoint`] interface.
pub struct RenetEndpoint {
    local: SocketAddr,
    config: RenetConfig,
    channels: usize,
    side: Side,
    events: VecDeque<TransportEvent>,
    next_peer: u64,
    last_update: Instant,
}

impl RenetEndpoint {
    fn new(local: SocketAddr, config: RenetConfig, channels: usize, side: Side) -> Self {
        Self {
            local,
            config,
            channels,
            side,
            events: VecDeque::new(),
            next_peer: 0,
            last_update: Instant::now(),
        }
    }

    fn mint(&mut self) -> PeerId {
        self.next_peer += 1;
        PeerId::new(self.next_peer)
    }

    fn check_channel(&self, channel: u8) -> Result<(), TransportError> {
        if usize::from(channel) >= self.channels {
            return Err(TransportError::ChannelOutOfRange {
                channel,
                channels: self.channels,
            });
        }
        Ok(())
    }

    /// Advances renet by the time since the last call, collects events and
    /// messages, retires drained peers, and sends whatever is queued.
    fn service(&mut self) {
        let now = Instant::now();
        let dt = now - self.last_update;
        self.last_update = now;
        let lanes: Vec<u8> = (0..self.channels as u8 * 2).collect();
        let drain_timeout = self.config.drain_timeout;
        let max_memory = self.config.max_channel_memory;

        match &mut self.side {
            Side::Idle(_) => {}
            Side::Server(side) => {
                let side = &mut **side;
                side.server.update(dt);
                if let Err(err) = side.transport.update(dt, &mut side.server) {
                    tracing::warn!(%err, "netcode server update failed");
                }
                while let Some(event) = side.server.get_event() {
                    match event {
                        ServerEvent::ClientConnected { client_id } => {
                            self.next_peer += 1;
                            let peer = PeerId::new(self.next_peer);
                            side.peers.insert(
                                peer,
                                Link {
                                    client_id,
                                    state: PeerState::Connected,
                                    draining_since: None,
                                },
                            );
                            side.by_client.insert(client_id, peer);
                            tracing::debug!(%peer, "renet client connected");
                            self.events.push_back(TransportEvent::Connect { peer });
                        }
                        ServerEvent::ClientDisconnected { client_id, reason } => {
                            // Peers dropped through disconnect_now are already
                            // forgotten and stay silent.
                            if let Some(peer) = side.by_client.remove(&client_id) {
                                side.peers.remove(&peer);
                                tracing::debug!(%peer, ?reason, "renet client disconnected");
                                self.events
                                    .push_back(TransportEvent::Disconnect { peer });
                            }
                        }
                    }
                }
                for (&peer, link) in &side.peers {
                    for &id in &lanes {
                        while let Some(data) =
                            side.server.receive_message(link.client_id, id)
                        {
                            self.events.push_back(TransportEvent::Receive {
                                peer,
                                channel: logical(id),
                                data: data.to_vec(),
                            });
                        }
                    }
                }
                for link in side.peers.values_mut() {
                    let Some(since) = link.draining_since else { continue };
                    let drained = lanes.iter().step_by(2).all(|&id| {
                        side.server.channel_available_memory(link.client_id, id)
                            >= max_memory
                    });
                    if drained || since.elapsed() >= drain_timeout {
                        side.server.disconnect(link.client_id);
                        link.draining_since = None;
                    }
                }
                side.transport.send_packets(&mut side.server);
            }
            Side::Client(side) if side.state == PeerState::Disconnected => {}
            Side::Client(side) => {
                let side = &mut **side;
                side.client.update(dt);
                if let Err(err) = side.transport.update(dt, &mut side.client) {
                    tracing::debug!(%err, "netcode client update failed");
                }
                let peer = side.peer;
                if side.state == PeerState::Connecting && side.client.is_connected() {
                    side.state = PeerState::Connected;
                    tracing::debug!(%peer, "connected to renet server");
                    self.events.push_back(TransportEvent::Connect { peer });
                }
                if matches!(side.state, PeerState::Connected | PeerState::Disconnecting) {
                    for &id in &lanes {
                        while let Some(data) = side.client.receive_message(id) {
                            self.events.push_back(TransportEvent::Receive {
                                peer,
                                channel: logical(id),
                                data: data.to_vec(),
                            });
                        }
                    }
                }
                if let Some(since) = side.draining_since {
                    let drained = lanes
                        .iter()
                        .step_by(2)
                        .all(|&id| side.client.channel_available_memory(id) >= max_memory);
                    if drained || since.elapsed() >= drain_timeout {
                        side.transport.disconnect();
                        side.client.disconnect();
                        side.draining_since = None;
                    }
                }
                if side.state != PeerState::Disconnected && side.client.is_disconnected() {
                    side.state = PeerState::Disconnected;
                    tracing::debug!(%peer, "renet connection closed");
                    self.events.push_back(TransportEvent::Disconnect { peer });
                } else if side.state != PeerState::Disconnected {
                    if let Err(err) = side.transport.send_packets(&mut side.client) {
                        tracing::trace!(%err, "netcode client send failed");
                    }
                }
            }
        }
    }
}

impl Endpoint for RenetEndpoint {
    fn connect(
        &mut self,
        remote: SocketAddr,
        channels: usize,
    ) -> Result<PeerId, TransportError> {
        let socket = match &mut self.side {
            Side::Idle(socket) => socket.take(),
            Side::Client(_) => return Err(TransportError::CapacityReached(1)),
            Side::Server(_) => None,
        };
        let Some(socket) = socket else {
            return Err(TransportError::CapacityReached(0));
        };
        self.channels = channels.clamp(1, usize::from(u8::MAX / 2));

        let client = RenetClient::new(self.config.connection(self.channels));
        let authentication = ClientAuthentication::Unsecure {
            protocol_id: self.config.protocol_id,
            client_id: rand::random::<u64>(),
            server_addr: remote,
            user_data: None,
        };
        let transport = NetcodeClientTransport::new(since_epoch(), authentication, socket)
            .map_err(netcode_error)?;

        let peer = self.mint();
        tracing::debug!(%peer, %remote, "renet client connecting");
        self.side = Side::Client(Box::new(ClientSide {
            client,
            transport,
            peer,
            state: PeerState::Connecting,
            draining_since: None,
        }));
        self.last_update = Instant::now();
        Ok(peer)
    }

    fn poll(&mut self) -> Option<TransportEvent> {
        if self.events.is_empty() {
            self.service();
        }
        self.events.pop_front()
    }

    fn send(
        &mut self,
        peer: PeerId,
        channel: u8,
        data: &[u8],
        delivery: Delivery,
    ) -> Result<(), TransportError> {
        self.check_channel(channel)?;
        let id = lane(channel, delivery);
        match &mut self.side {
            Side::Server(side) => {
                let link = side.peers.get(&peer).ok_or(TransportError::UnknownPeer(peer))?;
                if link.state != PeerState::Connected {
                    return Err(TransportError::PeerNotConnected(peer));
                }
                if !side.server.can_send_message(link.client_id, id, data.len()) {
                    return Err(TransportError::ChannelFull { peer, channel });
                }
                side.server.send_message(link.client_id, id, data.to_vec());
            }
            Side::Client(side) if side.peer == peer => {
                if side.state != PeerState::Connected {
                    return Err(TransportError::PeerNotConnected(peer));
                }
                if !side.client.can_send_message(id, data.len()) {
                    return Err(TransportError::ChannelFull { peer, channel });
                }
                side.client.send_message(id, data.to_vec());
            }
            Side::Client(_) | Side::Idle(_) => {
                return Err(TransportError::UnknownPeer(peer));
            }
        }
        Ok(())
    }

    fn disconnect_now(&mut self, peer: PeerId) {
        match &mut self.side {
            Side::Server(side) => {
                if let Some(link) = side.peers.remove(&peer) {
                    side.by_client.remove(&link.client_id);
                    side.server.disconnect(link.client_id);
                    tracing::debug!(%peer, "renet client dropped");
                }
            }
            Side::Client(side) if side.peer == peer => {
                if side.state != PeerState::Disconnected {
                    side.transport.disconnect();
                    side.client.disconnect();
                    side.state = PeerState::Disconnected;
                    side.draining_since = None;
                }
            }
            Side::Client(_) | Side::Idle(_) => {}
        }
        self.events.retain(|event| event.peer() != peer);
    }

    fn disconnect_later(&mut self, peer: PeerId) {
        let now = Instant::now();
        match &mut self.side {
            Side::Server(side) => {
                if let Some(link) = side.peers.get_mut(&peer) {
                    if link.state == PeerState::Connected {
                        link.state = PeerState::Disconnecting;
                        link.draining_since = Some(now);
                    }
                }
            }
            Side::Client(side) if side.peer == peer => {
                if matches!(side.state, PeerState::Connecting | PeerState::Connected) {
                    side.state = PeerState::Disconnecting;
                    side.draining_since = Some(now);
                }
            }
            Side::Client(_) | Side::Idle(_) => {}
        }
    }

    fn peer_state(&self, peer: PeerId) -> PeerState {
        match &self.side {
            Side::Server(side) => side
                .peers
                .get(&peer)
                .map_or(PeerState::Disconnected, |link| link.state),
            Side::Client(side) if side.peer == peer => side.state,
            Side::Client(_) | Side::Idle(_) => PeerState::Disconnected,
        }
    }

    fn flush(&mut self) {
        match &mut self.side {
            Side::Server(side) => {
                side.server.update(Duration::ZERO);
                if let Err(err) = side.transport.update(Duration::ZERO, &mut side.server) {
                    tracing::debug!(%err, "netcode server update failed during flush");
                }
                side.transport.send_packets(&mut side.server);
            }
            Side::Client(side) if side.state != PeerState::Disconnected => {
                if let Err(err) = side.transport.send_packets(&mut side.client) {
                    tracing::trace!(%err, "netcode client send failed during flush");
                }
            }
            Side::Client(_) | Side::Idle(_) => {}
        }
    }

    fn local_addr(&self) -> SocketAddr {
        self.local
    }
}

impl Drop for RenetEndpoint {
    fn drop(&mut self) {
        match &mut self.side {
            Side::Server(side) => side.transport.disconnect_all(&mut side.server),
            Side::Client(side) if side.state != PeerState::Disconnected => {
                side.transport.disconnect();
            }
            Side::Client(_) | Side::Idle(_) => {}
        }
    }
}

impl std::fmt::Debug for RenetEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let side = match &self.side {
            Side::Idle(_) => "idle",
            Side::Client(_) => "client",
            Side::Server(_) => "server",
        };
        f.debug_struct("RenetEndpoint")
            .field("local", &self.local)
            .field("side", &side)
            .field("channels", &self.channels)
            .finish()
    }
}
