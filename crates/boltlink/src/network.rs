//! The [`Network`] context: transport adapter plus messaging API.
//!
//! One `Network` value owns everything about a process's session: the
//! transport endpoint, the codec, and the [`SessionState`]. Each
//! simulation tick calls [`update`](Network::update) once, drains
//! [`messages`](Network::messages) once, then sends whatever it wants.
//!
//! ```text
//!   tick ──→ update() ──→ poll transport ──→ decode ──→ SessionState
//!        ──→ messages() ──→ Vec<NetEvent> to the application
//!        ──→ send()/send_to()/relay() ──→ encode ──→ transport
//! ```
//!
//! Every method takes `&mut self` and never blocks, so there is no locking:
//! the caller's tick loop is the only thread that ever touches it.

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use boltlink_protocol::{Codec, Control, Message, PlayerId, ProtocolError, Snapshot, TextCodec};
use boltlink_session::{NetEvent, Role, SessionError, SessionState};
use boltlink_transport::{Backend, Delivery, Endpoint, PeerId, PeerState, TransportEvent};

use crate::{NetConfig, NetError};

/// A host or client session over transport backend `B`, speaking codec `C`.
///
/// ## Example
///
/// ```rust
/// use std::time::Duration;
/// use boltlink::prelude::*;
///
/// let lan = MemoryNetwork::new();
/// let mut host = Network::new(lan.clone(), NetConfig::with_port(5100));
/// let mut client = Network::new(lan, NetConfig::with_port(5100));
///
/// host.start_host().unwrap();
/// client.start_client("127.0.0.1").unwrap();
///
/// for _ in 0..3 {
///     host.update(Duration::ZERO);
///     client.update(Duration::ZERO);
/// }
///
/// assert_eq!(host.connected_count(), 2);
/// assert_eq!(client.local_player_id(), PlayerId(2));
/// ```
pub struct Network<B: Backend, C: Codec = TextCodec> {
    backend: B,
    codec: C,
    config: NetConfig,
    endpoint: Option<B::Endpoint>,
    session: SessionState,
}

impl<B: Backend> Network<B> {
    /// Creates an idle network using the text wire format.
    pub fn new(backend: B, config: NetConfig) -> Self {
        Self::with_codec(backend, config, TextCodec)
    }
}

impl<B: Backend, C: Codec> Network<B, C> {
    /// Creates an idle network with a custom codec. Every peer in the
    /// session must use the same one.
    pub fn with_codec(backend: B, config: NetConfig, codec: C) -> Self {
        Self {
            backend,
            codec,
            config: config.validated(),
            endpoint: None,
            session: SessionState::new(),
        }
    }

    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Starts hosting on the configured port as player 1.
    ///
    /// Any running session is stopped first.
    ///
    /// # Errors
    /// [`NetError::HostSetup`] if the endpoint cannot be created (e.g. the
    /// port is already bound). The network is then left stopped, so the
    /// caller may retry or join someone else's session instead.
    pub fn start_host(&mut self) -> Result<(), NetError> {
        self.stop();

        let port = self.config.port;
        let endpoint = self
            .backend
            .create_server(self.config.bind_addr(), self.config.max_peers, self.config.channels)
            .map_err(|source| NetError::HostSetup { port, source })?;

        self.endpoint = Some(endpoint);
        self.session.begin_host();
        tracing::info!(port, max_peers = self.config.max_peers, "hosting");
        Ok(())
    }

    /// Starts connecting to the host at `address` (an IP or host name, no
    /// port) on the configured port.
    ///
    /// Returns as soon as the connect is under way. Whether it worked shows
    /// up later as [`NetEvent::Connected`] followed by
    /// [`NetEvent::IdAssigned`], or as [`NetEvent::Disconnected`].
    ///
    /// # Errors
    /// - [`NetError::InvalidAddress`] if `address` does not resolve
    /// - [`NetError::ClientSetup`] if the endpoint cannot be created
    pub fn start_client(&mut self, address: &str) -> Result<(), NetError> {
        self.stop();

        let remote = resolve(address, self.config.port)?;
        let mut endpoint = self
            .backend
            .create_client(self.config.channels)
            .map_err(|source| NetError::ClientSetup { source })?;
        let server_peer = endpoint
            .connect(remote, self.config.channels)
            .map_err(|source| NetError::ClientSetup { source })?;

        self.endpoint = Some(endpoint);
        self.session.begin_client(server_peer);
        tracing::info!(%remote, "joining");
        Ok(())
    }

    /// Drops every connection at once and forgets the session.
    ///
    /// Safe to call at any time; does nothing when not started.
    pub fn stop(&mut self) {
        let Some(mut endpoint) = self.endpoint.take() else {
            return;
        };

        match self.session.role() {
            Role::Host => {
                for (_, peer) in self.session.registry.iter() {
                    endpoint.disconnect_now(peer);
                }
            }
            Role::Client => {
                if let Some(peer) = self.session.server_peer {
                    endpoint.disconnect_now(peer);
                }
            }
            Role::None => {}
        }
        endpoint.flush();
        drop(endpoint);

        let role = self.session.role();
        self.session.reset();
        tracing::info!(%role, "network stopped");
    }

    // -----------------------------------------------------------------------
    // Per-tick processing
    // -----------------------------------------------------------------------

    /// Handles everything the transport has received since the last call.
    ///
    /// Never blocks. `_dt` is accepted so callers can pass their tick delta
    /// uniformly; the transport keeps its own clock.
    pub fn update(&mut self, _dt: Duration) {
        let Self {
            endpoint,
            session,
            codec,
            config,
            ..
        } = self;
        let Some(endpoint) = endpoint.as_mut() else {
            return;
        };

        while let Some(event) = endpoint.poll() {
            match event {
                TransportEvent::Connect { peer } => match session.role() {
                    Role::Host => admit(endpoint, session, codec, config.channel, peer),
                    Role::Client => session.on_connected(peer),
                    Role::None => {}
                },
                TransportEvent::Receive { peer, data, .. } => match codec.decode(&data) {
                    Ok(message) => session.on_message(peer, message),
                    Err(e) => {
                        tracing::debug!(%peer, len = data.len(), error = %e, "dropping undecodable packet");
                    }
                },
                TransportEvent::Disconnect { peer } => session.on_disconnect(peer),
            }
        }
    }

    /// Takes every event queued since the last call.
    pub fn messages(&mut self) -> Vec<NetEvent> {
        self.session.events.drain()
    }

    // -----------------------------------------------------------------------
    // Messaging
    // -----------------------------------------------------------------------

    /// Host: sends to every client. Client: sends to the host.
    ///
    /// Sending with nobody to send to is not an error.
    ///
    /// # Errors
    /// [`ProtocolError`] only if the message cannot be encoded.
    pub fn send(&mut self, message: &Message, reliable: bool) -> Result<(), ProtocolError> {
        let bytes = self.codec.encode(message)?;
        let targets: Vec<PeerId> = match self.session.role() {
            Role::Host => self.session.registry.iter().map(|(_, peer)| peer).collect(),
            Role::Client => self.session.server_peer.into_iter().collect(),
            Role::None => Vec::new(),
        };
        self.transmit_all(&targets, &bytes, reliable);
        Ok(())
    }

    /// Host only: sends to one client. Does nothing if that player is not
    /// connected or this process is not hosting.
    ///
    /// # Errors
    /// [`ProtocolError`] only if the message cannot be encoded.
    pub fn send_to(
        &mut self,
        player_id: PlayerId,
        message: &Message,
        reliable: bool,
    ) -> Result<(), ProtocolError> {
        let bytes = self.codec.encode(message)?;
        if self.session.role() != Role::Host {
            return Ok(());
        }
        if let Some(peer) = self.session.registry.peer_of(player_id) {
            self.transmit_all(&[peer], &bytes, reliable);
        }
        Ok(())
    }

    /// Host only: forwards a client's message to every other client.
    ///
    /// # Errors
    /// [`ProtocolError`] only if the message cannot be encoded.
    pub fn relay(
        &mut self,
        from: PlayerId,
        message: &Message,
        reliable: bool,
    ) -> Result<(), ProtocolError> {
        let bytes = self.codec.encode(message)?;
        if self.session.role() != Role::Host {
            return Ok(());
        }
        let targets: Vec<PeerId> = self
            .session
            .registry
            .iter()
            .filter(|&(id, _)| id != from)
            .map(|(_, peer)| peer)
            .collect();
        self.transmit_all(&targets, &bytes, reliable);
        Ok(())
    }

    /// Host only: broadcasts `snapshot` as a message of type `kind`.
    ///
    /// # Errors
    /// [`ProtocolError`] only if the snapshot's fields cannot be encoded.
    pub fn broadcast_snapshot<S: Snapshot>(
        &mut self,
        kind: &str,
        snapshot: &S,
        reliable: bool,
    ) -> Result<(), ProtocolError> {
        if self.session.role() != Role::Host {
            return Ok(());
        }
        self.send(&snapshot.to_message(kind), reliable)
    }

    fn transmit_all(&mut self, targets: &[PeerId], bytes: &[u8], reliable: bool) {
        let Some(endpoint) = self.endpoint.as_mut() else {
            return;
        };
        let delivery = Delivery::from_reliable(reliable);
        for &peer in targets {
            transmit(endpoint, peer, self.config.channel, bytes, delivery);
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn role(&self) -> Role {
        self.session.role()
    }

    pub fn local_player_id(&self) -> PlayerId {
        self.session.local_player_id()
    }

    /// Host: true while hosting. Client: true only while the transport
    /// reports the host connection as up.
    pub fn is_connected(&self) -> bool {
        match (self.session.role(), self.endpoint.as_ref()) {
            (Role::Host, Some(_)) => true,
            (Role::Client, Some(endpoint)) => self
                .session
                .server_peer
                .is_some_and(|peer| endpoint.peer_state(peer) == PeerState::Connected),
            _ => false,
        }
    }

    /// Host: players in the session including the host. Otherwise 0.
    pub fn connected_count(&self) -> usize {
        self.session.connected_count()
    }

    /// Where the endpoint is bound, while started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.endpoint.as_ref().map(|endpoint| endpoint.local_addr())
    }
}

impl<B: Backend, C: Codec> Drop for Network<B, C> {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Host side of a new connection: slot it and tell it its id, or tell it
/// the session is full and let it go once that message is out.
fn admit<E: Endpoint, C: Codec>(
    endpoint: &mut E,
    session: &mut SessionState,
    codec: &C,
    channel: u8,
    peer: PeerId,
) {
    match session.admit(peer) {
        Ok(id) => send_control(endpoint, codec, channel, peer, Control::AssignId { id }),
        Err(SessionError::SessionFull) => {
            send_control(endpoint, codec, channel, peer, Control::ServerFull);
            endpoint.disconnect_later(peer);
        }
        Err(SessionError::AlreadyRegistered(_)) => {
            tracing::debug!(%peer, "duplicate connect ignored");
        }
    }
}

fn send_control<E: Endpoint, C: Codec>(
    endpoint: &mut E,
    codec: &C,
    channel: u8,
    peer: PeerId,
    control: Control,
) {
    match codec.encode(&control.to_message()) {
        Ok(bytes) => transmit(endpoint, peer, channel, &bytes, Delivery::Reliable),
        Err(e) => tracing::warn!(%peer, error = %e, "control message not encodable"),
    }
}

fn transmit<E: Endpoint>(
    endpoint: &mut E,
    peer: PeerId,
    channel: u8,
    bytes: &[u8],
    delivery: Delivery,
) {
    match endpoint.send(peer, channel, bytes, delivery) {
        Ok(()) => tracing::trace!(%peer, len = bytes.len(), ?delivery, "sent"),
        Err(e) => tracing::warn!(%peer, error = %e, "send failed, skipping peer"),
    }
}

fn resolve(address: &str, port: u16) -> Result<SocketAddr, NetError> {
    let invalid = || NetError::InvalidAddress { address: address.to_owned() };
    if address.trim().is_empty() {
        return Err(invalid());
    }
    let mut addrs = (address, port).to_socket_addrs().map_err(|_| invalid())?;
    addrs.next().ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use boltlink_transport::MemoryNetwork;

    use super::*;

    fn network(lan: &MemoryNetwork, port: u16) -> Network<MemoryNetwork> {
        Network::new(lan.clone(), NetConfig::with_port(port))
    }

    #[test]
    fn test_new_network_is_idle() {
        let net = network(&MemoryNetwork::new(), 5000);
        assert_eq!(net.role(), Role::None);
        assert!(!net.is_connected());
        assert_eq!(net.connected_count(), 0);
        assert_eq!(net.local_addr(), None);
    }

    #[test]
    fn test_start_host_sets_role_and_identity() {
        let mut net = network(&MemoryNetwork::new(), 5001);

        net.start_host().unwrap();

        assert_eq!(net.role(), Role::Host);
        assert_eq!(net.local_player_id(), PlayerId::HOST);
        assert!(net.is_connected());
        assert_eq!(net.connected_count(), 1);
    }

    #[test]
    fn test_start_host_on_taken_port_leaves_network_stopped() {
        let lan = MemoryNetwork::new();
        let mut first = network(&lan, 5002);
        first.start_host().unwrap();
        let mut second = network(&lan, 5002);

        let result = second.start_host();

        assert!(matches!(result, Err(NetError::HostSetup { port: 5002, .. })));
        assert_eq!(second.role(), Role::None);
        assert!(!second.is_connected());
    }

    #[test]
    fn test_start_client_with_unresolvable_address_returns_invalid_address() {
        let mut net = network(&MemoryNetwork::new(), 5003);

        let result = net.start_client("  ");

        assert!(matches!(result, Err(NetError::InvalidAddress { .. })));
        assert_eq!(net.role(), Role::None);
    }

    #[test]
    fn test_start_client_is_not_connected_until_update() {
        let lan = MemoryNetwork::new();
        let mut host = network(&lan, 5004);
        host.start_host().unwrap();
        let mut client = network(&lan, 5004);

        client.start_client("127.0.0.1").unwrap();

        assert_eq!(client.role(), Role::Client);
        assert!(!client.is_connected());
        assert_eq!(client.connected_count(), 0);
    }

    #[test]
    fn test_stop_twice_is_noop() {
        let mut net = network(&MemoryNetwork::new(), 5005);
        net.start_host().unwrap();

        net.stop();
        net.stop();

        assert_eq!(net.role(), Role::None);
        assert_eq!(net.local_addr(), None);
    }

    #[test]
    fn test_drop_releases_port() {
        let lan = MemoryNetwork::new();
        {
            let mut net = network(&lan, 5006);
            net.start_host().unwrap();
        }
        let mut again = network(&lan, 5006);
        assert!(again.start_host().is_ok());
    }

    #[test]
    fn test_send_invalid_message_returns_error_even_when_idle() {
        let mut net = network(&MemoryNetwork::new(), 5007);

        let result = net.send(&Message::new("a|b"), true);

        assert!(matches!(result, Err(ProtocolError::InvalidMessage(_))));
    }

    #[test]
    fn test_send_to_when_not_host_is_noop() {
        let mut net = network(&MemoryNetwork::new(), 5008);
        assert!(net.send_to(PlayerId(2), &Message::new("x"), true).is_ok());
        assert!(net.relay(PlayerId(2), &Message::new("x"), true).is_ok());
    }

    #[test]
    fn test_update_without_endpoint_is_noop() {
        let mut net = network(&MemoryNetwork::new(), 5009);
        net.update(Duration::from_millis(33));
        assert!(net.messages().is_empty());
    }
}
