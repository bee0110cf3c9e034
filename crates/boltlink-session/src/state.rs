//! Per-session state and the rules for reacting to transport events.
//!
//! Nothing here touches the network. [`SessionState`] decides what a
//! connect, disconnect, or message means for membership and which events
//! the application should see; the caller does the sending.

use std::fmt;

use boltlink_protocol::{Control, Message, PlayerId};
use boltlink_transport::PeerId;

use crate::{EventQueue, NetEvent, PeerRegistry, SessionError};

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Which side of the session this process is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    /// Not hosting or joining.
    #[default]
    None,
    /// Owns the session, assigns ids, relays between clients.
    Host,
    /// Connected (or connecting) to a host.
    Client,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Host => "host",
            Self::Client => "client",
        })
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Everything one process knows about its session.
///
/// ```text
///            begin_host()              reset()
///   None ───────────────────→ Host ──────────────→ None
///     │      begin_client()            reset()
///     └─────────────────────→ Client ────────────→ None
/// ```
#[derive(Debug, Default)]
pub struct SessionState {
    role: Role,
    local_id: PlayerId,
    /// Host only: which peer holds which client slot.
    pub registry: PeerRegistry,
    /// Client only: the connection to the host, while it exists.
    pub server_peer: Option<PeerId>,
    /// Events waiting for the application.
    pub events: EventQueue,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// This process's player id. Always 1 on the host; 1 on a client until
    /// the host assigns one.
    pub fn local_player_id(&self) -> PlayerId {
        self.local_id
    }

    /// Back to the unconfigured state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn begin_host(&mut self) {
        self.reset();
        self.role = Role::Host;
        tracing::info!(player_id = %self.local_id, "session started as host");
    }

    pub fn begin_client(&mut self, server_peer: PeerId) {
        self.reset();
        self.role = Role::Client;
        self.server_peer = Some(server_peer);
        tracing::info!(%server_peer, "session started as client");
    }

    /// Players in the session, counting the host. Zero unless hosting.
    pub fn connected_count(&self) -> usize {
        match self.role {
            Role::Host => 1 + self.registry.len(),
            Role::None | Role::Client => 0,
        }
    }

    // -----------------------------------------------------------------------
    // Transport event handling
    // -----------------------------------------------------------------------

    /// Host: a peer finished connecting. Gives it the lowest free slot and
    /// queues [`NetEvent::PlayerConnected`].
    ///
    /// # Errors
    /// [`SessionError::SessionFull`] when both client slots are taken; the
    /// caller should answer with `server_full` and drop the peer.
    pub fn admit(&mut self, peer: PeerId) -> Result<PlayerId, SessionError> {
        match self.registry.assign(peer) {
            Ok(player_id) => {
                self.events.push(NetEvent::PlayerConnected { player_id });
                tracing::info!(%peer, %player_id, "player slot assigned");
                Ok(player_id)
            }
            Err(e) => {
                tracing::info!(%peer, reason = %e, "connection refused");
                Err(e)
            }
        }
    }

    /// Client: the connection to the host is up.
    pub fn on_connected(&mut self, peer: PeerId) {
        tracing::info!(%peer, "connected to host");
        self.events.push(NetEvent::Connected);
    }

    /// A peer went away. On the host this frees its slot (if it had one);
    /// on a client it means the host is gone.
    pub fn on_disconnect(&mut self, peer: PeerId) {
        match self.role {
            Role::Host => {
                if let Some(player_id) = self.registry.release(peer) {
                    self.events.push(NetEvent::PlayerDisconnected { player_id });
                    tracing::info!(%peer, %player_id, "player slot freed");
                } else {
                    tracing::debug!(%peer, "unregistered peer disconnected");
                }
            }
            Role::Client => {
                self.server_peer = None;
                self.events.push(NetEvent::Disconnected);
                tracing::info!(%peer, "disconnected from host");
            }
            Role::None => {}
        }
    }

    /// A message arrived from `peer`.
    ///
    /// Clients consume the host's control messages here. Everything else
    /// is queued as-is, tagged with the sender's slot on the host.
    pub fn on_message(&mut self, peer: PeerId, message: Message) {
        if self.role == Role::Client && Control::is_control_kind(&message.kind) {
            match Control::from_message(&message) {
                Some(Control::AssignId { id }) => {
                    self.local_id = id;
                    self.events.push(NetEvent::IdAssigned { player_id: id });
                    tracing::info!(player_id = %id, "player id assigned");
                }
                Some(Control::ServerFull) => {
                    self.events.push(NetEvent::ServerFull);
                    tracing::info!("host reports session full");
                }
                None => {
                    tracing::debug!(%peer, kind = %message.kind, "dropping malformed control message");
                }
            }
            return;
        }

        let from = match self.role {
            Role::Host => self.registry.player_of(peer),
            Role::None | Role::Client => None,
        };
        tracing::trace!(%peer, kind = %message.kind, "message queued");
        self.events.push(NetEvent::Message { message, from });
    }
}
