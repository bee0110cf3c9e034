//! Inbound events handed to the application once per tick.

use std::mem;

use boltlink_protocol::{Message, PlayerId};

/// Something that happened since the application last drained the queue.
#[derive(Debug, Clone, PartialEq)]
pub enum NetEvent {
    /// Client: the transport connection to the host is up. No identity yet.
    Connected,
    /// Client: the connection to the host is gone (or never came up).
    Disconnected,
    /// Client: the host assigned this client its player id.
    IdAssigned { player_id: PlayerId },
    /// Client: the host had no free slot and is dropping us.
    ServerFull,
    /// Host: a client took a slot.
    PlayerConnected { player_id: PlayerId },
    /// Host: the client in a slot went away and the slot is free again.
    PlayerDisconnected { player_id: PlayerId },
    /// Any application message. `from` is the sender's slot when the host
    /// receives from a registered client, and `None` on clients.
    Message { message: Message, from: Option<PlayerId> },
}

impl NetEvent {
    /// The event's type tag: `"connected"`, `"player_disconnected"`, ...,
    /// or the message type for application messages.
    pub fn kind(&self) -> &str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::IdAssigned { .. } => "id_assigned",
            Self::ServerFull => "server_full",
            Self::PlayerConnected { .. } => "player_connected",
            Self::PlayerDisconnected { .. } => "player_disconnected",
            Self::Message { message, .. } => &message.kind,
        }
    }
}

/// Ordered queue of [`NetEvent`]s, filled by the network update and
/// emptied in one go by the application.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: Vec<NetEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: NetEvent) {
        self.events.push(event);
    }

    /// Takes every queued event, leaving the queue empty.
    pub fn drain(&mut self) -> Vec<NetEvent> {
        mem::take(&mut self.events)
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
