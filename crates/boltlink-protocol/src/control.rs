//! Session control messages sent by the host.
//!
//! These ride the same wire format as application messages; the session
//! layer intercepts them on the client before anything reaches the app.

use crate::types::{Message, PlayerId};

/// Message type of [`Control::AssignId`].
pub const ASSIGN_ID: &str = "assign_id";
/// Message type of [`Control::ServerFull`].
pub const SERVER_FULL: &str = "server_full";

/// Host → client messages that drive the join handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// "You are player `id`." Sent reliably right after a client connects.
    AssignId { id: PlayerId },
    /// "No free slot." Sent reliably just before the host drops the peer.
    ServerFull,
}

impl Control {
    pub fn to_message(self) -> Message {
        match self {
            Self::AssignId { id } => Message::new(ASSIGN_ID).with("id", id),
            Self::ServerFull => Message::new(SERVER_FULL),
        }
    }

    /// Recognizes a control message.
    ///
    /// Returns `None` for application messages, and for an `assign_id`
    /// whose `id` is missing or not a player number.
    pub fn from_message(message: &Message) -> Option<Self> {
        match message.kind.as_str() {
            ASSIGN_ID => {
                let id = message.fields.number("id").and_then(PlayerId::from_number)?;
                Some(Self::AssignId { id })
            }
            SERVER_FULL => Some(Self::ServerFull),
            _ => None,
        }
    }

    /// Whether `kind` is one of the reserved control message types.
    pub fn is_control_kind(kind: &str) -> bool {
        matches!(kind, ASSIGN_ID | SERVER_FULL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Codec, TextCodec};

    #[test]
    fn test_assign_id_wire_form() {
        let bytes = TextCodec
            .encode(&Control::AssignId { id: PlayerId(2) }.to_message())
            .unwrap();
        assert_eq!(bytes, b"assign_id|id=2");
    }

    #[test]
    fn test_server_full_wire_form_has_no_fields() {
        let bytes = TextCodec.encode(&Control::ServerFull.to_message()).unwrap();
        assert_eq!(bytes, b"server_full");
    }

    #[test]
    fn test_from_message_reads_decoded_assign_id() {
        let msg = TextCodec.decode(b"assign_id|id=3").unwrap();
        assert_eq!(
            Control::from_message(&msg),
            Some(Control::AssignId { id: PlayerId(3) })
        );
    }

    #[test]
    fn test_from_message_assign_id_without_valid_id_returns_none() {
        for raw in ["assign_id", "assign_id|id=9", "assign_id|id=two", "assign_id|id=2.5"] {
            let msg = TextCodec.decode(raw.as_bytes()).unwrap();
            assert_eq!(Control::from_message(&msg), None, "{raw}");
        }
    }

    #[test]
    fn test_from_message_application_message_returns_none() {
        assert_eq!(Control::from_message(&Message::new("pos").with("x", 1)), None);
        assert!(!Control::is_control_kind("pos"));
        assert!(Control::is_control_kind(SERVER_FULL));
    }
}
