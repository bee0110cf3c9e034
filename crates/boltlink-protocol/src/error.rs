//! Error types for the protocol layer.
//!
//! Everything here is about the bytes of one message: whether it can be
//! written to the wire, and whether bytes off the wire form a message.
//! Connection problems live in `TransportError`.

/// Errors that can occur while encoding or decoding a [`Message`](crate::Message).
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The input held no message type: empty, or nothing but separators.
    #[error("no message type in input")]
    Empty,

    /// The input was not valid UTF-8 text.
    #[error("message is not valid UTF-8")]
    NotUtf8(#[from] std::str::Utf8Error),

    /// The message cannot be written without changing its meaning on the
    /// other side, e.g. a key containing `|` or a non-finite number.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// JSON serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// JSON deserialization failed: malformed JSON, or the wrong shape.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),
}
