//! Wire protocol for boltlink.
//!
//! This crate defines what peers say to each other:
//!
//! - **Types** ([`Message`], [`Fields`], [`Value`], [`PlayerId`]): an
//!   application message is a type tag plus flat or one-level-grouped
//!   scalar fields.
//! - **Codecs** ([`Codec`], [`TextCodec`], [`JsonCodec`]): how messages
//!   become bytes.
//! - **Control** ([`Control`]): the host's join handshake messages.
//! - **Snapshots** ([`Snapshot`]): state that flattens into fields.
//!
//! It knows nothing about connections or roles.
//!
//! ```text
//! Transport (bytes) → Protocol (Message) → Session (who sent it)
//! ```

mod codec;
mod control;
mod error;
mod snapshot;
mod types;

pub use codec::{Codec, TextCodec};
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use control::{ASSIGN_ID, Control, SERVER_FULL};
pub use error::ProtocolError;
pub use snapshot::Snapshot;
pub use types::{Field, Fields, Group, Message, PlayerId, Value};
