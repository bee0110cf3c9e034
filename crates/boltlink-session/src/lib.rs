//! Session state for boltlink.
//!
//! This crate tracks who is in the session:
//!
//! 1. **Role**: host, client, or neither ([`Role`])
//! 2. **Slots**: which transport peer is player 2 and which is player 3
//!    ([`PeerRegistry`])
//! 3. **Events**: what the application should hear about this tick
//!    ([`NetEvent`], [`EventQueue`])
//!
//! [`SessionState`] ties these together and turns transport happenings
//! into membership changes. It never sends anything itself.
//!
//! # How it fits in the stack
//!
//! ```text
//! Network (above)   ← polls the transport, sends replies
//!     ↕
//! Session (this crate)  ← decides what each connect/disconnect/message means
//!     ↕
//! Protocol (below)  ← Message, PlayerId, Control
//! ```

mod error;
mod event;
mod registry;
mod state;

pub use error::SessionError;
pub use event::{EventQueue, NetEvent};
pub use registry::PeerRegistry;
pub use state::{Role, SessionState};
