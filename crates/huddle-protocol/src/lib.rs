//! Wire protocol for the huddle signaling relay.
//!
//! Clients exchange JSON text frames over a persistent WebSocket. The relay
//! only ever looks at the `type` and `roomId` fields and forwards everything
//! else untouched, so inbound frames are classified rather than fully
//! deserialized.

pub mod error;
pub mod event;
pub mod frame;

pub use error::ProtocolError;
pub use event::ServerEvent;
pub use frame::{classify, ClientFrame};
