//! Network Layer
//!
//! WebSocket server, wire protocol, and the live-connection registry.
//! All match logic runs through `game/`; this layer only decodes, routes,
//! and delivers.

pub mod protocol;
pub mod server;
pub mod session;

pub use protocol::{
    decode_client_message, ClientMessage, ProtocolError, RoomSnapshot, RoundReason,
    ServerMessage,
};
pub use server::{MatchServer, ServerConfig, ServerError};
pub use session::SessionRegistry;
