//! # Quickdraw Match Server
//!
//! Authoritative match engine for Quickdraw, a two-player reaction-time
//! duel played over WebSockets. The server pairs duelists into rooms,
//! drives each round through a fixed sequence of timed phases, measures
//! reaction latency against a randomly-delayed signal, and arbitrates
//! scoring, best-of-N completion, and early-press fouls.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    QUICKDRAW SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  game/           - Match engine                              │
//! │  ├── state.rs    - Ids, phases, roles, timing arithmetic     │
//! │  ├── room.rs     - Room aggregate and lobby controls         │
//! │  ├── round.rs    - Timed round state machine                 │
//! │  ├── store.rs    - Room-code allocation and lookup           │
//! │  └── error.rs    - User-facing rejections                    │
//! │                                                              │
//! │  network/        - Transport                                 │
//! │  ├── server.rs   - WebSocket accept loop and dispatch        │
//! │  ├── protocol.rs - Tagged wire messages + validated decode   │
//! │  └── session.rs  - Live-connection registry                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Timing Authority
//!
//! The server is the sole timing authority. Clients receive an optional
//! planned-signal timestamp for countdown display, but every outcome is
//! computed from the server-side `signal` timestamp and server-side press
//! arrival times, quantized to 60fps frames.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod game;
pub mod network;

// Re-export commonly used types
pub use game::room::{Room, SharedRoom};
pub use game::state::{Phase, PlayerId, Role};
pub use game::store::RoomStore;
pub use game::GameError;
pub use network::protocol::{ClientMessage, ProtocolError, ServerMessage};
pub use network::server::{MatchServer, ServerConfig, ServerError};
pub use network::session::SessionRegistry;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Logical frame rate used to quantize reaction times (Hz)
pub const TICK_RATE: u32 = 60;

/// Duration of one logical frame in milliseconds
pub const FRAME_MS: f64 = 1000.0 / TICK_RATE as f64;
