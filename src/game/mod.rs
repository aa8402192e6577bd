//! Match Engine
//!
//! Rooms, phases, and the timed round state machine. Everything here is
//! driven by exactly two event sources - inbound participant actions and
//! elapsed timers - serialized per room by its lock.
//!
//! ## Module Structure
//!
//! - `state`: ids, phases, roles, timing arithmetic
//! - `error`: user-facing domain rejections
//! - `room`: the room aggregate (membership, scoreboard, lobby controls)
//! - `round`: the timed round state machine
//! - `store`: room-code allocation and lookup

pub mod error;
pub mod room;
pub mod round;
pub mod state;
pub mod store;

// Re-export key types
pub use error::GameError;
pub use room::{PlayerSlot, Room, SharedRoom, ROOM_CAP};
pub use state::{Phase, PlayerId, Role};
pub use store::RoomStore;
