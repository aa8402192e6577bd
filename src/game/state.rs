//! Core Match Types
//!
//! Identifiers, phases, role labels, and the timing arithmetic shared by
//! the round state machine and the wire protocol.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::FRAME_MS;

// =============================================================================
// PLAYER ID
// =============================================================================

/// Unique participant identifier, assigned at connect time.
///
/// Allocated from a process-wide monotonic counter; uniqueness is the only
/// requirement. On the wire it travels as a decimal string, both as a value
/// and as a scoreboard key. Implements `Ord` for deterministic map ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Default)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for PlayerId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for PlayerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IdVisitor;

        impl Visitor<'_> for IdVisitor {
            type Value = PlayerId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a participant id string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<PlayerId, E> {
                v.parse::<u64>().map(PlayerId).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_str(IdVisitor)
    }
}

// =============================================================================
// PHASE
// =============================================================================

/// The room's current point in the round life-cycle.
///
/// Terminal-free cycle:
/// `lobby -> staring -> waiting -> signaled -> result -> (lobby | staring)`.
/// `lobby` is also the phase entered after a full match concludes or is
/// force-stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Waiting for players to ready up.
    Lobby,
    /// Fixed stare-down window at the start of a round.
    Staring,
    /// Random delay before the signal; pressing now is a foul.
    Waiting,
    /// Signal issued; reaction times are being measured.
    Signaled,
    /// Round concluded; next round or match end pending.
    Result,
}

// =============================================================================
// ROLE
// =============================================================================

/// Fixed positional role label for a duelist.
///
/// Assignment is positional, never a player choice: the first joiner is
/// always the marshal, the second the outlaw.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Player 1 (list index 0).
    Marshal,
    /// Player 2 (list index 1).
    Outlaw,
}

impl Role {
    /// Role for a player list index. Indices past the duel cap get no role.
    pub fn for_index(index: usize) -> Option<Role> {
        match index {
            0 => Some(Role::Marshal),
            1 => Some(Role::Outlaw),
            _ => None,
        }
    }
}

// =============================================================================
// TIMING HELPERS
// =============================================================================

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Convert a reaction latency in milliseconds to whole frames.
///
/// Rounds to the nearest multiple of the frame duration (60 logical frames
/// per second).
pub fn frames_from_ms(ms: u64) -> u32 {
    (ms as f64 / FRAME_MS).round() as u32
}

/// Clamp a requested best-of value to a supported one.
///
/// Supported formats are best-of 5, 7 and 10; anything else coerces to 5.
pub fn normalize_best_of(value: u32) -> u8 {
    match value {
        5 | 7 | 10 => value as u8,
        _ => 5,
    }
}

/// Round wins required to take a best-of-N match.
pub fn target_wins(best_of: u8) -> u32 {
    u32::from(best_of) / 2 + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_round_to_nearest() {
        assert_eq!(frames_from_ms(0), 0);
        // Half a frame and below rounds down.
        assert_eq!(frames_from_ms(8), 0);
        assert_eq!(frames_from_ms(9), 1);
        // Worked examples: 50ms -> 3 frames, 67ms -> 4 frames at 60fps.
        assert_eq!(frames_from_ms(50), 3);
        assert_eq!(frames_from_ms(67), 4);
        assert_eq!(frames_from_ms(1000), 60);
    }

    #[test]
    fn test_normalize_best_of() {
        assert_eq!(normalize_best_of(5), 5);
        assert_eq!(normalize_best_of(7), 7);
        assert_eq!(normalize_best_of(10), 10);
        assert_eq!(normalize_best_of(6), 5);
        assert_eq!(normalize_best_of(0), 5);
        assert_eq!(normalize_best_of(9999), 5);
    }

    #[test]
    fn test_target_wins() {
        assert_eq!(target_wins(5), 3);
        assert_eq!(target_wins(7), 4);
        assert_eq!(target_wins(10), 6);
    }

    #[test]
    fn test_roles_are_positional() {
        assert_eq!(Role::for_index(0), Some(Role::Marshal));
        assert_eq!(Role::for_index(1), Some(Role::Outlaw));
        assert_eq!(Role::for_index(2), None);
    }

    #[test]
    fn test_phase_wire_strings() {
        assert_eq!(serde_json::to_string(&Phase::Lobby).unwrap(), "\"lobby\"");
        assert_eq!(serde_json::to_string(&Phase::Staring).unwrap(), "\"staring\"");
        assert_eq!(serde_json::to_string(&Phase::Waiting).unwrap(), "\"waiting\"");
        assert_eq!(serde_json::to_string(&Phase::Signaled).unwrap(), "\"signaled\"");
        assert_eq!(serde_json::to_string(&Phase::Result).unwrap(), "\"result\"");
    }

    #[test]
    fn test_player_id_display() {
        assert_eq!(PlayerId(42).to_string(), "42");
    }

    #[test]
    fn test_player_id_wire_format() {
        // Ids travel as strings, both as values and as map keys.
        assert_eq!(serde_json::to_string(&PlayerId(3)).unwrap(), "\"3\"");
        let parsed: PlayerId = serde_json::from_str("\"3\"").unwrap();
        assert_eq!(parsed, PlayerId(3));

        let mut scores = std::collections::BTreeMap::new();
        scores.insert(PlayerId(1), 2u32);
        let json = serde_json::to_string(&scores).unwrap();
        assert_eq!(json, r#"{"1":2}"#);
        let back: std::collections::BTreeMap<PlayerId, u32> =
            serde_json::from_str(&json).unwrap();
        assert_eq!(back.get(&PlayerId(1)), Some(&2));
    }
}
