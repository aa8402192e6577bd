//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every message is a JSON object with a snake_case `type` discriminator;
//! payload fields are camelCase. Inbound text goes through a validating
//! decode step that rejects anything malformed as a [`ProtocolError`]
//! instead of letting missing fields propagate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::state::{Phase, PlayerId, Role};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Create a fresh room and join it as host.
    CreateRoom,

    /// Join an existing room by code.
    Join {
        /// The 4-digit room code.
        #[serde(rename = "roomId")]
        room_id: String,
    },

    /// Request a character. Always rejected - roles are positional.
    SelectCharacter,

    /// Set the caller's lobby ready flag.
    SetReady {
        /// Desired ready state.
        ready: bool,
    },

    /// Change the match format (host only).
    SetBestOf {
        /// Requested best-of value; normalized to 5, 7 or 10.
        #[serde(rename = "bestOf")]
        best_of: u32,
    },

    /// Start the match (host only).
    StartMatch,

    /// Abort the match and return to the lobby (host only).
    ForceStop,

    /// The duel button was pressed.
    Press,

    /// Latency probe; echoed back as `pong`.
    Ping {
        /// Client timestamp, echoed verbatim when present.
        #[serde(default)]
        t: Option<u64>,
    },

    /// Share a measured round-trip time with the room.
    ReportPing {
        /// Measured round-trip time in milliseconds.
        #[serde(rename = "pingMs")]
        ping_ms: f64,
    },

    /// Hold the round in `staring` indefinitely (development tooling).
    DebugSetInfiniteStaring {
        /// Whether the hold is enabled.
        enable: bool,
    },

    /// Manufacture a simultaneous press during `signaled` (development tooling).
    DebugPressOther,
}

/// Every recognized `type` tag, used to tell an unknown type apart from a
/// known type with a malformed payload.
const CLIENT_MESSAGE_TYPES: &[&str] = &[
    "create_room",
    "join",
    "select_character",
    "set_ready",
    "set_best_of",
    "start_match",
    "force_stop",
    "press",
    "ping",
    "report_ping",
    "debug_set_infinite_staring",
    "debug_press_other",
];

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Greeting sent once per connection.
    Hello {
        /// Human-readable welcome text.
        message: String,
    },

    /// A rejected action or malformed message. The connection survives.
    Error {
        /// Human-readable reason.
        message: String,
    },

    /// Acknowledgement that the caller entered a room.
    Joined {
        /// The caller's connection-scoped identifier.
        #[serde(rename = "participantId")]
        participant_id: PlayerId,
        /// The room code that was entered.
        #[serde(rename = "roomId")]
        room_id: String,
    },

    /// Full room snapshot, broadcast after every membership or lobby change.
    RoomState(RoomSnapshot),

    /// A round is starting; carries the optional countdown hint.
    RoundStarting {
        /// 1-based round number.
        round: u32,
        /// Informational planned-signal timestamp (unix ms). Never
        /// authoritative for outcome computation.
        #[serde(rename = "plannedSignalAt", skip_serializing_if = "Option::is_none")]
        planned_signal_at: Option<u64>,
    },

    /// The draw signal. `t` is the sole authority for reaction measurement.
    Signal {
        /// Signal timestamp (unix ms).
        t: u64,
    },

    /// A round concluded, by foul or by the signal.
    RoundResult(RoundResultInfo),

    /// The match concluded; scores reset to the lobby afterwards.
    MatchOver(MatchOverInfo),

    /// Reply to a `ping`.
    Pong {
        /// Echoed client timestamp, or the server time if none was sent.
        t: u64,
    },

    /// A room member shared its measured round-trip time.
    OpponentPing {
        /// Who reported the measurement.
        #[serde(rename = "participantId")]
        participant_id: PlayerId,
        /// Round-trip time in milliseconds.
        #[serde(rename = "pingMs")]
        ping_ms: u64,
    },
}

/// One player entry in a [`RoomSnapshot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerInfo {
    /// Participant identifier.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
    /// Positional role label; `None` only for out-of-cap occupants.
    pub role: Option<Role>,
    /// Lobby ready flag.
    pub ready: bool,
}

/// Snapshot of a room's externally visible state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    /// Players in join order (index 0 is player 1).
    pub players: Vec<PlayerInfo>,
    /// Scoreboard: participant id -> round wins this match.
    pub scores: BTreeMap<PlayerId, u32>,
    /// Current phase.
    pub phase: Phase,
    /// Match format.
    pub best_of: u8,
    /// Host participant, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_id: Option<PlayerId>,
    /// Informational planned-signal timestamp (unix ms).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planned_signal_at: Option<u64>,
}

/// Why a round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundReason {
    /// A press landed before the signal.
    Early,
    /// The signal fired and presses were measured.
    Signal,
}

/// Payload of a `round_result` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundResultInfo {
    /// 1-based round number.
    pub round: u32,
    /// Why the round ended.
    pub reason: RoundReason,
    /// The fouling player, present only when `reason` is `early`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub early_by: Option<PlayerId>,
    /// Round winner; `null` on a draw.
    pub winner_id: Option<PlayerId>,
    /// Measured reaction frames per participant; `null` until pressed.
    pub frames: BTreeMap<PlayerId, Option<u32>>,
    /// Updated scoreboard.
    pub scores: BTreeMap<PlayerId, u32>,
}

/// Payload of a `match_over` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOverInfo {
    /// Match format that was played.
    pub best_of: u8,
    /// Match winner.
    pub winner_id: PlayerId,
    /// Final tally, captured before the post-match reset.
    pub scores: BTreeMap<PlayerId, u32>,
}

// =============================================================================
// DECODE
// =============================================================================

/// Failures at the wire boundary. Always recoverable - the caller gets an
/// `error` reply and the connection stays open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The frame was not valid JSON.
    #[error("Invalid JSON")]
    InvalidJson,

    /// The frame had no string `type` field.
    #[error("Invalid message")]
    MissingType,

    /// The `type` tag is not part of the protocol.
    #[error("Unknown message type: {0}")]
    UnknownType(String),

    /// A recognized `type` with missing or ill-typed payload fields.
    #[error("Malformed {0} message")]
    BadPayload(String),
}

/// Decode one inbound text frame into a [`ClientMessage`].
///
/// Validates required fields per message `type` before dispatch so missing
/// fields never propagate into the state machine.
pub fn decode_client_message(text: &str) -> Result<ClientMessage, ProtocolError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|_| ProtocolError::InvalidJson)?;
    let kind = match value.get("type").and_then(|t| t.as_str()) {
        Some(k) => k.to_string(),
        None => return Err(ProtocolError::MissingType),
    };
    serde_json::from_value(value).map_err(|_| {
        if CLIENT_MESSAGE_TYPES.contains(&kind.as_str()) {
            ProtocolError::BadPayload(kind)
        } else {
            ProtocolError::UnknownType(kind)
        }
    })
}

impl ServerMessage {
    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from a JSON text frame.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_unit_message() {
        let msg = decode_client_message(r#"{"type":"create_room"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::CreateRoom));
    }

    #[test]
    fn test_decode_join() {
        let msg = decode_client_message(r#"{"type":"join","roomId":"4242"}"#).unwrap();
        match msg {
            ClientMessage::Join { room_id } => assert_eq!(room_id, "4242"),
            other => panic!("wrong message: {other:?}"),
        }
    }

    #[test]
    fn test_decode_ignores_extra_fields() {
        let msg = decode_client_message(r#"{"type":"press","nonce":7}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Press));
    }

    #[test]
    fn test_decode_invalid_json() {
        assert_eq!(
            decode_client_message("not json at all"),
            Err(ProtocolError::InvalidJson)
        );
    }

    #[test]
    fn test_decode_missing_type() {
        assert_eq!(
            decode_client_message(r#"{"roomId":"4242"}"#),
            Err(ProtocolError::MissingType)
        );
        // A non-string type tag is just as invalid.
        assert_eq!(
            decode_client_message(r#"{"type":12}"#),
            Err(ProtocolError::MissingType)
        );
    }

    #[test]
    fn test_decode_unknown_type_names_it() {
        let err = decode_client_message(r#"{"type":"holster"}"#).unwrap_err();
        assert_eq!(err, ProtocolError::UnknownType("holster".to_string()));
        assert!(err.to_string().contains("holster"));
    }

    #[test]
    fn test_decode_bad_payload() {
        // Recognized type, missing required field.
        assert_eq!(
            decode_client_message(r#"{"type":"join"}"#),
            Err(ProtocolError::BadPayload("join".to_string()))
        );
        assert_eq!(
            decode_client_message(r#"{"type":"set_ready","ready":"yes"}"#),
            Err(ProtocolError::BadPayload("set_ready".to_string()))
        );
    }

    #[test]
    fn test_decode_ping_without_timestamp() {
        let msg = decode_client_message(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ping { t: None }));
        let msg = decode_client_message(r#"{"type":"ping","t":123}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ping { t: Some(123) }));
    }

    #[test]
    fn test_room_state_wire_shape() {
        let mut scores = BTreeMap::new();
        scores.insert(PlayerId(1), 2);
        scores.insert(PlayerId(2), 0);
        let msg = ServerMessage::RoomState(RoomSnapshot {
            players: vec![PlayerInfo {
                id: PlayerId(1),
                name: "Player".to_string(),
                role: Some(Role::Marshal),
                ready: true,
            }],
            scores,
            phase: Phase::Lobby,
            best_of: 7,
            host_id: Some(PlayerId(1)),
            planned_signal_at: None,
        });

        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""type":"room_state""#));
        assert!(json.contains(r#""bestOf":7"#));
        assert!(json.contains(r#""hostId":"1""#));
        assert!(json.contains(r#""phase":"lobby""#));
        assert!(json.contains(r#""role":"marshal""#));
        // Ids key the scoreboard as strings.
        assert!(json.contains(r#""1":2"#));
        // Absent planned signal is omitted entirely.
        assert!(!json.contains("plannedSignalAt"));

        let parsed = ServerMessage::from_json(&json).unwrap();
        match parsed {
            ServerMessage::RoomState(snapshot) => {
                assert_eq!(snapshot.scores.get(&PlayerId(1)), Some(&2));
                assert_eq!(snapshot.host_id, Some(PlayerId(1)));
            }
            other => panic!("wrong message: {other:?}"),
        }
    }

    #[test]
    fn test_round_result_wire_shape() {
        let mut frames = BTreeMap::new();
        frames.insert(PlayerId(1), Some(3));
        frames.insert(PlayerId(2), None);
        let mut scores = BTreeMap::new();
        scores.insert(PlayerId(1), 1);
        scores.insert(PlayerId(2), 0);

        let msg = ServerMessage::RoundResult(RoundResultInfo {
            round: 2,
            reason: RoundReason::Signal,
            early_by: None,
            winner_id: Some(PlayerId(1)),
            frames,
            scores,
        });
        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""reason":"signal""#));
        assert!(json.contains(r#""winnerId":"1""#));
        // earlyBy is omitted for signal results.
        assert!(!json.contains("earlyBy"));

        let parsed = ServerMessage::from_json(&json).unwrap();
        match parsed {
            ServerMessage::RoundResult(info) => {
                assert_eq!(info.frames.get(&PlayerId(2)), Some(&None));
                assert_eq!(info.winner_id, Some(PlayerId(1)));
            }
            other => panic!("wrong message: {other:?}"),
        }
    }

    #[test]
    fn test_draw_serializes_null_winner() {
        let msg = ServerMessage::RoundResult(RoundResultInfo {
            round: 1,
            reason: RoundReason::Signal,
            early_by: None,
            winner_id: None,
            frames: BTreeMap::new(),
            scores: BTreeMap::new(),
        });
        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""winnerId":null"#));
    }

    #[test]
    fn test_early_result_carries_fouler() {
        let msg = ServerMessage::RoundResult(RoundResultInfo {
            round: 1,
            reason: RoundReason::Early,
            early_by: Some(PlayerId(2)),
            winner_id: Some(PlayerId(1)),
            frames: BTreeMap::new(),
            scores: BTreeMap::new(),
        });
        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""reason":"early""#));
        assert!(json.contains(r#""earlyBy":"2""#));
    }

    #[test]
    fn test_match_over_round_trip() {
        let mut scores = BTreeMap::new();
        scores.insert(PlayerId(5), 3);
        scores.insert(PlayerId(6), 1);
        let msg = ServerMessage::MatchOver(MatchOverInfo {
            best_of: 5,
            winner_id: PlayerId(5),
            scores,
        });
        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""type":"match_over""#));
        assert!(json.contains(r#""winnerId":"5""#));

        match ServerMessage::from_json(&json).unwrap() {
            ServerMessage::MatchOver(info) => {
                assert_eq!(info.best_of, 5);
                assert_eq!(info.scores.get(&PlayerId(6)), Some(&1));
            }
            other => panic!("wrong message: {other:?}"),
        }
    }
}
