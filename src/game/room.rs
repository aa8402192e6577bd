//! Room Aggregate
//!
//! A room pairs at most two duelists and owns everything a match needs:
//! membership in join order, the scoreboard, the phase, per-round transient
//! state, and the pending timer handles for the round state machine.
//!
//! Methods here are synchronous state transitions; the timed transitions
//! that drive a round live in [`crate::game::round`]. Callers hold the
//! room's `Mutex`, which serializes participant actions and timer callbacks.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::game::error::GameError;
use crate::game::state::{target_wins, normalize_best_of, Phase, PlayerId, Role};
use crate::network::protocol::{PlayerInfo, RoomSnapshot, ServerMessage};

/// Maximum duelists in a room.
pub const ROOM_CAP: usize = 2;

/// Shared handle to a room. Timer callbacks re-lock through this.
pub type SharedRoom = Arc<Mutex<Room>>;

/// A duelist occupying a room slot.
///
/// Slots are kept in join order; index 0 is conventionally "player 1".
pub struct PlayerSlot {
    /// Participant identifier.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
    /// Lobby ready flag; meaningful only while the room is in `lobby`.
    pub ready: bool,
    /// When this player pressed this round (unix ms), if at all.
    pub pressed_at: Option<u64>,
    /// Outbound channel to this player's connection writer.
    pub sender: mpsc::Sender<ServerMessage>,
}

/// The room aggregate.
pub struct Room {
    /// External room code other participants use to join.
    pub code: String,
    /// Duelists in join order. Never more than [`ROOM_CAP`].
    pub players: Vec<PlayerSlot>,
    /// Scoreboard: participant id -> round wins this match.
    pub scores: BTreeMap<PlayerId, u32>,
    /// Current phase.
    pub phase: Phase,
    /// Round counter; 0 until a match starts.
    pub round: u32,
    /// Match format (5, 7 or 10).
    pub best_of: u8,
    /// Host participant, empowered to start/stop and set the format.
    pub host: Option<PlayerId>,
    /// Measured reaction frames per participant; `None` until pressed.
    pub frames: BTreeMap<PlayerId, Option<u32>>,
    /// When the signal actually fired (unix ms). Sole timing authority.
    pub signal_at: Option<u64>,
    /// Informational planned-signal timestamp for client countdowns.
    pub planned_signal_at: Option<u64>,
    /// When the current round started (unix ms).
    pub round_start_at: Option<u64>,
    /// Who fouled this round, if anyone. A round ends early at most once.
    pub early: Option<PlayerId>,
    /// Winner of the current round, if decided.
    pub winner: Option<PlayerId>,
    /// Suspends the automatic signal schedule indefinitely.
    pub debug_infinite_staring: bool,
    /// Outstanding timer tasks, bulk-cancelled on every teardown.
    timers: Vec<JoinHandle<()>>,
}

impl Room {
    /// Create an empty room in the lobby phase.
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            players: Vec::new(),
            scores: BTreeMap::new(),
            phase: Phase::Lobby,
            round: 0,
            best_of: 5,
            host: None,
            frames: BTreeMap::new(),
            signal_at: None,
            planned_signal_at: None,
            round_start_at: None,
            early: None,
            winner: None,
            debug_infinite_staring: false,
            timers: Vec::new(),
        }
    }

    // =========================================================================
    // MEMBERSHIP
    // =========================================================================

    /// Whether the given participant occupies a slot.
    pub fn contains(&self, id: PlayerId) -> bool {
        self.players.iter().any(|p| p.id == id)
    }

    /// Slot lookup.
    pub fn player(&self, id: PlayerId) -> Option<&PlayerSlot> {
        self.players.iter().find(|p| p.id == id)
    }

    /// Mutable slot lookup.
    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut PlayerSlot> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    /// The other duelist, if present.
    pub fn opponent_of(&self, id: PlayerId) -> Option<PlayerId> {
        self.players.iter().find(|p| p.id != id).map(|p| p.id)
    }

    /// Add a participant, or refresh their slot on an idempotent re-join.
    ///
    /// A re-join by an existing member is a membership no-op (the slot keeps
    /// its position) but resets the ready flag and adopts the new outbound
    /// channel. The first member of a hostless room becomes host.
    pub fn add_player(
        &mut self,
        id: PlayerId,
        name: impl Into<String>,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<(), GameError> {
        if let Some(slot) = self.player_mut(id) {
            slot.ready = false;
            slot.sender = sender;
        } else {
            if self.players.len() >= ROOM_CAP {
                return Err(GameError::RoomFull);
            }
            self.players.push(PlayerSlot {
                id,
                name: name.into(),
                ready: false,
                pressed_at: None,
                sender,
            });
        }
        self.scores.entry(id).or_insert(0);
        if self.host.is_none() {
            self.host = Some(id);
        }
        Ok(())
    }

    /// Remove a participant and tear the match down.
    ///
    /// Any membership loss aborts the match in progress: timers are
    /// cancelled, the room returns to the lobby with the round counter and
    /// all per-round fields reset, remaining ready flags are cleared, and
    /// the host role falls to the first remaining player. Returns `false`
    /// if the participant was not a member.
    pub fn remove_player(&mut self, id: PlayerId) -> bool {
        let before = self.players.len();
        self.players.retain(|p| p.id != id);
        if self.players.len() == before {
            return false;
        }
        self.scores.remove(&id);
        self.clear_timers();
        self.phase = Phase::Lobby;
        self.round = 0;
        self.frames.clear();
        self.signal_at = None;
        self.planned_signal_at = None;
        self.round_start_at = None;
        self.early = None;
        self.winner = None;
        for p in &mut self.players {
            p.ready = false;
            p.pressed_at = None;
        }
        if self.host == Some(id) {
            self.host = self.players.first().map(|p| p.id);
        }
        true
    }

    // =========================================================================
    // TIMERS
    // =========================================================================

    /// Track a pending timer so it can be bulk-cancelled.
    pub fn push_timer(&mut self, handle: JoinHandle<()>) {
        self.timers.push(handle);
    }

    /// Abort every outstanding timer for this room.
    ///
    /// Called before every phase teardown so a late-firing stale timer from
    /// a superseded phase cannot touch a later one.
    pub fn clear_timers(&mut self) {
        for handle in self.timers.drain(..) {
            handle.abort();
        }
    }

    // =========================================================================
    // LOBBY CONTROLS
    // =========================================================================

    /// Set a player's ready flag. Legal only in the lobby.
    pub fn set_ready(&mut self, id: PlayerId, ready: bool) -> Result<(), GameError> {
        if self.phase != Phase::Lobby {
            return Err(GameError::InvalidPhase);
        }
        if let Some(slot) = self.player_mut(id) {
            slot.ready = ready;
        }
        Ok(())
    }

    /// Change the match format. Host only, lobby only.
    ///
    /// The requested value is normalized to the nearest supported format;
    /// anything outside {5, 7, 10} coerces to 5.
    pub fn set_best_of(&mut self, id: PlayerId, value: u32) -> Result<u8, GameError> {
        if self.host != Some(id) {
            return Err(GameError::NotHost);
        }
        if self.phase != Phase::Lobby {
            return Err(GameError::InvalidPhase);
        }
        self.best_of = normalize_best_of(value);
        Ok(self.best_of)
    }

    /// Check whether the given participant may start the match right now.
    ///
    /// Requires the host, the lobby phase, exactly two duelists, and a
    /// ready non-host. The host's own ready flag is irrelevant.
    pub fn validate_start(&self, id: PlayerId) -> Result<(), GameError> {
        if self.host != Some(id) {
            return Err(GameError::NotHost);
        }
        if self.phase != Phase::Lobby {
            return Err(GameError::InvalidPhase);
        }
        let opponent_ready = self.players.len() == ROOM_CAP
            && self
                .players
                .iter()
                .any(|p| Some(p.id) != self.host && p.ready);
        if !opponent_ready {
            return Err(GameError::OpponentNotReady);
        }
        Ok(())
    }

    /// Reset scores and the round counter ahead of round scheduling.
    pub fn prepare_match(&mut self) {
        self.clear_timers();
        for p in &mut self.players {
            self.scores.insert(p.id, 0);
            p.pressed_at = None;
        }
        self.round = 0;
    }

    /// Abort everything and return to a clean lobby.
    ///
    /// The only way to stop an in-progress match: cancels timers, zeroes
    /// scores and the round counter, clears per-round fields and ready
    /// flags.
    pub fn force_stop(&mut self) {
        self.clear_timers();
        self.phase = Phase::Lobby;
        self.round = 0;
        self.frames.clear();
        self.signal_at = None;
        self.planned_signal_at = None;
        self.round_start_at = None;
        self.early = None;
        self.winner = None;
        for p in &mut self.players {
            p.ready = false;
            p.pressed_at = None;
        }
        for wins in self.scores.values_mut() {
            *wins = 0;
        }
    }

    // =========================================================================
    // ROUND STATE
    // =========================================================================

    /// Reset per-round transient state and enter `staring`.
    pub fn reset_round_state(&mut self) {
        self.phase = Phase::Staring;
        self.signal_at = None;
        self.planned_signal_at = None;
        self.round_start_at = None;
        self.early = None;
        self.winner = None;
        self.frames = self.players.iter().map(|p| (p.id, None)).collect();
        for p in &mut self.players {
            p.pressed_at = None;
        }
    }

    /// Round wins required to take the match at the current format.
    pub fn target_wins(&self) -> u32 {
        target_wins(self.best_of)
    }

    /// The first duelist whose score reached the match target, if any.
    pub fn match_winner(&self) -> Option<PlayerId> {
        let target = self.target_wins();
        self.players
            .iter()
            .find(|p| self.scores.get(&p.id).copied().unwrap_or(0) >= target)
            .map(|p| p.id)
    }

    /// Decide the round from the recorded frame counts.
    ///
    /// Both missing: draw (nobody pressed). One missing: the presser wins.
    /// Both present: fewer frames wins, equal frames draw.
    pub fn round_winner(&self) -> Option<PlayerId> {
        if self.players.len() < ROOM_CAP {
            return None;
        }
        let (a, b) = (self.players[0].id, self.players[1].id);
        let fa = self.frames.get(&a).copied().flatten();
        let fb = self.frames.get(&b).copied().flatten();
        match (fa, fb) {
            (Some(x), Some(y)) => {
                if x == y {
                    None
                } else if x < y {
                    Some(a)
                } else {
                    Some(b)
                }
            }
            (Some(_), None) => Some(a),
            (None, Some(_)) => Some(b),
            (None, None) => None,
        }
    }

    // =========================================================================
    // BROADCAST
    // =========================================================================

    /// Externally visible snapshot with positional role labels.
    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            players: self
                .players
                .iter()
                .enumerate()
                .map(|(i, p)| PlayerInfo {
                    id: p.id,
                    name: p.name.clone(),
                    role: Role::for_index(i),
                    ready: p.ready,
                })
                .collect(),
            scores: self.scores.clone(),
            phase: self.phase,
            best_of: self.best_of,
            host_id: self.host,
            planned_signal_at: self.planned_signal_at,
        }
    }

    /// Deliver an event to every player in the room.
    ///
    /// A failed delivery to one connection never aborts delivery to the
    /// rest.
    pub async fn broadcast(&self, message: ServerMessage) {
        for p in &self.players {
            let _ = p.sender.send(message.clone()).await;
        }
    }

    /// Broadcast the current room snapshot.
    pub async fn publish_state(&self) {
        self.broadcast(ServerMessage::RoomState(self.snapshot())).await;
    }
}
