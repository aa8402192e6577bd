//! Round State Machine
//!
//! Drives a room through the timed phases of a round:
//!
//! ```text
//! staring (4000ms) -> waiting (random 3000-15000ms) -> signaled -> result
//! ```
//!
//! Timers are spawned tasks that sleep and then re-lock the room, and every
//! handle is tracked on the room so a phase teardown can bulk-cancel them.
//! Each callback also re-checks the phase it expects before acting, so a
//! handle that escapes cancellation is harmless.

use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::game::room::{Room, SharedRoom};
use crate::game::state::{frames_from_ms, unix_ms, Phase, PlayerId};
use crate::network::protocol::{MatchOverInfo, RoundReason, RoundResultInfo, ServerMessage};

/// Fixed stare-down floor at the start of every round.
pub const STARING_MS: u64 = 4_000;

/// Bounds of the uniformly random extra delay before the signal.
pub const MIN_EXTRA_DELAY_MS: u64 = 3_000;
/// Upper bound, inclusive.
pub const MAX_EXTRA_DELAY_MS: u64 = 15_000;

/// Pause between a round result and the next round (or the match-over event).
pub const POST_ROUND_DELAY_MS: u64 = 4_000;

/// How long a lone press waits for a near-simultaneous opposing press
/// before the round concludes: one frame rounded up, plus scheduling slack.
pub const PRESS_GRACE_MS: u64 = 19;

/// Begin the next round: bump the counter, reset per-round state, enter
/// `staring`, and schedule the transition to `waiting`.
///
/// With fewer than two duelists this is a no-op. With infinite staring
/// enabled the round stays in `staring` until the flag is toggled off.
pub async fn start_round(handle: &SharedRoom) {
    let mut room = handle.lock().await;
    if room.players.len() < 2 {
        return;
    }
    room.round += 1;
    room.reset_round_state();

    let started_at = unix_ms();
    room.round_start_at = Some(started_at);
    let extra: u64 = rand::thread_rng().gen_range(MIN_EXTRA_DELAY_MS..=MAX_EXTRA_DELAY_MS);
    let total_ms = STARING_MS + extra;
    room.planned_signal_at = if room.debug_infinite_staring {
        None
    } else {
        Some(started_at + total_ms)
    };

    room.broadcast(ServerMessage::RoundStarting {
        round: room.round,
        planned_signal_at: room.planned_signal_at,
    })
    .await;
    info!("[room {}] round {} staring for {}ms", room.code, room.round, STARING_MS);

    if room.debug_infinite_staring {
        info!("[room {}] infinite staring on; holding in staring", room.code);
        return;
    }

    let h = handle.clone();
    let timer = tokio::spawn(async move {
        sleep(Duration::from_millis(STARING_MS)).await;
        enter_waiting(&h, total_ms - STARING_MS).await;
    });
    room.push_timer(timer);
}

/// Leave `staring` for `waiting` and schedule the signal.
async fn enter_waiting(handle: &SharedRoom, delay_to_signal_ms: u64) {
    let mut room = handle.lock().await;
    if room.phase != Phase::Staring {
        return;
    }
    room.phase = Phase::Waiting;
    room.publish_state().await;
    debug!(
        "[room {}] round {} waiting; signal in {}ms",
        room.code, room.round, delay_to_signal_ms
    );

    let h = handle.clone();
    let timer = tokio::spawn(async move {
        sleep(Duration::from_millis(delay_to_signal_ms)).await;
        issue_signal(&h).await;
    });
    room.push_timer(timer);
}

/// Fire the signal: stamp the authoritative timestamp and enter `signaled`.
///
/// Skipped when fewer than two duelists remain or the round already ended
/// early.
async fn issue_signal(handle: &SharedRoom) {
    let mut room = handle.lock().await;
    if room.players.len() < 2 || room.early.is_some() || room.phase != Phase::Waiting {
        return;
    }
    room.phase = Phase::Signaled;
    let t = unix_ms();
    room.signal_at = Some(t);
    info!("[room {}] round {} signal at {}", room.code, room.round, t);
    room.broadcast(ServerMessage::Signal { t }).await;
}

/// Process a duel button press from a room member.
///
/// In `staring` presses are silently ignored (a grace window before fouls
/// count). In `waiting` the press is a foul that ends the round in the
/// presser's disfavor. In `signaled` the first press per player is
/// timestamped; the round concludes immediately when the opponent already
/// pressed, otherwise after a short grace window for a near-simultaneous
/// second press.
pub async fn handle_press(handle: &SharedRoom, id: PlayerId) {
    let mut room = handle.lock().await;
    if room.players.len() < 2 {
        return;
    }
    match room.phase {
        // Too early to even register as a foul.
        Phase::Staring => {}

        Phase::Waiting => {
            info!("[room {}] round {} early press by {}", room.code, room.round, id);
            room.clear_timers();
            end_round_early(&mut room, handle, id).await;
        }

        Phase::Signaled => {
            let Some(signal_at) = room.signal_at else { return };
            if room.player(id).map_or(true, |p| p.pressed_at.is_some()) {
                // Repeat presses in the same round are idempotent.
                return;
            }
            let now = unix_ms();
            let delta = now.saturating_sub(signal_at);
            let frames = frames_from_ms(delta);
            if let Some(slot) = room.player_mut(id) {
                slot.pressed_at = Some(now);
            }
            room.frames.insert(id, Some(frames));
            debug!(
                "[room {}] round {} press by {} delta={}ms ({}f)",
                room.code, room.round, id, delta, frames
            );

            let opponent_pressed = room
                .players
                .iter()
                .any(|p| p.id != id && p.pressed_at.is_some());
            if opponent_pressed {
                conclude_after_signal(&mut room, handle).await;
            } else {
                let h = handle.clone();
                let timer = tokio::spawn(async move {
                    sleep(Duration::from_millis(PRESS_GRACE_MS)).await;
                    let mut room = h.lock().await;
                    conclude_after_signal(&mut room, &h).await;
                });
                room.push_timer(timer);
            }
        }

        Phase::Lobby | Phase::Result => {}
    }
}

/// End the round on a foul, crediting the opponent.
async fn end_round_early(room: &mut Room, handle: &SharedRoom, id: PlayerId) {
    if room.early.is_some() {
        return;
    }
    room.phase = Phase::Result;
    room.early = Some(id);
    let opponent = room.opponent_of(id);
    room.winner = opponent;
    if let Some(op) = opponent {
        *room.scores.entry(op).or_insert(0) += 1;
    }
    info!(
        "[room {}] round {} ended early by {}; winner {:?}",
        room.code, room.round, id, room.winner
    );

    let result = RoundResultInfo {
        round: room.round,
        reason: RoundReason::Early,
        early_by: Some(id),
        winner_id: room.winner,
        frames: room.frames.clone(),
        scores: room.scores.clone(),
    };
    room.broadcast(ServerMessage::RoundResult(result)).await;
    schedule_post_round(room, handle);
}

/// Conclude a signaled round from the recorded frame counts.
///
/// Only valid while the phase is exactly `signaled`; stale grace timers
/// fall through here harmlessly.
async fn conclude_after_signal(room: &mut Room, handle: &SharedRoom) {
    if room.phase != Phase::Signaled {
        return;
    }
    room.phase = Phase::Result;
    let winner = room.round_winner();
    room.winner = winner;
    if let Some(w) = winner {
        *room.scores.entry(w).or_insert(0) += 1;
    }
    info!(
        "[room {}] round {} result; winner {:?} frames {:?}",
        room.code, room.round, room.winner, room.frames
    );

    let result = RoundResultInfo {
        round: room.round,
        reason: RoundReason::Signal,
        early_by: None,
        winner_id: winner,
        frames: room.frames.clone(),
        scores: room.scores.clone(),
    };
    room.broadcast(ServerMessage::RoundResult(result)).await;
    schedule_post_round(room, handle);
}

/// After any conclusion, schedule either the match-over sequence or the
/// next round.
fn schedule_post_round(room: &mut Room, handle: &SharedRoom) {
    if let Some(winner) = room.match_winner() {
        info!(
            "[room {}] match won by {}; final scores {:?}",
            room.code, winner, room.scores
        );
        let h = handle.clone();
        let timer = tokio::spawn(async move {
            sleep(Duration::from_millis(POST_ROUND_DELAY_MS)).await;
            finish_match(&h, winner).await;
        });
        room.push_timer(timer);
    } else {
        debug!(
            "[room {}] round {} done; next round in {}ms",
            room.code, room.round, POST_ROUND_DELAY_MS
        );
        let h = handle.clone();
        let timer = tokio::spawn(async move {
            sleep(Duration::from_millis(POST_ROUND_DELAY_MS)).await;
            start_round(&h).await;
        });
        room.push_timer(timer);
    }
}

/// Broadcast the match result and return the room to a clean lobby.
async fn finish_match(handle: &SharedRoom, winner: PlayerId) {
    let mut room = handle.lock().await;
    if room.phase != Phase::Result {
        return;
    }
    room.broadcast(ServerMessage::MatchOver(MatchOverInfo {
        best_of: room.best_of,
        winner_id: winner,
        scores: room.scores.clone(),
    }))
    .await;
    room.force_stop();
    room.publish_state().await;
}

// =============================================================================
// DEBUG AFFORDANCES
// =============================================================================

/// Toggle the "infinite staring" development hold.
///
/// Enabling mid-`staring` cancels the pending timers and clears the planned
/// signal so the round never auto-advances; disabling while still in
/// `staring` computes a fresh random delay, enters `waiting`, and schedules
/// the signal. Outside `staring` only the flag changes.
pub async fn set_infinite_staring(handle: &SharedRoom, enable: bool) {
    let mut room = handle.lock().await;
    room.debug_infinite_staring = enable;
    info!(
        "[room {}] infinite staring {}",
        room.code,
        if enable { "enabled" } else { "disabled" }
    );
    if enable && room.phase == Phase::Staring {
        room.clear_timers();
        room.planned_signal_at = None;
    } else if !enable && room.phase == Phase::Staring {
        let delay: u64 = rand::thread_rng().gen_range(MIN_EXTRA_DELAY_MS..=MAX_EXTRA_DELAY_MS);
        room.planned_signal_at = Some(unix_ms() + delay);
        room.phase = Phase::Waiting;
        room.publish_state().await;
        debug!(
            "[room {}] round {} hold released; signal in {}ms",
            room.code, room.round, delay
        );
        let h = handle.clone();
        let timer = tokio::spawn(async move {
            sleep(Duration::from_millis(delay)).await;
            issue_signal(&h).await;
        });
        room.push_timer(timer);
    }
}

/// Manufacture a simultaneous press (development tooling).
///
/// Valid only during `signaled`. If the caller already pressed, their exact
/// timestamp and frame count are copied onto the opponent, producing a tie
/// by construction; otherwise both duelists are stamped with the current
/// instant and one shared frame count. Either way the round concludes.
pub async fn press_other(handle: &SharedRoom, id: PlayerId) {
    let mut room = handle.lock().await;
    if room.phase != Phase::Signaled {
        return;
    }
    let Some(signal_at) = room.signal_at else { return };
    if !room.contains(id) {
        return;
    }
    let Some(opponent) = room.opponent_of(id) else { return };

    if let Some(pressed_at) = room.player(id).and_then(|p| p.pressed_at) {
        let frames = frames_from_ms(pressed_at.saturating_sub(signal_at));
        if let Some(slot) = room.player_mut(opponent) {
            slot.pressed_at = Some(pressed_at);
        }
        room.frames.insert(opponent, Some(frames));
        debug!(
            "[room {}] round {} mirrored press onto {} at {}f",
            room.code, room.round, opponent, frames
        );
    } else {
        let now = unix_ms();
        let frames = frames_from_ms(now.saturating_sub(signal_at));
        for side in [id, opponent] {
            if let Some(slot) = room.player_mut(side) {
                slot.pressed_at = Some(now);
            }
            room.frames.insert(side, Some(frames));
        }
        debug!(
            "[room {}] round {} simulated both presses at {}f",
            room.code, room.round, frames
        );
    }
    conclude_after_signal(&mut room, handle).await;
}
