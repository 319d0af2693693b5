//! Reconciliation of authoritative payloads into the local mirror.
//!
//! The evaluation order is load-bearing. Terminal checks run before
//! anything else so a finished match can never re-arm a timer; the
//! signature check runs before any effect so a duplicate push (or a
//! poll racing a websocket frame) is a guaranteed no-op; forfeit and
//! winner handling run before turn adoption so an eliminated seat is
//! never handed the turn.

use tracing::{debug, warn};

use crate::domain::rules::{next_active_seat, BOARD_MAX};
use crate::domain::state::{MatchState, Seat, StateSignature, TurnOwner};
use crate::domain::transition::{result_for, CoinMove, MatchResult, StateTransition};
use crate::protocol::StatePayload;

/// Why a payload produced no effect.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum IgnoreReason {
    /// Identical signature to the last applied payload.
    Duplicate,
    /// The session already reported its terminal result.
    AlreadyTerminal,
}

/// Outcome of applying one payload.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Reconciled {
    Ignored(IgnoreReason),
    /// The match is over; report the result exactly once.
    Terminal {
        result: MatchResult,
        winner: Option<Seat>,
        moves: Vec<CoinMove>,
    },
    /// A live update; the controller emits the transition, unlocks
    /// the roll phase, and restarts the idle timer.
    Update(StateTransition),
}

/// Apply `payload` to `state`, idempotently.
///
/// Never fails: missing or malformed fields degrade to safe
/// fallbacks and get logged. The caller owns timers, locks, and
/// update delivery.
pub(crate) fn apply(state: &mut MatchState, payload: &StatePayload) -> Reconciled {
    if state.is_terminal() {
        return Reconciled::Ignored(IgnoreReason::AlreadyTerminal);
    }

    // 1. Terminal declaration wins over everything else.
    if payload.is_finished() {
        let moves = apply_positions(state, payload);
        state.winner = payload.winner.filter(|w| (*w as usize) < state.num_players);
        state.finished = true;
        return Reconciled::Terminal {
            result: result_for(state.local_seat, state.winner),
            winner: state.winner,
            moves,
        };
    }

    // 2. Dedup. A payload identical to the last applied one is always
    // dropped, even when arrival order is non-monotonic.
    let sig = StateSignature::of(payload, &state.positions);
    if state.last_applied_signature.as_ref() == Some(&sig) {
        return Reconciled::Ignored(IgnoreReason::Duplicate);
    }
    state.last_applied_signature = Some(sig);

    // 3. Spawn: the actor's coin enters at box 0. The server already
    // evaluated the rules; nothing is re-derived locally.
    if payload.spawn {
        if let Some(actor) = seat_in_range(payload.actor, state.num_players) {
            state.spawned[actor as usize] = true;
            state.positions[actor as usize] = 0;
            let turn = adopt_turn(state, payload.turn, Some(actor));
            state.turn = turn;
            return Reconciled::Update(StateTransition::Spawned {
                seat: actor,
                roll: payload.roll_value(),
                turn,
            });
        }
        warn!("spawn payload without usable actor; treating as plain diff");
    }

    // 4. Position diff.
    let moves = apply_positions(state, payload);

    // 5. Forfeit before winner/turn: an eliminated seat must never be
    // re-armed, and a lone survivor resolves the match immediately
    // without waiting for an explicit winner field.
    if let Some(seat) = seat_in_range(payload.forfeit_actor, state.num_players) {
        state.mark_forfeited(seat);
        let active = state.active_seats();
        if active.len() <= 1 {
            state.winner = active.first().copied();
            state.finished = true;
            return Reconciled::Terminal {
                result: result_for(state.local_seat, state.winner),
                winner: state.winner,
                moves,
            };
        }
        let turn = adopt_turn(state, payload.turn, payload.actor);
        state.turn = turn;
        return Reconciled::Update(StateTransition::Forfeited { seat, moves, turn });
    }

    // 6. Winner.
    if let Some(winner) = seat_in_range(payload.winner, state.num_players) {
        state.winner = Some(winner);
        state.finished = true;
        return Reconciled::Terminal {
            result: result_for(state.local_seat, Some(winner)),
            winner: Some(winner),
            moves,
        };
    }

    // 7. Turn adoption.
    let turn = adopt_turn(state, payload.turn, payload.actor);
    state.turn = turn;

    if moves.is_empty() {
        return Reconciled::Update(StateTransition::TurnSynced { turn });
    }
    Reconciled::Update(StateTransition::Moved {
        actor: seat_in_range(payload.actor, state.num_players),
        roll: payload.roll_value(),
        moves,
        captured: Vec::new(),
        turn,
    })
}

/// Adopt the payload's turn under the canonical rule: trust the
/// explicit field when it names an active seat; else rotate from the
/// actor, skipping forfeited seats; else keep the current owner (or
/// the first active seat if the owner was eliminated).
fn adopt_turn(state: &MatchState, explicit: Option<u8>, actor: Option<u8>) -> TurnOwner {
    if let Some(turn) = seat_in_range(explicit, state.num_players) {
        if !state.is_forfeited(turn) {
            return TurnOwner::Seat(turn);
        }
        debug!(turn, "payload turn names a forfeited seat; deriving instead");
    }
    if let Some(actor) = seat_in_range(actor, state.num_players) {
        if let Some(next) = next_active_seat(actor, state.num_players, &state.forfeited) {
            return TurnOwner::Seat(next);
        }
    }
    match state.turn {
        TurnOwner::Seat(seat) if !state.is_forfeited(seat) => TurnOwner::Seat(seat),
        _ => state
            .active_seats()
            .first()
            .map(|&s| TurnOwner::Seat(s))
            .unwrap_or(TurnOwner::Unresolved),
    }
}

/// Write the payload's positions into the mirror, returning one move
/// per seat whose box changed. A seat observed off box 0 must have
/// spawned, whatever our flag said.
fn apply_positions(state: &mut MatchState, payload: &StatePayload) -> Vec<CoinMove> {
    let Some(new_positions) = payload.positions.as_ref() else {
        return Vec::new();
    };
    let mut moves = Vec::new();
    let n = state.num_players.min(new_positions.len());
    for seat in 0..n {
        let to = new_positions[seat].min(BOARD_MAX);
        let from = state.positions[seat];
        if to > 0 {
            state.spawned[seat] = true;
        }
        if from != to {
            state.positions[seat] = to;
            moves.push(CoinMove {
                seat: seat as Seat,
                from,
                to,
            });
        }
    }
    moves
}

fn seat_in_range(seat: Option<u8>, num_players: usize) -> Option<Seat> {
    seat.filter(|s| (*s as usize) < num_players)
}
