//! Pure board rules: no I/O, no clocks, no randomness.
//!
//! The board is 8 boxes, indices 0..=7; box 7 is the goal and box 3
//! sends a coin back to the start. A coin enters the board only on a
//! roll of exactly 1. These rules drive offline play directly; online
//! they are advisory only, because the backend owns the truth.

use std::collections::BTreeSet;

use crate::domain::state::Seat;

/// Goal box; reaching it exactly wins the match.
pub const BOARD_MAX: u8 = 7;
/// Landing exactly here resets the coin to box 0.
pub const DANGER_BOX: u8 = 3;
pub const DIE_SIDES: u8 = 6;

/// What a single roll did to the board.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum RollEvent {
    /// Rolled a 1 while at home: coin enters at box 0.
    Spawn,
    /// Rolled anything else while at home: nothing moves.
    SkippedSpawn,
    /// Normal advance; `captured` lists opposing coins sent home.
    Move { from: u8, to: u8, captured: Vec<Seat> },
    /// Landed exactly on the danger box: visits it, then resets to 0.
    Danger { from: u8 },
    /// Would pass the goal: coin stays put.
    Overshoot { at: u8 },
    /// Reached the goal exactly.
    Win,
}

/// Result of applying one roll for one seat.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RollOutcome {
    pub new_positions: Vec<u8>,
    pub new_spawned: Vec<bool>,
    pub event: RollEvent,
}

/// Apply `roll` for `player` against the given board.
///
/// Inputs are taken by slice so callers can evaluate hypotheticals
/// without cloning state. Out-of-range input degrades to a no-op
/// rather than panicking.
pub fn apply_roll(positions: &[u8], spawned: &[bool], player: Seat, roll: u8) -> RollOutcome {
    let mut new_positions = positions.to_vec();
    let mut new_spawned = spawned.to_vec();
    let p = player as usize;

    if p >= new_positions.len() || roll == 0 || roll > DIE_SIDES {
        return RollOutcome {
            new_positions,
            new_spawned,
            event: RollEvent::SkippedSpawn,
        };
    }

    if !new_spawned[p] {
        if roll == 1 {
            new_spawned[p] = true;
            new_positions[p] = 0;
            return RollOutcome {
                new_positions,
                new_spawned,
                event: RollEvent::Spawn,
            };
        }
        return RollOutcome {
            new_positions,
            new_spawned,
            event: RollEvent::SkippedSpawn,
        };
    }

    let old = new_positions[p];
    let target = old + roll;

    if target == DANGER_BOX {
        new_positions[p] = 0;
        return RollOutcome {
            new_positions,
            new_spawned,
            event: RollEvent::Danger { from: old },
        };
    }

    if target == BOARD_MAX {
        new_positions[p] = BOARD_MAX;
        return RollOutcome {
            new_positions,
            new_spawned,
            event: RollEvent::Win,
        };
    }

    if target > BOARD_MAX {
        return RollOutcome {
            new_positions,
            new_spawned,
            event: RollEvent::Overshoot { at: old },
        };
    }

    new_positions[p] = target;

    // Capture: spawned opponents sharing the landing box go home.
    // Their spawn flag stays set; they re-enter play from box 0.
    let mut captured = Vec::new();
    for (idx, pos) in new_positions.iter_mut().enumerate() {
        if idx != p && new_spawned[idx] && *pos == target {
            *pos = 0;
            captured.push(idx as Seat);
        }
    }

    RollOutcome {
        new_positions,
        new_spawned,
        event: RollEvent::Move {
            from: old,
            to: target,
            captured,
        },
    }
}

/// Next seat clockwise from `current`, skipping forfeited seats.
///
/// Returns `None` when no active seat exists (everyone forfeited).
pub fn next_active_seat(
    current: Seat,
    num_players: usize,
    forfeited: &BTreeSet<Seat>,
) -> Option<Seat> {
    if num_players == 0 {
        return None;
    }
    let n = num_players as Seat;
    for step in 1..=n {
        let candidate = (current + step) % n;
        if !forfeited.contains(&candidate) {
            return Some(candidate);
        }
    }
    None
}
