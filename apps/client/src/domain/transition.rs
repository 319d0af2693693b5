//! What the UI layer receives after each accepted roll or applied
//! server payload: a single diff describing what changed.

use crate::domain::state::{Seat, TurnOwner};

/// One coin relocating from one box to another.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CoinMove {
    pub seat: Seat,
    pub from: u8,
    pub to: u8,
}

/// The single state transition emitted per accepted roll / applied
/// payload. Never zero, never more than one for the same roll.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum StateTransition {
    /// A coin entered the board at box 0.
    Spawned {
        seat: Seat,
        roll: Option<u8>,
        turn: TurnOwner,
    },
    /// Home seat rolled something other than 1; nothing moved.
    SpawnSkipped {
        seat: Seat,
        roll: u8,
        turn: TurnOwner,
    },
    /// One or more coins relocated (mover plus any captures, or a
    /// server diff touching several seats at once).
    Moved {
        actor: Option<Seat>,
        roll: Option<u8>,
        moves: Vec<CoinMove>,
        captured: Vec<Seat>,
        turn: TurnOwner,
    },
    /// Landed on the danger box and bounced back to the start.
    DangerReset {
        seat: Seat,
        roll: u8,
        turn: TurnOwner,
    },
    /// Would have passed the goal; coin stayed put, turn advanced.
    Overshot {
        seat: Seat,
        roll: u8,
        turn: TurnOwner,
    },
    /// A seat left the match; any accompanying coin diff is included.
    Forfeited {
        seat: Seat,
        moves: Vec<CoinMove>,
        turn: TurnOwner,
    },
    /// A seat reached the goal. The terminal result follows as a
    /// separate session-ended update.
    Won { seat: Seat, moves: Vec<CoinMove> },
    /// Turn owner changed with no board movement (initial online
    /// sync, or a push that only rotated the turn).
    TurnSynced { turn: TurnOwner },
}

impl StateTransition {
    /// Turn owner after this transition, when it carries one.
    pub fn turn(&self) -> Option<TurnOwner> {
        match self {
            StateTransition::Spawned { turn, .. }
            | StateTransition::SpawnSkipped { turn, .. }
            | StateTransition::Moved { turn, .. }
            | StateTransition::DangerReset { turn, .. }
            | StateTransition::Overshot { turn, .. }
            | StateTransition::Forfeited { turn, .. }
            | StateTransition::TurnSynced { turn } => Some(*turn),
            StateTransition::Won { .. } => None,
        }
    }
}

/// Terminal outcome of a session, from the local seat's perspective.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum MatchResult {
    Win { seat: Seat },
    Loss { winner: Option<Seat> },
    /// Finished without a winner (disconnect resolution).
    Draw,
    /// Torn down without a result (match vanished, session abandoned).
    Aborted,
}

/// Map an authoritative winner onto the local perspective.
pub fn result_for(local_seat: Option<Seat>, winner: Option<Seat>) -> MatchResult {
    match (winner, local_seat) {
        (Some(w), Some(me)) if w == me => MatchResult::Win { seat: w },
        (Some(w), _) => MatchResult::Loss { winner: Some(w) },
        (None, _) => MatchResult::Draw,
    }
}
