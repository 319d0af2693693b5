use std::collections::BTreeSet;

use crate::protocol::StatePayload;

/// Seat index within a match (0-based; 0, 1, optionally 2).
pub type Seat = u8;

/// How the session talks to the rest of the world.
///
/// Fixed for the lifetime of a session; switching between offline and
/// online play means tearing the session down and starting a new one.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Mode {
    /// Local play against bots; rules are evaluated in-process.
    Offline,
    /// Mirror of an authoritative backend; local rules are advisory only.
    Online,
}

/// Whose turn it is.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TurnOwner {
    /// Initial online state before the backend has reported a turn.
    Unresolved,
    Seat(Seat),
}

impl TurnOwner {
    pub fn seat(self) -> Option<Seat> {
        match self {
            TurnOwner::Unresolved => None,
            TurnOwner::Seat(s) => Some(s),
        }
    }

    pub fn is_seat(self, seat: Seat) -> bool {
        self == TurnOwner::Seat(seat)
    }
}

/// Roll-request lifecycle.
///
/// One field replaces the ad-hoc boolean lock flags the session would
/// otherwise need; every transition happens on the session task.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RollPhase {
    /// No roll in progress; requests are accepted.
    Idle,
    /// A roll has been submitted (or is being evaluated); further
    /// requests are rejected until it resolves.
    AwaitingResponse,
    /// The roll resolved but the board is still settling (coin
    /// movement window); the turn has not advanced yet.
    LockedForAnimation,
}

/// Dedup key of the most recently applied server payload.
///
/// Two payloads with the same positions, last roll and turn are the
/// same logical event regardless of which transport delivered them or
/// how many times.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StateSignature {
    pub positions: Vec<u8>,
    pub last_roll: u8,
    pub turn: i16,
}

impl StateSignature {
    /// Build the signature a payload would stamp, falling back to the
    /// current positions when the payload omits them (partial pushes).
    pub fn of(payload: &StatePayload, current_positions: &[u8]) -> Self {
        let positions = payload
            .positions
            .clone()
            .unwrap_or_else(|| current_positions.to_vec());
        Self {
            positions,
            last_roll: payload.last_roll.or(payload.roll).unwrap_or(0),
            turn: payload.turn.map(i16::from).unwrap_or(-1),
        }
    }
}

/// The client's view of one match.
///
/// Owned exclusively by the session task; mutated only through the
/// reconciliation engine (online) or the board rules (offline). Not
/// persisted beyond the session.
#[derive(Debug, Clone)]
pub struct MatchState {
    pub mode: Mode,
    pub num_players: usize,
    /// Box index per seat, each in `0..=7`. A seat at 0 that has not
    /// spawned is still at home, which is distinct from box 0.
    pub positions: Vec<u8>,
    /// Seats whose coin has entered the board.
    pub spawned: Vec<bool>,
    /// Monotonically non-decreasing within a session.
    pub forfeited: BTreeSet<Seat>,
    pub turn: TurnOwner,
    /// Once set, the session is terminal and no further rolls are
    /// accepted.
    pub winner: Option<Seat>,
    /// Latched when the backend declares the match over, with or
    /// without a winner.
    pub finished: bool,
    pub last_applied_signature: Option<StateSignature>,
    /// Which seat is "me". `None` only before the backend confirms
    /// identity in online mode; offline the human is always seat 0.
    pub local_seat: Option<Seat>,
    pub roll_phase: RollPhase,
}

impl MatchState {
    pub fn new_offline(num_players: usize, start_seat: Seat) -> Self {
        Self {
            mode: Mode::Offline,
            num_players,
            positions: vec![0; num_players],
            spawned: vec![false; num_players],
            forfeited: BTreeSet::new(),
            turn: TurnOwner::Seat(start_seat),
            winner: None,
            finished: false,
            last_applied_signature: None,
            local_seat: Some(0),
            roll_phase: RollPhase::Idle,
        }
    }

    pub fn new_online(num_players: usize, local_seat: Option<Seat>) -> Self {
        Self {
            mode: Mode::Online,
            num_players,
            positions: vec![0; num_players],
            spawned: vec![false; num_players],
            forfeited: BTreeSet::new(),
            turn: TurnOwner::Unresolved,
            winner: None,
            finished: false,
            last_applied_signature: None,
            local_seat,
            roll_phase: RollPhase::Idle,
        }
    }

    /// Seats still in the match, in seat order.
    pub fn active_seats(&self) -> Vec<Seat> {
        (0..self.num_players as Seat)
            .filter(|s| !self.forfeited.contains(s))
            .collect()
    }

    pub fn is_forfeited(&self, seat: Seat) -> bool {
        self.forfeited.contains(&seat)
    }

    /// Forfeits only grow; re-adding is a no-op.
    pub fn mark_forfeited(&mut self, seat: Seat) {
        if (seat as usize) < self.num_players {
            self.forfeited.insert(seat);
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.finished || self.winner.is_some()
    }

    pub fn is_local_turn(&self) -> bool {
        match (self.turn, self.local_seat) {
            (TurnOwner::Seat(t), Some(me)) => t == me,
            _ => false,
        }
    }
}
