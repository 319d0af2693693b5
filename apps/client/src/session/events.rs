//! Message types flowing into and out of the session task.
//!
//! All match-state mutation is serialized through one mpsc queue of
//! [`Inbound`] events; background workers only ever send immutable
//! payloads into it. The UI collaborator consumes [`SessionUpdate`]s.

use crate::domain::state::Seat;
use crate::domain::transition::{MatchResult, StateTransition};
use crate::error::SyncError;
use crate::protocol::StatePayload;

/// Where a roll request came from.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RollOrigin {
    /// The player tapped the die.
    Manual,
    /// Bot seat acting on its own.
    Auto,
    /// Idle-timeout auto-roll for the local seat.
    Timer,
}

impl RollOrigin {
    /// Timer- and bot-originated rolls never surface "not your turn"
    /// chatter; only a human tap deserves the notice.
    pub fn is_manual(self) -> bool {
        matches!(self, RollOrigin::Manual)
    }
}

/// Requests from the embedding application.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SessionCommand {
    Roll(RollOrigin),
    Forfeit,
    Abandon,
}

/// Non-fatal, user-visible signals.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SessionNotice {
    NotYourTurn,
    /// Heartbeat failures crossed the threshold; a resync is underway.
    Reconnecting,
    /// Connectivity restored after a reconnecting spell.
    Connected,
    /// Another seat gave up but the match continues.
    SeatForfeited { seat: Seat },
}

/// Everything the UI layer receives from a session.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SessionUpdate {
    /// Exactly one per accepted roll / applied payload.
    Transition(StateTransition),
    Notice(SessionNotice),
    /// Terminal result; reported exactly once, nothing follows it.
    Ended(MatchResult),
}

/// Internal event union consumed by the session task.
#[derive(Debug)]
pub(crate) enum Inbound {
    Command(SessionCommand),
    /// A state payload from either transport. `trusted` marks direct
    /// responses whose `player_index` may be adopted for identity.
    ServerState { payload: StatePayload, trusted: bool },
    RollResolved(Result<StatePayload, SyncError>),
    ForfeitResolved(Result<StatePayload, SyncError>),
    /// Idle timer fired; epoch guards against stale timers racing a
    /// reconciliation that already moved the turn.
    IdleFired { epoch: u64 },
    /// Bot pacing delay elapsed.
    BotRoll { seat: Seat, epoch: u64 },
    /// Offline settling window elapsed; advance the turn.
    AdvanceTurn { epoch: u64 },
    /// Backend confirmed (or denied) that it is still our turn,
    /// requested before an idle auto-roll.
    TurnVerified {
        epoch: u64,
        result: Result<StatePayload, SyncError>,
    },
    ConnectivityLost,
    ConnectivityRestored,
    /// A background sync task hit a session-ending error.
    SyncFailed(SyncError),
}
