#![deny(clippy::wildcard_imports)]
#![cfg_attr(test, allow(clippy::wildcard_imports))]

//! Client-side synchronization engine for a small race-to-the-goal
//! dice board game: 2 or 3 seats, one coin each, first to land exactly
//! on box 7 wins. Offline it referees the match itself against bot
//! seats; online it mirrors an authoritative backend and reconciles
//! pushed state into a clean stream of transitions for a UI layer.

pub mod config;
pub mod domain;
pub mod error;
pub mod protocol;
pub mod session;
pub mod sync;
pub mod telemetry;

#[cfg(test)]
pub mod test_bootstrap;

// Re-exports for public API
pub use config::{BootstrapStore, SessionBootstrap, Tuning};
pub use domain::rules::{apply_roll, RollEvent, RollOutcome, BOARD_MAX, DANGER_BOX};
pub use domain::state::{MatchState, Mode, RollPhase, Seat, TurnOwner};
pub use domain::transition::{CoinMove, MatchResult, StateTransition};
pub use error::{RejectReason, SyncError, TerminalReason};
pub use protocol::{MatchCreated, MatchStatus, StatePayload};
pub use session::events::{RollOrigin, SessionCommand, SessionNotice, SessionUpdate};
pub use session::{SessionController, SessionHandle};
pub use sync::{HttpSyncClient, SyncClient};

// Auto-initialize logging for unit tests
#[cfg(test)]
#[ctor::ctor]
fn init_test_logging() {
    test_bootstrap::logging::init();
}
