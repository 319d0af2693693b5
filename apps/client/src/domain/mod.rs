pub mod rules;
pub mod state;
pub mod transition;

pub use rules::{apply_roll, next_active_seat, RollEvent, RollOutcome, BOARD_MAX, DANGER_BOX};
pub use state::{MatchState, Mode, RollPhase, Seat, StateSignature, TurnOwner};
pub use transition::{result_for, CoinMove, MatchResult, StateTransition};
