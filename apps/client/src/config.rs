//! Session bootstrap configuration.
//!
//! Everything a session needs is passed in explicitly at construction
//! time. The host application's little key-value store (token, match
//! id, seat) stays behind the [`BootstrapStore`] trait so controller
//! construction is deterministic and testable.

use std::time::Duration;

use crate::domain::state::Seat;

/// Timing knobs, defaulted to the production constants.
#[derive(Debug, Clone)]
pub struct Tuning {
    /// Polling cadence when the push channel is unavailable.
    pub poll_interval: Duration,
    /// Liveness probe cadence.
    pub heartbeat_interval: Duration,
    /// Consecutive heartbeat failures before a forced resync.
    pub heartbeat_strikes: u32,
    /// Idle window before an auto-roll is issued for the local seat.
    pub idle_timeout: Duration,
    /// Bot pacing delay range (offline mode).
    pub bot_delay_min: Duration,
    pub bot_delay_max: Duration,
    /// Duplicate-trigger guard on manual rolls.
    pub roll_debounce: Duration,
    /// Settling window after an offline move before the turn advances.
    pub move_lock: Duration,
    /// Longer settling window for the danger-box reverse reset.
    pub danger_lock: Duration,
    /// Per-request timeout for roll submission.
    pub submit_timeout: Duration,
    /// Per-request timeout for state fetches and heartbeats.
    pub fetch_timeout: Duration,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(900),
            heartbeat_interval: Duration::from_secs(5),
            heartbeat_strikes: 3,
            idle_timeout: Duration::from_secs(10),
            bot_delay_min: Duration::from_millis(1200),
            bot_delay_max: Duration::from_millis(4000),
            roll_debounce: Duration::from_millis(1500),
            move_lock: Duration::from_millis(600),
            danger_lock: Duration::from_millis(800),
            submit_timeout: Duration::from_secs(8),
            fetch_timeout: Duration::from_secs(6),
        }
    }
}

/// Everything needed to stand up one session.
#[derive(Debug, Clone)]
pub struct SessionBootstrap {
    pub backend_url: String,
    /// Opaque bearer token minted by the (out-of-scope) login flow.
    pub token: Option<String>,
    /// Present for online sessions; `None` forces offline play.
    pub match_id: Option<String>,
    /// Seat hint recorded at matchmaking time; the server-confirmed
    /// value always wins.
    pub local_seat: Option<Seat>,
    /// Our own account id, used to locate our seat in payloads.
    pub local_player_id: Option<String>,
    pub num_players: usize,
    /// Seed for the offline dice / bot pacing RNG; `None` uses OS
    /// entropy. Tests pin this.
    pub rng_seed: Option<u64>,
    pub tuning: Tuning,
}

impl SessionBootstrap {
    pub fn new(backend_url: impl Into<String>) -> Self {
        Self {
            backend_url: backend_url.into(),
            token: None,
            match_id: None,
            local_seat: None,
            local_player_id: None,
            num_players: 2,
            rng_seed: None,
            tuning: Tuning::default(),
        }
    }

    /// Build a bootstrap from whatever the host application persisted.
    pub fn from_store(backend_url: impl Into<String>, store: &dyn BootstrapStore) -> Self {
        let mut bootstrap = Self::new(backend_url);
        bootstrap.token = store.token();
        bootstrap.match_id = store.current_match_id();
        bootstrap.local_seat = store.local_seat();
        bootstrap.local_player_id = store.local_player_id();
        if let Some(n) = store.num_players() {
            bootstrap.num_players = n.clamp(2, 3);
        }
        bootstrap
    }

    pub fn with_match_id(mut self, match_id: impl Into<String>) -> Self {
        self.match_id = Some(match_id.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_num_players(mut self, num_players: usize) -> Self {
        self.num_players = num_players.clamp(2, 3);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn with_tuning(mut self, tuning: Tuning) -> Self {
        self.tuning = tuning;
        self
    }
}

/// The host application's persisted session keys.
///
/// Read-only from the engine's point of view: the engine never writes
/// back, it only consumes the values at construction.
pub trait BootstrapStore {
    fn token(&self) -> Option<String>;
    fn current_match_id(&self) -> Option<String>;
    fn local_seat(&self) -> Option<Seat>;
    fn local_player_id(&self) -> Option<String>;
    fn num_players(&self) -> Option<usize>;
}
