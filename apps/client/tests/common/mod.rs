//! Shared fixtures: a scripted backend and fast session tunings.

#![allow(dead_code)]

use std::collections::VecDeque;
use tracing_subscriber::{fmt, EnvFilter};

// Logging is auto-installed for every integration test binary.
#[ctor::ctor]
fn init_logging() {
    let filter = std::env::var("TEST_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .map(EnvFilter::new)
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .without_time()
        .try_init()
        .ok();
}

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use boxrush_client::{
    MatchCreated, SessionBootstrap, StatePayload, SyncClient, SyncError, Tuning,
};

/// In-memory stand-in for the backend. Responses are scripted per
/// endpoint; once the fetch script runs dry the last state repeats,
/// which is exactly what a real poll against a quiet match sees.
pub struct ScriptedSyncClient {
    fetches: Mutex<VecDeque<Result<StatePayload, SyncError>>>,
    last_fetch: Mutex<Option<StatePayload>>,
    rolls: Mutex<VecDeque<Result<StatePayload, SyncError>>>,
    forfeits: Mutex<VecDeque<Result<StatePayload, SyncError>>>,
    alive: AtomicBool,
    pub fetch_calls: AtomicUsize,
    pub roll_calls: AtomicUsize,
    pub abandon_calls: AtomicUsize,
}

impl ScriptedSyncClient {
    pub fn new() -> Self {
        Self {
            fetches: Mutex::new(VecDeque::new()),
            last_fetch: Mutex::new(None),
            rolls: Mutex::new(VecDeque::new()),
            forfeits: Mutex::new(VecDeque::new()),
            alive: AtomicBool::new(true),
            fetch_calls: AtomicUsize::new(0),
            roll_calls: AtomicUsize::new(0),
            abandon_calls: AtomicUsize::new(0),
        }
    }

    pub fn script_fetch(&self, result: Result<StatePayload, SyncError>) {
        self.fetches.lock().unwrap().push_back(result);
    }

    pub fn script_roll(&self, result: Result<StatePayload, SyncError>) {
        self.rolls.lock().unwrap().push_back(result);
    }

    pub fn script_forfeit(&self, result: Result<StatePayload, SyncError>) {
        self.forfeits.lock().unwrap().push_back(result);
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }
}

#[async_trait]
impl SyncClient for ScriptedSyncClient {
    async fn submit_roll(&self, _match_id: &str) -> Result<StatePayload, SyncError> {
        self.roll_calls.fetch_add(1, Ordering::SeqCst);
        self.rolls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(SyncError::transient("no roll scripted")))
    }

    async fn fetch_state(&self, _match_id: &str) -> Result<StatePayload, SyncError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.fetches.lock().unwrap().pop_front();
        match scripted {
            Some(Ok(payload)) => {
                *self.last_fetch.lock().unwrap() = Some(payload.clone());
                Ok(payload)
            }
            Some(err) => err,
            None => match self.last_fetch.lock().unwrap().clone() {
                Some(payload) => Ok(payload),
                None => Err(SyncError::transient("no state scripted")),
            },
        }
    }

    async fn heartbeat(&self, _match_id: &str) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn forfeit(&self, _match_id: &str) -> Result<StatePayload, SyncError> {
        self.forfeits
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(SyncError::transient("no forfeit scripted")))
    }

    async fn abandon(&self, _match_id: &str) -> Result<(), SyncError> {
        self.abandon_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn create_match(&self, _num_players: usize) -> Result<MatchCreated, SyncError> {
        Err(SyncError::transient("create not scripted"))
    }
}

/// Tunings that keep virtual-time tests quiet: the idle auto-roll is
/// pushed far out so it never interferes unless a test wants it.
pub fn quiet_tuning() -> Tuning {
    Tuning {
        idle_timeout: Duration::from_secs(3600),
        roll_debounce: Duration::from_millis(0),
        ..Tuning::default()
    }
}

pub fn online_bootstrap(local_seat: Option<u8>) -> SessionBootstrap {
    let mut bootstrap = SessionBootstrap::new("http://localhost:0")
        .with_match_id("m-test")
        .with_num_players(2)
        .with_seed(7)
        .with_tuning(quiet_tuning());
    bootstrap.local_seat = local_seat;
    bootstrap
}

/// Payload builder for the common case: positions plus roll and turn.
pub fn state(positions: &[u8], last_roll: u8, turn: u8) -> StatePayload {
    StatePayload {
        positions: Some(positions.to_vec()),
        last_roll: Some(last_roll),
        turn: Some(turn),
        ..StatePayload::default()
    }
}
